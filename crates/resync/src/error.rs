//! Error types for the resource layer.

use resync_cache::CacheError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a [`crate::LayerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid YAML for the configuration schema.
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// A field holds an out-of-range value.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while assembling a [`crate::ResourceLayer`].
#[derive(Debug, Error)]
pub enum LayerError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The cache could not be opened.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// [`crate::install_global`] was called twice.
    #[error("a global resource layer is already installed")]
    AlreadyInstalled,
}

/// Result type for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;
