//! File configuration of the resource layer.
//!
//! A YAML document with three optional sections. Every field has a default,
//! so an empty document is a valid configuration.

use resync_cache::{CacheConfig, Persistence, BYTES_PER_MB};
use resync_memory::BudgetConfig;
use resync_retry::{BackoffStrategy, ErrorKind, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Cache section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    /// Whether the layer has a cache at all.
    pub enabled: bool,
    /// Directory of durable records.
    pub directory: PathBuf,
    /// Size ceiling in megabytes.
    pub max_size_mb: u64,
    /// Time-to-live of new entries. `null` never expires.
    pub default_ttl_seconds: Option<u64>,
    /// Whether entries are mirrored to `directory`.
    pub persist: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("cache"),
            max_size_mb: 100,
            default_ttl_seconds: Some(3600),
            persist: true,
        }
    }
}

/// Retry section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    /// Attempts including the first.
    pub max_attempts: u32,
    /// Delay unit in seconds.
    pub base_delay: f64,
    /// Cap on un-jittered delays in seconds.
    pub max_delay: f64,
    /// Growth factor of the exponential strategy.
    pub exponential_base: f64,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
    /// Whether delays are jittered.
    pub jitter: bool,
    /// Relative jitter size in `[0, 1]`.
    pub jitter_factor: f64,
    /// Kinds that are retried.
    pub retryable_kinds: Vec<ErrorKind>,
    /// Kinds that are never retried.
    pub fatal_kinds: Vec<ErrorKind>,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::new(3);
        Self {
            max_attempts: policy.max_attempts,
            base_delay: policy.base_delay.as_secs_f64(),
            max_delay: policy.max_delay.as_secs_f64(),
            exponential_base: policy.exponential_base,
            strategy: policy.strategy,
            jitter: policy.jitter,
            jitter_factor: policy.jitter_factor,
            retryable_kinds: policy.retryable.into_iter().collect(),
            fatal_kinds: policy.fatal.into_iter().collect(),
        }
    }
}

/// Memory section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemorySection {
    /// Ceiling in megabytes.
    pub max_memory_mb: u64,
    /// Fraction of the ceiling at which registration evicts, in `(0, 1]`.
    pub cleanup_threshold: f64,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_memory_mb: resync_memory::DEFAULT_MAX_MEMORY_MB,
            cleanup_threshold: resync_memory::DEFAULT_CLEANUP_THRESHOLD,
        }
    }
}

/// Configuration of a [`crate::ResourceLayer`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerConfig {
    /// Cache settings.
    pub cache: CacheSection,
    /// Retry settings.
    pub retry: RetrySection,
    /// Memory budget settings.
    pub memory: MemorySection,
}

impl LayerConfig {
    /// Parses and validates a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the schema or a value
    /// is out of range.
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&yaml)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Renders the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache.max_size_mb == 0 {
            return Err(ConfigError::invalid_value(
                "cache.max_size_mb",
                "must be greater than 0",
            ));
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        check_seconds("retry.base_delay", retry.base_delay)?;
        check_seconds("retry.max_delay", retry.max_delay)?;
        if !retry.exponential_base.is_finite() || retry.exponential_base <= 0.0 {
            return Err(ConfigError::invalid_value(
                "retry.exponential_base",
                format!("{} is not a positive number", retry.exponential_base),
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(ConfigError::invalid_value(
                "retry.jitter_factor",
                format!("{} is outside [0, 1]", retry.jitter_factor),
            ));
        }
        if let Some(kind) = retry
            .retryable_kinds
            .iter()
            .find(|k| retry.fatal_kinds.contains(k))
        {
            return Err(ConfigError::invalid_value(
                "retry.retryable_kinds",
                format!("'{kind}' is also listed in retry.fatal_kinds"),
            ));
        }

        if self.memory.max_memory_mb == 0 {
            return Err(ConfigError::invalid_value(
                "memory.max_memory_mb",
                "must be greater than 0",
            ));
        }
        let threshold = self.memory.cleanup_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::invalid_value(
                "memory.cleanup_threshold",
                format!("{threshold} is outside (0, 1]"),
            ));
        }
        Ok(())
    }

    /// Where cache entries are kept.
    pub fn persistence(&self) -> Persistence {
        if self.cache.persist {
            Persistence::Directory(self.cache.directory.clone())
        } else {
            Persistence::InMemory
        }
    }

    /// The cache configuration, or `None` when the cache is disabled.
    pub fn cache_config(&self) -> Option<CacheConfig> {
        if !self.cache.enabled {
            return None;
        }
        Some(CacheConfig {
            max_size_bytes: self.cache.max_size_mb.saturating_mul(BYTES_PER_MB),
            default_ttl: self.cache.default_ttl_seconds.map(Duration::from_secs),
            persistence: self.persistence(),
        })
    }

    /// The default retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.retry;
        RetryPolicy::new(retry.max_attempts)
            .with_base_delay(seconds(retry.base_delay))
            .with_max_delay(seconds(retry.max_delay))
            .with_exponential_base(retry.exponential_base)
            .with_strategy(retry.strategy)
            .with_jitter(retry.jitter)
            .with_jitter_factor(retry.jitter_factor)
            .with_retryable(retry.retryable_kinds.iter().copied())
            .with_fatal(retry.fatal_kinds.iter().copied())
    }

    /// The memory budget configuration.
    pub fn budget_config(&self) -> BudgetConfig {
        BudgetConfig::new()
            .max_memory_mb(self.memory.max_memory_mb)
            .cleanup_threshold(self.memory.cleanup_threshold)
    }
}

fn check_seconds(field: &'static str, secs: f64) -> ConfigResult<()> {
    if secs.is_finite() && secs >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(
            field,
            format!("{secs} is not a non-negative number of seconds"),
        ))
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
