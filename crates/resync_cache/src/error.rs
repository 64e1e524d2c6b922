//! Error types for the cache crate.

use resync_codec::CodecError;
use resync_storage::StorageError;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by cache construction and diagnostics.
///
/// Lookups and inserts never return these: capacity, expiry and
/// serialization problems are logged and reported as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The durable store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A cached value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A durable record could not be encoded or decoded.
    #[error("invalid cache record: {message}")]
    Record {
        /// Description of the failure.
        message: String,
    },
}

impl CacheError {
    /// Creates a record error.
    pub fn record(message: impl Into<String>) -> Self {
        Self::Record {
            message: message.into(),
        }
    }
}
