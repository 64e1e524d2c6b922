//! Cache configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bytes in one mebibyte.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Default size ceiling in megabytes.
pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Default time-to-live of new entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Fraction of the ceiling that overflow eviction shrinks the cache to.
pub const EVICTION_TARGET_RATIO: f64 = 0.8;

/// Where the cache keeps durable copies of its entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Persistence {
    /// Entries live only in memory and are lost when the process exits.
    #[default]
    InMemory,
    /// Every entry is also written to a record file in this directory.
    Directory(PathBuf),
}

impl Persistence {
    /// The record directory, if entries are persisted.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        match self {
            Self::InMemory => None,
            Self::Directory(path) => Some(path),
        }
    }
}

/// Configuration for a [`crate::BoundedCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Size ceiling. Overflow evicts least-recently-accessed entries.
    pub max_size_bytes: u64,

    /// Time-to-live applied when `set` is not given one. `None` never expires.
    pub default_ttl: Option<Duration>,

    /// Durable backing.
    pub persistence: Persistence,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_MB * BYTES_PER_MB,
            default_ttl: Some(DEFAULT_TTL),
            persistence: Persistence::InMemory,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size ceiling in megabytes.
    #[must_use]
    pub fn max_size_mb(mut self, mb: u64) -> Self {
        self.max_size_bytes = mb.saturating_mul(BYTES_PER_MB);
        self
    }

    /// Sets the size ceiling in bytes.
    #[must_use]
    pub fn max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Sets the default time-to-live.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Persists entries under `dir`.
    #[must_use]
    pub fn persist_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persistence = Persistence::Directory(dir.into());
        self
    }

    /// Keeps entries in memory only.
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.persistence = Persistence::InMemory;
        self
    }

    /// Size the cache shrinks to when an insert overflows the ceiling.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn eviction_target_bytes(&self) -> u64 {
        (self.max_size_bytes as f64 * EVICTION_TARGET_RATIO) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size_bytes, 100 * BYTES_PER_MB);
        assert_eq!(config.default_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(config.persistence, Persistence::InMemory);
    }

    #[test]
    fn builder() {
        let config = CacheConfig::new()
            .max_size_mb(1)
            .default_ttl(None)
            .persist_to("/tmp/resync");

        assert_eq!(config.max_size_bytes, BYTES_PER_MB);
        assert_eq!(config.eviction_target_bytes(), 838_860);
        assert_eq!(config.default_ttl, None);
        assert_eq!(
            config.persistence.directory(),
            Some(Path::new("/tmp/resync"))
        );
        assert_eq!(config.in_memory().persistence.directory(), None);
    }
}
