//! Memory budget configuration.

/// Bytes in one mebibyte.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Default ceiling in megabytes.
pub const DEFAULT_MAX_MEMORY_MB: u64 = 1024;

/// Default fraction of the ceiling at which registration starts evicting.
pub const DEFAULT_CLEANUP_THRESHOLD: f64 = 0.8;

/// Eviction shrinks usage to this fraction of the cleanup threshold.
pub const EVICTION_TARGET_FRACTION: f64 = 0.5;

/// Configuration for a [`crate::MemoryBudget`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetConfig {
    /// Hard ceiling. A successful registration never leaves usage above it.
    pub max_bytes: u64,

    /// Fraction of `max_bytes`, in `(0, 1]`, above which registration evicts
    /// least recently accessed datasets first.
    pub cleanup_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_MEMORY_MB * BYTES_PER_MB,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
        }
    }
}

impl BudgetConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ceiling in megabytes.
    #[must_use]
    pub fn max_memory_mb(mut self, mb: u64) -> Self {
        self.max_bytes = mb.saturating_mul(BYTES_PER_MB);
        self
    }

    /// Sets the ceiling in bytes.
    #[must_use]
    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = bytes;
        self
    }

    /// Sets the cleanup threshold.
    #[must_use]
    pub fn cleanup_threshold(mut self, threshold: f64) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    /// Usage above which registration evicts first.
    #[allow(clippy::cast_precision_loss)]
    pub fn threshold_bytes(&self) -> f64 {
        self.max_bytes as f64 * self.cleanup_threshold
    }

    /// Usage that eviction shrinks down to.
    pub fn eviction_target_bytes(&self) -> f64 {
        self.threshold_bytes() * EVICTION_TARGET_FRACTION
    }

    /// The ceiling in megabytes.
    #[allow(clippy::cast_precision_loss)]
    pub fn max_memory_mb_f64(&self) -> f64 {
        self.max_bytes as f64 / BYTES_PER_MB as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BudgetConfig::default();
        assert_eq!(config.max_bytes, 1024 * BYTES_PER_MB);
        assert!((config.cleanup_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn derived_limits() {
        let config = BudgetConfig::new().max_memory_mb(100).cleanup_threshold(0.8);
        let mb = BYTES_PER_MB as f64;
        assert!((config.threshold_bytes() - 80.0 * mb).abs() < 1.0);
        assert!((config.eviction_target_bytes() - 40.0 * mb).abs() < 1.0);
        assert!((config.max_memory_mb_f64() - 100.0).abs() < f64::EPSILON);
    }
}
