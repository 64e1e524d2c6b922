//! Cache counters and metrics snapshots.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::BYTES_PER_MB;

/// Cache counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of lookups that returned a value.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups that found nothing live.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns the number of inserts.
    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    /// Returns the number of successful invalidations.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Returns the number of entries removed to respect the size ceiling.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Returns the number of entries removed because their TTL elapsed.
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }
}

/// A point-in-time view of a cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetrics {
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// Inserts.
    pub sets: u64,
    /// Successful invalidations.
    pub invalidations: u64,
    /// Entries removed to respect the size ceiling.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// `hits / (hits + misses)`, or 0 before any lookup.
    pub hit_rate: f64,
    /// Bytes charged by live entries.
    pub total_size_bytes: u64,
    /// `total_size_bytes` in megabytes.
    pub total_size_mb: f64,
    /// Number of entries in memory.
    pub entry_count: usize,
    /// Configured ceiling in megabytes.
    pub max_size_mb: f64,
}

impl CacheMetrics {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn new(
        stats: &CacheStats,
        total_size_bytes: u64,
        entry_count: usize,
        max_size_bytes: u64,
    ) -> Self {
        let hits = stats.hits();
        let misses = stats.misses();
        let lookups = hits + misses;
        Self {
            hits,
            misses,
            sets: stats.sets(),
            invalidations: stats.invalidations(),
            evictions: stats.evictions(),
            expirations: stats.expirations(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            total_size_bytes,
            total_size_mb: total_size_bytes as f64 / BYTES_PER_MB as f64,
            entry_count,
            max_size_mb: max_size_bytes as f64 / BYTES_PER_MB as f64,
        }
    }
}

impl fmt::Display for CacheMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache Stats:")?;
        writeln!(f, "  Hits: {}", self.hits)?;
        writeln!(f, "  Misses: {}", self.misses)?;
        writeln!(f, "  Hit Rate: {:.2}%", self.hit_rate * 100.0)?;
        writeln!(f, "  Sets: {}", self.sets)?;
        writeln!(f, "  Invalidations: {}", self.invalidations)?;
        writeln!(f, "  Entries: {}", self.entry_count)?;
        write!(
            f,
            "  Size: {:.2} MB / {:.2} MB",
            self.total_size_mb, self.max_size_mb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_zero_without_lookups() {
        let metrics = CacheMetrics::new(&CacheStats::new(), 0, 0, BYTES_PER_MB);
        assert_eq!(metrics.hit_rate, 0.0);
        assert_eq!(metrics.max_size_mb, 1.0);
    }

    #[test]
    fn hit_rate() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        let metrics = CacheMetrics::new(&stats, BYTES_PER_MB / 2, 1, BYTES_PER_MB);
        assert_eq!(metrics.hit_rate, 0.75);
        assert_eq!(metrics.total_size_mb, 0.5);
    }

    #[test]
    fn text_block() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        stats.record_set();

        let text = CacheMetrics::new(&stats, 0, 1, 100 * BYTES_PER_MB).to_string();
        assert!(text.starts_with("Cache Stats:\n"));
        assert!(text.contains("  Hit Rate: 50.00%\n"));
        assert!(text.ends_with("  Size: 0.00 MB / 100.00 MB"));
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(CacheStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_hit();
                        s.record_set();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.hits(), 800);
        assert_eq!(stats.sets(), 800);
    }
}
