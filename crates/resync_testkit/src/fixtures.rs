//! Cache fixtures.
//!
//! Caches built here run on a [`ManualClock`] so TTL behaviour can be
//! tested without sleeping.

use resync_cache::{BoundedCache, CacheConfig, ManualClock, Persistence};
use resync_storage::RECORD_EXTENSION;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Start time of fixture clocks, in seconds since the epoch.
pub const FIXTURE_EPOCH: f64 = 1_700_000_000.0;

/// A temporary cache directory, removed on drop.
pub struct TestCacheDir {
    dir: TempDir,
    clock: Arc<ManualClock>,
}

impl TestCacheDir {
    /// Creates an empty directory and a clock at [`FIXTURE_EPOCH`].
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            clock: Arc::new(ManualClock::new(FIXTURE_EPOCH)),
        }
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The clock shared by every cache opened from this fixture.
    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    /// A default configuration persisting into this directory.
    pub fn config(&self) -> CacheConfig {
        CacheConfig::default().persist_to(self.path())
    }

    /// Opens a persistent cache over this directory.
    pub fn open(&self, config: CacheConfig) -> BoundedCache {
        let config = CacheConfig {
            persistence: Persistence::Directory(self.path().to_path_buf()),
            ..config
        };
        BoundedCache::open_with_clock(config, self.clock.clone()).expect("Failed to open cache")
    }

    /// Path of the record file for a digest.
    pub fn record_path(&self, digest: &str) -> PathBuf {
        self.path().join(format!("{digest}.{RECORD_EXTENSION}"))
    }

    /// Writes raw bytes as the record for `digest`.
    pub fn write_raw_record(&self, digest: &str, bytes: &[u8]) {
        std::fs::write(self.record_path(digest), bytes).expect("Failed to write record");
    }

    /// Digests of record files currently on disk, sorted.
    pub fn record_digests(&self) -> Vec<String> {
        let mut digests: Vec<String> = std::fs::read_dir(self.path())
            .expect("Failed to read cache directory")
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == RECORD_EXTENSION))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        digests.sort();
        digests
    }
}

impl Default for TestCacheDir {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory cache with a manual clock.
pub fn memory_cache(config: CacheConfig) -> (BoundedCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(FIXTURE_EPOCH));
    let config = CacheConfig {
        persistence: Persistence::InMemory,
        ..config
    };
    let cache = BoundedCache::open_with_clock(config, clock.clone()).expect("Failed to open cache");
    (cache, clock)
}

/// Runs a test with a persistent cache in a temporary directory.
pub fn with_temp_cache<F, R>(f: F) -> R
where
    F: FnOnce(&BoundedCache, &TestCacheDir) -> R,
{
    let dir = TestCacheDir::new();
    let cache = dir.open(dir.config());
    f(&cache, &dir)
}
