//! The bounded cache.

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::key::CacheKey;
use crate::record::{ttl_secs, CacheRecord};
use crate::stats::{CacheMetrics, CacheStats};
use parking_lot::Mutex;
use resync_codec::{from_cbor, to_canonical_cbor, MemoryFootprint, Value};
use resync_storage::{FileStore, RecordStore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A cached value with its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    value: Value,
    created_at: f64,
    ttl: Option<Duration>,
    last_access: f64,
    access_count: u64,
    size_bytes: u64,
    seq: u64,
}

impl CacheEntry {
    /// The cached value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Creation time in seconds since the epoch.
    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// Time-to-live. `None` never expires.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Time of the last hit in seconds since the epoch.
    pub fn last_access(&self) -> f64 {
        self.last_access
    }

    /// Number of hits.
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Size charged against the ceiling.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Whether the entry may still be returned at `now`.
    pub fn is_live(&self, now: f64) -> bool {
        self.ttl
            .map_or(true, |ttl| now - self.created_at < ttl.as_secs_f64())
    }

    fn to_record(&self) -> CacheResult<CacheRecord> {
        Ok(CacheRecord {
            data: to_canonical_cbor(&self.value)?,
            timestamp: self.created_at,
            ttl: self.ttl.map(ttl_secs),
            access_count: self.access_count,
            last_access: self.last_access,
            size_bytes: self.size_bytes,
        })
    }

    fn from_record(record: CacheRecord, seq: u64) -> CacheResult<Self> {
        Ok(Self {
            value: from_cbor(&record.data)?,
            created_at: record.timestamp,
            ttl: record.ttl_duration(),
            last_access: record.last_access,
            access_count: record.access_count,
            size_bytes: record.size_bytes,
            seq,
        })
    }
}

/// Summary of one durable record, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordInfo {
    /// Record key.
    pub key: String,
    /// Whether the record could be decoded.
    pub readable: bool,
    /// Size charged against the ceiling.
    pub size_bytes: Option<u64>,
    /// Seconds since the record was created.
    pub age_secs: Option<f64>,
    /// Time-to-live in seconds.
    pub ttl_secs: Option<u64>,
    /// Whether the TTL has elapsed.
    pub expired: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    total_size_bytes: u64,
    next_seq: u64,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn insert(&mut self, key: String, entry: CacheEntry) {
        self.total_size_bytes += entry.size_bytes;
        if let Some(old) = self.entries.insert(key, entry) {
            self.total_size_bytes -= old.size_bytes;
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size_bytes -= entry.size_bytes;
        Some(entry)
    }
}

/// A key/value cache with per-entry time-to-live and a byte-size ceiling.
///
/// # Behaviour
///
/// - An entry is live while `now - created_at < ttl`; dead entries are never
///   returned and are swept on every `get` and `set`.
/// - When an insert would push the total over the ceiling, the
///   least-recently-accessed entries are evicted until the total including the
///   new value is at most 80% of the ceiling. The insert always completes.
/// - With persistence configured, every insert is also written to the durable
///   store, misses fall back to it, and the memory map is warmed from it on
///   open. Unreadable records are logged and treated as absent.
/// - `get` returns an owned clone; mutating it never affects the cache.
///
/// # Thread Safety
///
/// All operations take one internal mutex, so eviction scans never race
/// with concurrent inserts.
///
/// # Example
///
/// ```rust
/// use resync_cache::{cache_key, BoundedCache, CacheConfig};
/// use resync_codec::Value;
///
/// let cache = BoundedCache::open(CacheConfig::default()).unwrap();
/// let key = cache_key!("load_users", "prod");
///
/// assert!(cache.get(&key).is_none());
/// cache.set(&key, Value::from("alice"));
/// assert_eq!(cache.get(&key), Some(Value::from("alice")));
/// ```
pub struct BoundedCache {
    config: CacheConfig,
    store: Option<Arc<dyn RecordStore>>,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
    stats: CacheStats,
}

impl fmt::Debug for BoundedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("config", &self.config)
            .field("persistent", &self.store.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl BoundedCache {
    /// Opens a cache using the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the record directory cannot be created.
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Opens a cache with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the record directory cannot be created.
    pub fn open_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        let store: Option<Arc<dyn RecordStore>> = match config.persistence.directory() {
            Some(dir) => Some(Arc::new(FileStore::open_with_create_dirs(dir)?)),
            None => None,
        };
        Ok(Self::with_store(config, store, clock))
    }

    /// Builds a cache over an arbitrary durable store, ignoring
    /// `config.persistence`.
    pub fn with_store(
        config: CacheConfig,
        store: Option<Arc<dyn RecordStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Self {
            config,
            store,
            clock,
            state: Mutex::new(CacheState::default()),
            stats: CacheStats::new(),
        };
        cache.warm_up();
        cache
    }

    /// The configuration the cache was opened with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether entries are written to a durable store.
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Looks up a live value.
    ///
    /// Falls back to the durable store when the key is not in memory; a
    /// live durable record is loaded into memory and counts as a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.sweep(&mut state, now);

        if let Some(entry) = state.entries.get_mut(key.as_str()) {
            entry.access_count += 1;
            entry.last_access = now;
            let value = entry.value.clone();
            self.stats.record_hit();
            debug!(operation = key.operation_name(), key = %key, "cache hit");
            return Some(value);
        }

        if let Some(store) = &self.store {
            let seq = state.next_seq();
            if let Some(mut entry) = self.load_entry(store.as_ref(), key.as_str(), now, seq) {
                entry.access_count += 1;
                entry.last_access = now;
                let value = entry.value.clone();
                self.make_room(&mut state, entry.size_bytes);
                state.insert(key.as_str().to_string(), entry);
                self.stats.record_hit();
                debug!(operation = key.operation_name(), key = %key, "cache hit from durable record");
                return Some(value);
            }
        }

        self.stats.record_miss();
        debug!(operation = key.operation_name(), key = %key, "cache miss");
        None
    }

    /// Stores `value` under `key` with the default time-to-live.
    pub fn set(&self, key: &CacheKey, value: Value) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Stores `value` under `key` with an explicit time-to-live.
    /// `None` never expires.
    ///
    /// Durable records hold whole seconds, so a fractional TTL is rounded up
    /// before the entry is created.
    pub fn set_with_ttl(&self, key: &CacheKey, value: Value, ttl: Option<Duration>) {
        let now = self.clock.now();
        let ttl = ttl.map(|ttl| Duration::from_secs(ttl_secs(ttl)));
        let size_bytes = estimate_size(&value);

        let mut state = self.state.lock();
        self.sweep(&mut state, now);
        state.remove(key.as_str());
        self.make_room(&mut state, size_bytes);

        let entry = CacheEntry {
            value,
            created_at: now,
            ttl,
            last_access: now,
            access_count: 0,
            size_bytes,
            seq: state.next_seq(),
        };
        self.persist(key.as_str(), &entry);
        state.insert(key.as_str().to_string(), entry);
        self.stats.record_set();
        debug!(
            operation = key.operation_name(),
            key = %key,
            size_bytes,
            total_size_bytes = state.total_size_bytes,
            "cache set"
        );
    }

    /// Returns the cached value, or computes, caches and returns it.
    ///
    /// # Errors
    ///
    /// Returns the error of `compute`; nothing is cached in that case.
    pub fn get_or_insert_with<E, F>(&self, key: &CacheKey, compute: F) -> Result<Value, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Removes `key` from memory and the durable store.
    ///
    /// Returns whether anything was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        let in_memory = state.remove(key.as_str()).is_some();
        let durable = self.remove_record(key.as_str());

        let removed = in_memory || durable;
        if removed {
            self.stats.record_invalidation();
            debug!(operation = key.operation_name(), key = %key, "cache entry invalidated");
        }
        removed
    }

    /// Empties memory and the durable store.
    ///
    /// Records that cannot be removed are logged and skipped.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let entries = state.entries.len();
        state.entries.clear();
        state.total_size_bytes = 0;

        let mut records = 0;
        if let Some(store) = &self.store {
            match store.clear() {
                Ok(n) => records = n,
                Err(e) => warn!(error = %e, "failed to clear durable cache records"),
            }
        }
        info!(entries, records, "cache cleared");
    }

    /// Removes every expired entry from memory and the durable store.
    ///
    /// Returns the number of entries and records removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let mut purged = self.sweep(&mut state, now);

        if let Some(store) = &self.store {
            let keys = match store.keys() {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(error = %e, "failed to list durable cache records");
                    return purged;
                }
            };
            for key in keys.iter().filter(|k| !state.entries.contains_key(*k)) {
                let Some(record) = self.read_record(store.as_ref(), key) else {
                    continue;
                };
                if record.is_expired(now) && self.remove_record(key) {
                    self.stats.record_expiration();
                    purged += 1;
                }
            }
        }

        if purged > 0 {
            info!(purged, "expired cache entries purged");
        }
        purged
    }

    /// Whether a live entry exists in memory. Does not count as an access.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .entries
            .get(key.as_str())
            .is_some_and(|e| e.is_live(now))
    }

    /// Returns a copy of an entry and its bookkeeping without touching it.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().entries.get(key.as_str()).cloned()
    }

    /// Number of entries in memory.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache holds no entries in memory.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes charged by the entries in memory.
    pub fn total_size_bytes(&self) -> u64 {
        self.state.lock().total_size_bytes
    }

    /// The live counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// A snapshot of counters and sizes.
    pub fn metrics(&self) -> CacheMetrics {
        let state = self.state.lock();
        CacheMetrics::new(
            &self.stats,
            state.total_size_bytes,
            state.entries.len(),
            self.config.max_size_bytes,
        )
    }

    /// Human-readable statistics block.
    pub fn stats_text(&self) -> String {
        self.metrics().to_string()
    }

    /// Describes every durable record, including unreadable ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store cannot be listed.
    pub fn inspect_records(&self) -> CacheResult<Vec<RecordInfo>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let now = self.clock.now();
        let mut infos = Vec::new();
        for key in store.keys()? {
            let info = match store.load(&key)?.map(|b| CacheRecord::from_bytes(&b)) {
                None => continue,
                Some(Ok(record)) => RecordInfo {
                    readable: true,
                    size_bytes: Some(record.size_bytes),
                    age_secs: Some(now - record.timestamp),
                    ttl_secs: record.ttl,
                    expired: record.is_expired(now),
                    key,
                },
                Some(Err(_)) => RecordInfo {
                    readable: false,
                    size_bytes: None,
                    age_secs: None,
                    ttl_secs: None,
                    expired: false,
                    key,
                },
            };
            infos.push(info);
        }
        Ok(infos)
    }

    /// Loads live records into memory without touching the store.
    ///
    /// Expired records are skipped and left for `purge_expired` or the next
    /// sweep. When the live records exceed the ceiling, the most recently
    /// accessed ones are loaded and the rest stay on disk for `get` to fall
    /// back to.
    fn warm_up(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let keys = match store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list durable cache records");
                return;
            }
        };

        let now = self.clock.now();
        let mut live = Vec::with_capacity(keys.len());
        let mut expired = 0usize;
        for key in keys {
            let Some(record) = self.read_record(store.as_ref(), &key) else {
                continue;
            };
            if record.is_expired(now) {
                expired += 1;
                continue;
            }
            match CacheEntry::from_record(record, 0) {
                Ok(entry) => live.push((key, entry)),
                Err(e) => {
                    warn!(key, error = %e, "ignoring durable cache record with undecodable value");
                }
            }
        }

        live.sort_by(|a, b| b.1.last_access.total_cmp(&a.1.last_access));
        let max = self.config.max_size_bytes;
        let mut budget = 0u64;
        let mut deferred = 0usize;
        live.retain(|(_, entry)| {
            let fits = budget.saturating_add(entry.size_bytes) <= max;
            if fits {
                budget += entry.size_bytes;
            } else {
                deferred += 1;
            }
            fits
        });

        let mut state = self.state.lock();
        for (key, mut entry) in live.into_iter().rev() {
            entry.seq = state.next_seq();
            state.insert(key, entry);
        }
        info!(
            entries = state.entries.len(),
            total_size_bytes = state.total_size_bytes,
            expired,
            deferred,
            "cache warmed from durable records"
        );
    }

    /// Drops dead entries. Returns how many were removed.
    fn sweep(&self, state: &mut CacheState, now: f64) -> usize {
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| !e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.remove(key);
            self.remove_record(key);
            self.stats.record_expiration();
            debug!(key = %key, "cache entry expired");
        }
        expired.len()
    }

    /// Evicts least-recently-accessed entries so that `incoming` more bytes fit.
    fn make_room(&self, state: &mut CacheState, incoming: u64) {
        let max = self.config.max_size_bytes;
        if state.total_size_bytes.saturating_add(incoming) <= max {
            return;
        }

        let target = self.config.eviction_target_bytes();
        let mut order: Vec<(f64, u64, String)> = state
            .entries
            .iter()
            .map(|(k, e)| (e.last_access, e.seq, k.clone()))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (_, _, key) in order {
            if state.total_size_bytes.saturating_add(incoming) <= target {
                break;
            }
            if let Some(entry) = state.remove(&key) {
                self.remove_record(&key);
                self.stats.record_eviction();
                debug!(key = %key, size_bytes = entry.size_bytes, "cache entry evicted");
            }
        }
    }

    fn persist(&self, key: &str, entry: &CacheEntry) {
        let Some(store) = &self.store else {
            return;
        };
        let result = entry
            .to_record()
            .and_then(|record| record.to_bytes())
            .and_then(|bytes| Ok(store.store(key, &bytes)?));
        if let Err(e) = result {
            warn!(key, error = %e, "failed to write durable cache record");
        }
    }

    fn remove_record(&self, key: &str) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.remove(key) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key, error = %e, "failed to remove durable cache record");
                false
            }
        }
    }

    fn read_record(&self, store: &dyn RecordStore, key: &str) -> Option<CacheRecord> {
        let bytes = match store.load(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "failed to read durable cache record");
                return None;
            }
        };
        match CacheRecord::from_bytes(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable durable cache record");
                None
            }
        }
    }

    /// Loads a live entry from the durable store, deleting it if expired.
    fn load_entry(
        &self,
        store: &dyn RecordStore,
        key: &str,
        now: f64,
        seq: u64,
    ) -> Option<CacheEntry> {
        let record = self.read_record(store, key)?;
        if record.is_expired(now) {
            self.remove_record(key);
            self.stats.record_expiration();
            debug!(key, "durable cache record expired");
            return None;
        }
        match CacheEntry::from_record(record, seq) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "ignoring durable cache record with undecodable value");
                None
            }
        }
    }
}

/// Bytes charged for `value`: its canonical encoding length, or the deep
/// in-memory estimate when it cannot be encoded.
fn estimate_size(value: &Value) -> u64 {
    match to_canonical_cbor(value) {
        Ok(bytes) => bytes.len() as u64,
        Err(e) => {
            let size = value.footprint_bytes();
            warn!(error = %e, size, "cannot encode cached value, using in-memory size");
            size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_key;
    use crate::clock::ManualClock;
    use crate::config::BYTES_PER_MB;
    use resync_storage::InMemoryStore;
    use tempfile::tempdir;

    fn cache_with(config: CacheConfig) -> (BoundedCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = BoundedCache::open_with_clock(config, clock.clone()).unwrap();
        (cache, clock)
    }

    fn memory_cache() -> (BoundedCache, Arc<ManualClock>) {
        cache_with(CacheConfig::default())
    }

    fn blob(kb: usize) -> Value {
        Value::Bytes(vec![7; kb * 1024])
    }

    #[test]
    fn miss_then_hit() {
        let (cache, _) = memory_cache();
        let key = cache_key!("load", "users");

        assert_eq!(cache.get(&key), None);
        cache.set(&key, Value::from("alice"));
        assert_eq!(cache.get(&key), Some(Value::from("alice")));

        let m = cache.metrics();
        assert_eq!((m.hits, m.misses, m.sets), (1, 1, 1));
        assert_eq!(m.hit_rate, 0.5);
        assert_eq!(m.entry_count, 1);
    }

    #[test]
    fn ttl_expiry() {
        let (cache, clock) = memory_cache();
        let key = cache_key!("f", "a");
        cache.set_with_ttl(&key, Value::Integer(1), Some(Duration::from_secs(10)));

        clock.advance(Duration::from_millis(9_900));
        assert_eq!(cache.get(&key), Some(Value::Integer(1)));

        clock.advance(Duration::from_millis(200));
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
        assert_eq!(cache.total_size_bytes(), 0);
        assert_eq!(cache.stats().expirations(), 1);
    }

    #[test]
    fn no_ttl_never_expires() {
        let (cache, clock) = cache_with(CacheConfig::default().default_ttl(None));
        let key = cache_key!("forever");
        cache.set(&key, Value::Bool(true));

        clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
        assert!(cache.contains(&key));
        assert_eq!(cache.get(&key), Some(Value::Bool(true)));
    }

    #[test]
    fn expired_durable_record_removed_by_next_set() {
        let dir = tempdir().unwrap();
        let (cache, clock) = cache_with(CacheConfig::default().persist_to(dir.path()));
        let key = cache_key!("f", "a");
        cache.set_with_ttl(&key, Value::Integer(1), Some(Duration::from_secs(5)));
        let record = dir.path().join(format!("{}.cache", key.as_str()));
        assert!(record.exists());

        clock.advance(Duration::from_secs(6));
        cache.set(&cache_key!("other"), Value::Null);
        assert!(!record.exists());
    }

    #[test]
    fn returned_values_are_independent_copies() {
        let (cache, _) = memory_cache();
        let key = cache_key!("f", "a");
        let original = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        cache.set(&key, original.clone());

        let mut first = cache.get(&key).unwrap();
        first.as_array_mut().unwrap().push(Value::Integer(3));

        assert_eq!(cache.get(&key), Some(original));
    }

    #[test]
    fn capacity_evicts_oldest_down_to_eighty_percent() {
        let (cache, clock) = cache_with(CacheConfig::default().max_size_mb(1));

        for i in 0..5 {
            cache.set(&cache_key!("large_function", i), blob(500));
            clock.advance(Duration::from_millis(10));
        }

        for i in 0..4 {
            assert!(!cache.contains(&cache_key!("large_function", i)), "{i} should be evicted");
        }
        assert!(cache.get(&cache_key!("large_function", 4)).is_some());
        assert!(cache.total_size_bytes() <= (0.8 * BYTES_PER_MB as f64) as u64);
        assert_eq!(cache.stats().evictions(), 4);
    }

    #[test]
    fn eviction_prefers_least_recently_accessed() {
        let (cache, clock) = cache_with(CacheConfig::default().max_size_mb(1));
        let keys: Vec<_> = ["a", "b", "c", "d"].iter().map(|k| cache_key!(*k)).collect();
        for key in &keys {
            cache.set(key, blob(250));
            clock.advance(Duration::from_secs(1));
        }
        assert!(cache.get(&keys[0]).is_some());
        clock.advance(Duration::from_secs(1));

        // Five 250KB values overflow 1MB; "b" then "c" go.
        cache.set(&cache_key!("e"), blob(250));

        assert!(cache.contains(&keys[0]));
        assert!(!cache.contains(&keys[1]));
        assert!(!cache.contains(&keys[2]));
        assert!(cache.contains(&keys[3]));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn oversized_value_is_still_stored() {
        let (cache, _) = cache_with(CacheConfig::default().max_size_bytes(1024));
        cache.set(&cache_key!("small"), blob(0));
        let big = cache_key!("big");
        cache.set(&big, blob(4));

        assert!(cache.contains(&big));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replacing_a_key_keeps_size_accounting() {
        let (cache, _) = memory_cache();
        let key = cache_key!("k");
        cache.set(&key, blob(10));
        cache.set(&key, blob(1));

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.total_size_bytes(),
            cache.peek(&key).unwrap().size_bytes()
        );
    }

    #[test]
    fn invalidate_counts_only_hits() {
        let (cache, _) = memory_cache();
        let key = cache_key!("k");
        cache.set(&key, Value::Null);

        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert_eq!(cache.metrics().invalidations, 1);
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn invalidate_removes_durable_only_record() {
        let store = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let writer =
            BoundedCache::with_store(CacheConfig::default(), Some(store.clone()), clock.clone());
        let reader = BoundedCache::with_store(CacheConfig::default(), Some(store.clone()), clock);

        let key = cache_key!("k");
        writer.set(&key, Value::Integer(9));
        assert!(!reader.contains(&key));
        assert!(reader.invalidate(&key));
        assert!(store.is_empty());
    }

    #[test]
    fn durable_fallback_counts_as_hit() {
        let store = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let reader =
            BoundedCache::with_store(CacheConfig::default(), Some(store.clone()), clock.clone());
        let writer = BoundedCache::with_store(CacheConfig::default(), Some(store), clock);

        let key = cache_key!("shared", 1);
        writer.set(&key, Value::from("payload"));

        assert_eq!(reader.get(&key), Some(Value::from("payload")));
        assert_eq!(reader.metrics().hits, 1);
        assert!(reader.contains(&key));
    }

    #[test]
    fn survives_restart() {
        let dir = tempdir().unwrap();
        let config = CacheConfig::default().persist_to(dir.path());
        let key = cache_key!("report", "2024");
        let table = Value::record([("rows", Value::Array(vec![Value::Integer(1)]))]);

        {
            let (cache, _) = cache_with(config.clone());
            cache.set(&key, table.clone());
        }

        let (cache, _) = cache_with(config);
        assert!(cache.contains(&key));
        assert_eq!(cache.get(&key), Some(table));
    }

    #[test]
    fn warm_up_skips_expired_and_corrupt_records() {
        let dir = tempdir().unwrap();
        let config = CacheConfig::default().persist_to(dir.path());
        let stale = cache_key!("stale");
        let fresh = cache_key!("fresh");

        {
            let (cache, _) = cache_with(config.clone());
            cache.set(&fresh, Value::Null);
            cache.set_with_ttl(&stale, Value::Null, Some(Duration::from_secs(1)));
        }
        assert!(dir
            .path()
            .join(format!("{}.cache", stale.as_str()))
            .exists());
        std::fs::write(dir.path().join("corrupt.cache"), b"\xffgarbage").unwrap();

        let clock = Arc::new(ManualClock::default());
        clock.advance(Duration::from_secs(2));
        let cache = BoundedCache::open_with_clock(config, clock).unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&fresh));
        let stale_path = dir.path().join(format!("{}.cache", stale.as_str()));
        assert!(stale_path.exists());
        assert_eq!(cache.stats().expirations(), 0);

        let infos = cache.inspect_records().unwrap();
        assert!(infos.iter().any(|i| i.key == stale.as_str() && i.expired));
        assert_eq!(cache.purge_expired(), 1);
        assert!(!stale_path.exists());
    }

    #[test]
    fn warm_up_over_ceiling_leaves_records_on_disk() {
        let dir = tempdir().unwrap();
        let keys: Vec<_> = (0..3).map(|i| cache_key!("page", i)).collect();
        {
            let (cache, clock) =
                cache_with(CacheConfig::default().persist_to(dir.path()).max_size_mb(10));
            for key in &keys {
                cache.set(key, blob(400));
                clock.advance(Duration::from_secs(1));
            }
        }

        let config = CacheConfig::default().persist_to(dir.path()).max_size_mb(1);
        let clock = Arc::new(ManualClock::default());
        clock.advance(Duration::from_secs(5));
        let cache = BoundedCache::open_with_clock(config, clock).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&keys[0]));
        assert!(cache.contains(&keys[1]));
        assert!(cache.contains(&keys[2]));
        assert_eq!(cache.inspect_records().unwrap().len(), 3);

        assert!(cache.get(&keys[0]).is_some());
        assert_eq!(cache.metrics().hits, 1);
    }

    #[test]
    fn fractional_ttl_agrees_across_instances() {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let writer =
            BoundedCache::with_store(CacheConfig::default(), Some(store.clone()), clock.clone());
        let key = cache_key!("short_lived");
        writer.set_with_ttl(&key, Value::Integer(1), Some(Duration::from_millis(500)));
        assert_eq!(writer.peek(&key).unwrap().ttl(), Some(Duration::from_secs(1)));

        clock.advance(Duration::from_millis(700));
        let reader =
            BoundedCache::with_store(CacheConfig::default(), Some(store.clone()), clock.clone());
        assert!(writer.contains(&key));
        assert_eq!(reader.get(&key), Some(Value::Integer(1)));

        clock.advance(Duration::from_millis(800));
        let late =
            BoundedCache::with_store(CacheConfig::default(), Some(store.clone()), clock.clone());
        assert!(!writer.contains(&key));
        assert!(!reader.contains(&key));
        assert_eq!(late.get(&key), None);
    }

    #[test]
    fn concurrent_mutations_keep_size_accounting() {
        let (cache, _) = cache_with(CacheConfig::default().max_size_mb(1));
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..40 {
                        let key = cache_key!("worker", t, i);
                        cache.set(&key, blob(60));
                        if i % 3 == 0 {
                            cache.invalidate(&key);
                        }
                        let _ = cache.get(&cache_key!("worker", t, i / 2));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = cache.state.lock();
        let sum: u64 = state.entries.values().map(CacheEntry::size_bytes).sum();
        assert_eq!(state.total_size_bytes, sum);
        assert!(state.total_size_bytes <= cache.config.max_size_bytes);
        assert!(!state.entries.is_empty());
    }

    #[test]
    fn corrupt_record_is_a_miss() {
        let key = cache_key!("broken");
        let store = Arc::new(InMemoryStore::with_records([(
            key.as_str(),
            b"definitely not cbor".to_vec(),
        )]));
        let cache = BoundedCache::with_store(
            CacheConfig::default(),
            Some(store),
            Arc::new(ManualClock::default()),
        );

        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.metrics().misses, 1);
        let infos = cache.inspect_records().unwrap();
        assert_eq!(infos.len(), 1);
        assert!(!infos[0].readable);
    }

    #[test]
    fn clear_empties_memory_and_disk() {
        let dir = tempdir().unwrap();
        let (cache, _) = cache_with(CacheConfig::default().persist_to(dir.path()));
        for i in 0..3 {
            cache.set(&cache_key!("f", i), Value::Integer(i));
        }
        std::fs::write(dir.path().join("corrupt.cache"), b"junk").unwrap();

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_size_bytes(), 0);
        assert!(cache.inspect_records().unwrap().is_empty());
    }

    #[test]
    fn purge_expired_covers_durable_records() {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let writer = BoundedCache::with_store(
            CacheConfig::default(),
            Some(store.clone()),
            clock.clone(),
        );
        writer.set_with_ttl(&cache_key!("a"), Value::Null, Some(Duration::from_secs(1)));
        writer.set_with_ttl(&cache_key!("b"), Value::Null, None);

        let reader = BoundedCache::with_store(
            CacheConfig::default(),
            Some(store.clone()),
            clock.clone(),
        );
        writer.set_with_ttl(&cache_key!("c"), Value::Null, Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(2));

        // "a" is in reader's memory, "c" only on disk
        assert_eq!(reader.purge_expired(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unencodable_value_uses_footprint() {
        let (cache, _) = memory_cache();
        let dup = Value::Map(vec![
            (Value::from("k"), Value::Integer(1)),
            (Value::from("k"), Value::Integer(2)),
        ]);
        let key = cache_key!("dup");
        cache.set(&key, dup.clone());

        assert_eq!(cache.peek(&key).unwrap().size_bytes(), dup.footprint_bytes());
        assert_eq!(cache.get(&key), Some(dup));
    }

    #[test]
    fn get_or_insert_with_computes_once() {
        let (cache, _) = memory_cache();
        let key = cache_key!("expensive");
        let mut calls = 0;

        for _ in 0..3 {
            let value: Result<Value, ()> = cache.get_or_insert_with(&key, || {
                calls += 1;
                Ok(Value::Integer(42))
            });
            assert_eq!(value, Ok(Value::Integer(42)));
        }
        assert_eq!(calls, 1);

        let failed: Result<Value, &str> = cache.get_or_insert_with(&cache_key!("x"), || Err("boom"));
        assert_eq!(failed, Err("boom"));
        assert!(!cache.contains(&cache_key!("x")));
    }

    #[test]
    fn stats_text_block() {
        let (cache, _) = memory_cache();
        let text = cache.stats_text();
        assert!(text.contains("Hits: 0"));
        assert!(text.contains("/ 100.00 MB"));
    }
}
