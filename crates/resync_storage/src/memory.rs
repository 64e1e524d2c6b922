//! In-memory record store for testing.

use crate::error::StorageResult;
use crate::store::{validate_key, RecordStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory record store.
///
/// Applies the same key rules as [`crate::FileStore`], so code tested against
/// it behaves the same once pointed at a directory.
///
/// # Example
///
/// ```rust
/// use resync_storage::{InMemoryStore, RecordStore};
///
/// let store = InMemoryStore::new();
/// store.store("k", b"v").unwrap();
/// assert_eq!(store.keys().unwrap(), vec!["k".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing records.
    ///
    /// Useful for testing warm-up and corruption handling.
    #[must_use]
    pub fn with_records<I, K>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        Self {
            records: RwLock::new(records.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordStore for InMemoryStore {
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.records.read().get(key).cloned())
    }

    fn store(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.records.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.records.write().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.records.read().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<usize> {
        let mut records = self.records.write();
        let removed = records.len();
        records.clear();
        Ok(removed)
    }
}
