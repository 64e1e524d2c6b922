//! Record store trait definition.

use crate::error::{StorageError, StorageResult};

/// Longest key accepted by [`validate_key`].
pub const MAX_KEY_LEN: usize = 128;

/// A keyed store of opaque records.
///
/// Stores do not interpret the bytes they hold; the cache owns the record
/// format. Every key maps to at most one record.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the last successful `store` for that key
/// - a failed or interrupted `store` never damages the record of another key
///   or the previous record of the same key
/// - implementations are `Send + Sync` and serialize their own mutations
pub trait RecordStore: Send + Sync {
    /// Reads the record stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `data` under `key`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn store(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the record under `key`. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or removal fails.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists the keys of all stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Removes every record and returns how many were removed.
    ///
    /// Implementations keep going past records that cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot be enumerated at all.
    fn clear(&self) -> StorageResult<usize>;

    /// Whether a record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.load(key)?.is_some())
    }
}

/// Checks that `key` is non-empty, short, and made of `[A-Za-z0-9_-]`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] describing the first violated rule.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::invalid_key(key, "empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StorageError::invalid_key(key, "too long"));
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(StorageError::invalid_key(
            key,
            "only ASCII letters, digits, '_' and '-' are allowed",
        ));
    }
    Ok(())
}
