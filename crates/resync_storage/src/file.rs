//! Directory-backed record store.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, RecordStore};
use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// File extension of stored records.
pub const RECORD_EXTENSION: &str = "cache";

const TEMP_EXTENSION: &str = "tmp";

/// A record store keeping one file per key in a directory.
///
/// Each record lives at `<root>/<key>.cache`. Writes go to a temporary file
/// in the same directory which is then renamed over the target, so readers
/// see either the old record or the new one, never a torn write.
///
/// # Thread Safety
///
/// Writers are serialized by an internal lock. Reads do not take the lock.
///
/// # Example
///
/// ```no_run
/// use resync_storage::{FileStore, RecordStore};
/// use std::path::Path;
///
/// let store = FileStore::open_with_create_dirs(Path::new("cache")).unwrap();
/// store.store("users", b"payload").unwrap();
/// assert_eq!(store.load("users").unwrap().as_deref(), Some(&b"payload"[..]));
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens an existing directory as a record store.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist or is not a directory.
    pub fn open(root: &Path) -> StorageResult<Self> {
        let metadata = fs::metadata(root)?;
        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory(root.display().to_string()));
        }
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Opens a record store, creating the directory and its parents if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open_with_create_dirs(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Self::open(root)
    }

    /// Returns the store's root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`'s record.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid.
    pub fn record_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.{RECORD_EXTENSION}")))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{key}.{TEMP_EXTENSION}"))
    }
}

impl RecordStore for FileStore {
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.record_path(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.record_path(key)?;
        let temp = self.temp_path(key);
        let _guard = self.write_lock.lock();

        let result = (|| {
            let mut file = fs::File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&temp, &path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let path = self.record_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|entry| record_key(entry.map(|e| e.path())))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> StorageResult<usize> {
        let keys = self.keys()?;
        let _guard = self.write_lock.lock();
        let mut removed = 0;
        for key in keys {
            let path = self.root.join(format!("{key}.{RECORD_EXTENSION}"));
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove record");
                }
            }
        }
        Ok(removed)
    }
}

/// The record key named by a directory entry, if it is a record file.
///
/// Entries that cannot be read are logged and skipped.
fn record_key(entry: std::io::Result<PathBuf>) -> Option<String> {
    let path = match entry {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unreadable directory entry");
            return None;
        }
    };
    if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
        return None;
    }
    let stem = path.file_stem().and_then(|s| s.to_str())?;
    validate_key(stem).ok()?;
    Some(stem.to_string())
}
