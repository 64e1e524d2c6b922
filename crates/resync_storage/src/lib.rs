//! # Resync Storage
//!
//! Durable record stores for the resync cache.
//!
//! Stores are **opaque keyed byte stores**: they never interpret the
//! records they hold. The cache crate owns the record format.
//!
//! ## Design Principles
//!
//! - One record per key, replaced atomically
//! - Keys are restricted to `[A-Za-z0-9_-]` so they are safe file names
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral caches
//! - [`FileStore`] - One `<key>.cache` file per record in a directory
//!
//! ## Example
//!
//! ```rust
//! use resync_storage::{InMemoryStore, RecordStore};
//!
//! let store = InMemoryStore::new();
//! store.store("report", b"hello world").unwrap();
//! assert_eq!(store.load("report").unwrap(), Some(b"hello world".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::{FileStore, RECORD_EXTENSION};
pub use memory::InMemoryStore;
pub use store::{validate_key, RecordStore, MAX_KEY_LEN};
