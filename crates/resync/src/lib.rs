//! # Resync
//!
//! The resource lifecycle layer of a synchronization job.
//!
//! A run reads remote data, transforms it and pushes it to a target API.
//! This crate bundles the three resources such a run needs:
//!
//! - a [`BoundedCache`] memoizing idempotent remote reads,
//! - a [`RetryExecutor`] wrapping every remote call,
//! - a [`MemoryBudget`] holding large intermediate datasets by scope.
//!
//! The components do not depend on each other. [`ResourceLayer`] builds all
//! three from a [`LayerConfig`] and hands out shared handles.
//!
//! ## Example
//!
//! ```rust
//! use resync::{LayerConfig, ResourceLayer};
//! use resync::cache::cache_key;
//! use resync::codec::Value;
//! use resync::retry::OperationError;
//!
//! let config = LayerConfig::from_yaml_str(
//!     "cache:\n  persist: false\nretry:\n  base_delay: 0.0\n",
//! )
//! .unwrap();
//! let layer = ResourceLayer::from_config(&config).unwrap();
//!
//! let users = layer
//!     .fetch(&cache_key!("remote_users", "prod"), || {
//!         Ok::<_, OperationError>(Value::from("alice"))
//!     })
//!     .unwrap();
//! assert_eq!(users, Value::from("alice"));
//! assert_eq!(layer.cache().unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod global;
mod layer;

pub use config::{CacheSection, LayerConfig, MemorySection, RetrySection};
pub use error::{ConfigError, ConfigResult, LayerError, LayerResult};
pub use global::{global, install_global};
pub use layer::{CacheFlagOutcome, ResourceLayer};

/// Version of the resync crates.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use resync_cache::BoundedCache;
pub use resync_memory::MemoryBudget;
pub use resync_retry::RetryExecutor;

/// Values and tables.
pub mod codec {
    pub use resync_codec::*;
}

/// The bounded cache.
pub mod cache {
    pub use resync_cache::*;
}

/// The retry executor.
pub mod retry {
    pub use resync_retry::*;
}

/// The memory budget.
pub mod memory {
    pub use resync_memory::*;
}
