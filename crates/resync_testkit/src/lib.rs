//! # Resync Testkit
//!
//! Test utilities for resync.
//!
//! This crate provides:
//! - Cache fixtures over temporary directories and manual clocks
//! - Property-based generators for values and tables
//! - Scripted flaky operations for retry tests
//! - Synthetic datasets for memory budget tests
//!
//! ## Usage
//!
//! ```rust
//! use resync_testkit::prelude::*;
//! use resync_cache::cache_key;
//!
//! with_temp_cache(|cache, dir| {
//!     let key = cache_key!("remote_users");
//!     cache.set(&key, users_table(3).to_value());
//!     assert_eq!(dir.record_digests().len(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod datasets;
pub mod fixtures;
pub mod flaky;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::datasets::*;
    pub use crate::fixtures::*;
    pub use crate::flaky::*;
    pub use crate::generators::*;
}

pub use datasets::*;
pub use fixtures::*;
pub use flaky::*;
pub use generators::*;
