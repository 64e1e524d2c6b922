//! # Resync Memory
//!
//! A memory budget for large intermediate datasets.
//!
//! [`MemoryBudget`] holds named datasets grouped by scope and charges each
//! one its [`MemoryFootprint`](resync_codec::MemoryFootprint). When a new
//! registration would cross the cleanup threshold, the least recently
//! accessed datasets are evicted first; a dataset that cannot fit even then
//! is refused and `register` returns `false`. A whole phase of work is
//! released at once with [`MemoryBudget::cleanup_scope`].
//!
//! ## Example
//!
//! ```rust
//! use resync_memory::{BudgetConfig, MemoryBudget};
//! use resync_codec::{Table, Value};
//!
//! let budget: MemoryBudget = MemoryBudget::with_probe(BudgetConfig::default(), None);
//!
//! let users = Table::new(["email"]).with_row(vec!["a@corp.fr".into()]).unwrap();
//! assert!(budget.register("remote_users", users, "users"));
//!
//! let users = budget.get("remote_users").unwrap();
//! assert_eq!(users.len(), 1);
//!
//! assert!(budget.cleanup_scope("users") > 0);
//! assert!(budget.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod budget;
mod config;
mod probe;
mod stats;

pub use budget::{DatasetRecord, MemoryBudget};
pub use config::{
    BudgetConfig, BYTES_PER_MB, DEFAULT_CLEANUP_THRESHOLD, DEFAULT_MAX_MEMORY_MB,
    EVICTION_TARGET_FRACTION,
};
pub use probe::{HostMemory, HostMemoryProbe, SysinfoProbe};
pub use stats::{MemoryStats, ScopeUsage};
