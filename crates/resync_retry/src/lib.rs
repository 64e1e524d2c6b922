//! # Resync Retry
//!
//! Runs fallible operations under a retry policy.
//!
//! Failures are classified through the [`Classify`] trait into a closed set
//! of [`ErrorKind`]s. A [`RetryPolicy`] names which kinds are fatal and which
//! are retryable; fatal kinds are checked first and unclassified kinds are
//! never retried. Between attempts the executor waits according to a
//! [`BackoffStrategy`], clamped to the policy's maximum delay and optionally
//! jittered.
//!
//! ## Example
//!
//! ```rust
//! use resync_retry::{BackoffStrategy, ErrorKind, OperationError, RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3)
//!     .with_strategy(BackoffStrategy::Linear)
//!     .with_base_delay(Duration::ZERO)
//!     .with_jitter(false);
//! let executor = RetryExecutor::new(policy);
//!
//! let result: Result<(), _> =
//!     executor.execute("push_user", || Err(OperationError::new(ErrorKind::InvalidArgument, "bad email")));
//!
//! assert!(result.is_err());
//! assert_eq!(executor.metrics("push_user").unwrap().total_attempts, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod error;
mod executor;
mod kind;
mod metrics;
mod policy;
mod sleeper;

pub use cancel::CancelToken;
pub use error::{OperationError, RetryError};
pub use executor::{RetryExecutor, CANCEL_POLL_INTERVAL};
pub use kind::{Classify, ErrorKind, UnknownKind};
pub use metrics::{RetryMetrics, RetrySummary};
pub use policy::{
    fibonacci, BackoffStrategy, RetryPolicy, UnknownStrategy, MIN_JITTERED_DELAY_SECS,
};
pub use sleeper::{RecordingSleeper, Sleeper, ThreadSleeper};
