//! Scripted failures for retry tests.

use parking_lot::Mutex;
use resync_retry::{ErrorKind, OperationError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

/// An operation that fails with a scripted sequence of error kinds, then
/// succeeds with a value.
///
/// ```rust
/// use resync_testkit::FlakyOperation;
/// use resync_retry::ErrorKind;
///
/// let op = FlakyOperation::new([ErrorKind::Timeout], 7);
/// assert!(op.call().is_err());
/// assert_eq!(op.call().unwrap(), 7);
/// assert_eq!(op.calls(), 2);
/// ```
#[derive(Debug)]
pub struct FlakyOperation<T> {
    failures: Mutex<VecDeque<ErrorKind>>,
    value: T,
    calls: AtomicU32,
}

impl<T: Clone> FlakyOperation<T> {
    /// Fails once per entry of `failures`, in order, then returns `value`.
    pub fn new(failures: impl IntoIterator<Item = ErrorKind>, value: T) -> Self {
        Self {
            failures: Mutex::new(failures.into_iter().collect()),
            value,
            calls: AtomicU32::new(0),
        }
    }

    /// Fails `times` times with `kind`, then returns `value`.
    pub fn failing(kind: ErrorKind, times: usize, value: T) -> Self {
        Self::new(std::iter::repeat(kind).take(times), value)
    }

    /// Runs one attempt.
    pub fn call(&self) -> Result<T, OperationError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self.failures.lock().pop_front();
        match next {
            Some(kind) => Err(OperationError::new(kind, format!("scripted failure #{attempt}"))),
            None => Ok(self.value.clone()),
        }
    }

    /// Number of attempts made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Failures not yet delivered.
    pub fn remaining_failures(&self) -> usize {
        self.failures.lock().len()
    }
}

/// An operation that always fails with `kind`.
pub fn always_failing(kind: ErrorKind) -> impl FnMut() -> Result<(), OperationError> {
    let mut attempt = 0;
    move || {
        attempt += 1;
        Err(OperationError::new(kind, format!("persistent failure #{attempt}")))
    }
}
