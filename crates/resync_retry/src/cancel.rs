//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cancellation flag with an optional deadline.
///
/// Clones share the flag, so one thread can cancel a run driven by another.
/// The retry executor checks the token between attempts and while waiting;
/// it never interrupts an attempt in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Creates a token that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that also fires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// Creates a token that also fires once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// Cancels every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears an explicit cancellation. The deadline still applies.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Whether the token was cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());

        other.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn deadline_fires() {
        let past = CancelToken::with_deadline(Instant::now());
        assert!(past.is_cancelled());

        let future = CancelToken::with_timeout(Duration::from_secs(3600));
        assert!(!future.is_cancelled());
        assert!(future.deadline().is_some());
    }
}
