//! Error types for the retry crate.

use crate::kind::{Classify, ErrorKind};
use thiserror::Error;

/// A ready-made classified error for operations without their own error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct OperationError {
    /// Classification used by the retry policy.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl OperationError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an error explicitly marked as retryable.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    /// Creates an error explicitly marked as fatal.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }
}

impl Classify for OperationError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Failure of a cancellable retry run.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed fatally or ran out of attempts.
    #[error(transparent)]
    Failed(E),

    /// The cancel token fired between attempts.
    #[error("cancelled after {attempts} attempt(s): {last_error}")]
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
        /// Error of the last attempt.
        last_error: E,
    },
}

impl<E> RetryError<E> {
    /// Whether the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The error of the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            Self::Failed(e) | Self::Cancelled { last_error: e, .. } => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_error_display() {
        let err = OperationError::retryable("connection reset");
        assert_eq!(err.to_string(), "retryable: connection reset");
        assert_eq!(err.kind(), ErrorKind::Retryable);
        assert_eq!(OperationError::fatal("bad").kind(), ErrorKind::Fatal);
    }

    #[test]
    fn retry_error_unwraps() {
        let failed: RetryError<OperationError> = RetryError::Failed(OperationError::fatal("x"));
        assert!(!failed.is_cancelled());
        assert_eq!(failed.to_string(), "fatal: x");

        let cancelled = RetryError::Cancelled {
            attempts: 2,
            last_error: OperationError::retryable("y"),
        };
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.to_string(), "cancelled after 2 attempt(s): retryable: y");
        assert_eq!(cancelled.into_inner().message, "y");
    }
}
