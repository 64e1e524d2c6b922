//! Error classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of failure kinds a retry policy can classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A connection could not be established or was lost.
    Connection,
    /// An operation did not complete in time.
    Timeout,
    /// An operating-system level I/O failure.
    Io,
    /// Explicitly marked as safe to retry.
    Retryable,
    /// Explicitly marked as never to be retried.
    Fatal,
    /// A caller passed a bad argument.
    InvalidArgument,
    /// A value had the wrong type or shape.
    InvalidType,
    /// A remote API rejected the request.
    Api,
    /// A database query failed.
    Database,
    /// Credentials were missing or rejected.
    Authentication,
    /// The configuration is unusable.
    Configuration,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 12] = [
        Self::Connection,
        Self::Timeout,
        Self::Io,
        Self::Retryable,
        Self::Fatal,
        Self::InvalidArgument,
        Self::InvalidType,
        Self::Api,
        Self::Database,
        Self::Authentication,
        Self::Configuration,
        Self::Other,
    ];

    /// The snake_case name used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Io => "io",
            Self::Retryable => "retryable",
            Self::Fatal => "fatal",
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidType => "invalid_type",
            Self::Api => "api",
            Self::Database => "database",
            Self::Authentication => "authentication",
            Self::Configuration => "configuration",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`ErrorKind`] name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown error kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Errors that can report their [`ErrorKind`].
///
/// Implement this for the error type of any operation run through
/// [`crate::RetryExecutor`].
pub trait Classify {
    /// The kind of this failure.
    fn kind(&self) -> ErrorKind;
}

impl Classify for io::Error {
    fn kind(&self) -> ErrorKind {
        match io::Error::kind(self) {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable => ErrorKind::Connection,
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
            io::ErrorKind::InvalidData => ErrorKind::InvalidType,
            _ => ErrorKind::Io,
        }
    }
}

impl<E: Classify + ?Sized> Classify for Box<E> {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }
}
