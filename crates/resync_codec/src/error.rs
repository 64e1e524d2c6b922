//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding, decoding or shaping values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A map contained the same key more than once.
    #[error("duplicate map key: {key}")]
    DuplicateKey {
        /// Debug rendering of the offending key.
        key: String,
    },

    /// Float values cannot be represented.
    #[error("float values are not supported")]
    FloatForbidden,

    /// Indefinite-length items are forbidden.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Bytes remained after a complete value was decoded.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// Invalid CBOR structure.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A table row did not match the table's column count.
    #[error("row has {actual} cells but the table has {expected} columns")]
    RowWidth {
        /// Number of columns in the table.
        expected: usize,
        /// Number of cells in the rejected row.
        actual: usize,
    },

    /// Integer overflow during decoding.
    #[error("integer overflow")]
    IntegerOverflow,
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create a duplicate key error.
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }
}
