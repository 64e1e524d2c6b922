//! Deterministic cache keys.

use resync_codec::{to_canonical_cbor, Value};
use sha2::{Digest, Sha256};
use std::fmt::{self, Write};

/// The key of a cached operation result.
///
/// Derived from an operation name and its ordered arguments. Each argument
/// is rendered as the hex of its canonical CBOR encoding; the operation name
/// is length-prefixed and the parts are joined with `|`. The key is the
/// SHA-256 of that canonical string, so distinct canonical strings never
/// share a key in practice and equal arguments always do.
///
/// ```rust
/// use resync_cache::{cache_key, CacheKey};
/// use resync_codec::Value;
///
/// let a = cache_key!("load_users", "prod", 42);
/// let b = CacheKey::new("load_users", &[Value::from("prod"), Value::Integer(42)]);
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: String,
    digest: String,
}

impl CacheKey {
    /// Derives the key of `operation` called with `args`.
    pub fn new(operation: impl Into<String>, args: &[Value]) -> Self {
        let operation = operation.into();
        let canonical = Self::canonical_string(&operation, args);
        let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
        Self { operation, digest }
    }

    /// Key of an operation called without arguments.
    pub fn operation(name: impl Into<String>) -> Self {
        Self::new(name, &[])
    }

    /// The canonical string a key is hashed from.
    pub fn canonical_string(operation: &str, args: &[Value]) -> String {
        let mut out = format!("{}:{}", operation.len(), operation);
        for arg in args {
            out.push('|');
            match to_canonical_cbor(arg) {
                Ok(bytes) => push_hex(&mut out, &bytes),
                Err(e) => {
                    // 'x' never appears in hex output, so the fallback cannot
                    // collide with a canonical encoding.
                    tracing::warn!(operation, error = %e, "cache key argument is not canonical, using debug form");
                    out.push('x');
                    push_hex(&mut out, format!("{arg:?}").as_bytes());
                }
            }
        }
        out
    }

    /// The hex digest, used as the record name in durable storage.
    pub fn as_str(&self) -> &str {
        &self.digest
    }

    /// Name of the operation this key was derived from.
    pub fn operation_name(&self) -> &str {
        &self.operation
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

fn push_hex(out: &mut String, bytes: &[u8]) {
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
}

/// Builds a [`CacheKey`] from an operation name and arguments convertible
/// into [`Value`](resync_codec::Value).
#[macro_export]
macro_rules! cache_key {
    ($operation:expr $(, $arg:expr)* $(,)?) => {
        $crate::CacheKey::new($operation, &[$($crate::Value::from($arg)),*])
    };
}
