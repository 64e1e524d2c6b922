//! Durable record format.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The durable form of a cache entry, one per key.
///
/// Encoded as a CBOR map with `ciborium`. `data` is the canonical CBOR of
/// the cached value; timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Canonical CBOR of the cached value.
    #[serde(with = "cbor_bytes")]
    pub data: Vec<u8>,
    /// Creation time.
    pub timestamp: f64,
    /// Time-to-live in whole seconds. `None` never expires.
    pub ttl: Option<u64>,
    /// Number of hits recorded before the record was written.
    pub access_count: u64,
    /// Time of the last hit.
    pub last_access: f64,
    /// Size charged against the cache ceiling.
    pub size_bytes: u64,
}

impl CacheRecord {
    /// Serializes the record.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR serialization fails.
    pub fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.data.len() + 64);
        ciborium::ser::into_writer(self, &mut out).map_err(|e| CacheError::record(e.to_string()))?;
        Ok(out)
    }

    /// Deserializes a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid record.
    pub fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        ciborium::de::from_reader(bytes).map_err(|e| CacheError::record(e.to_string()))
    }

    /// Time-to-live as a duration.
    #[must_use]
    pub fn ttl_duration(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }

    /// Whether the record has outlived its time-to-live at `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_expired(&self, now: f64) -> bool {
        self.ttl.is_some_and(|ttl| now - self.timestamp >= ttl as f64)
    }
}

/// Whole seconds covering `ttl`, rounded up.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

mod cbor_bytes {
    use serde::de::{Error, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a CBOR byte string")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(v)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut out = Vec::new();
                while let Some(byte) = seq.next_element::<u8>()? {
                    out.push(byte);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_bytes(BytesVisitor)
    }
}
