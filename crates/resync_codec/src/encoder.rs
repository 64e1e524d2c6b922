//! Canonical CBOR encoder.
//!
//! Output is deterministic: integers and lengths use the shortest form and
//! map entries are written in length-first, bytewise order of their encoded
//! keys. Cache keys are derived from these bytes, so two values encode to the
//! same bytes if and only if they are equal.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to canonical CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DuplicateKey`] if any map in `value` repeats a key.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
    lenient: bool,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            lenient: false,
        }
    }

    /// Encodes without rejecting duplicate map keys. Used for ordering only.
    pub(crate) fn lenient_bytes(value: &Value) -> Vec<u8> {
        let mut encoder = Self {
            buffer: Vec::new(),
            lenient: true,
        };
        // Lenient encoding has no failure path.
        let _ = encoder.encode(value);
        encoder.buffer
    }

    /// Encode a value, appending to the internal buffer.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(false) => self.buffer.push(0xf4),
            Value::Bool(true) => self.buffer.push(0xf5),
            Value::Integer(n) => self.write_integer(*n),
            Value::Bytes(b) => {
                self.write_head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.write_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.write_head(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(pairs) => self.write_map(pairs)?,
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn write_integer(&mut self, n: i64) {
        if n >= 0 {
            self.write_head(0, n as u64);
        } else {
            // Major type 1 carries -1 - n, which is non-negative for any negative n.
            self.write_head(1, (-1 - n) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_head(&mut self, major_type: u8, argument: u64) {
        let mt = major_type << 5;
        match argument {
            0..=23 => self.buffer.push(mt | argument as u8),
            24..=0xff => {
                self.buffer.push(mt | 24);
                self.buffer.push(argument as u8);
            }
            0x100..=0xffff => {
                self.buffer.push(mt | 25);
                self.buffer
                    .extend_from_slice(&(argument as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buffer.push(mt | 26);
                self.buffer
                    .extend_from_slice(&(argument as u32).to_be_bytes());
            }
            _ => {
                self.buffer.push(mt | 27);
                self.buffer.extend_from_slice(&argument.to_be_bytes());
            }
        }
    }

    fn write_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let mut key_encoder = Self {
                buffer: Vec::new(),
                lenient: self.lenient,
            };
            key_encoder.encode(key)?;
            entries.push((key_encoder.buffer, key, value));
        }

        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        if !self.lenient {
            if let Some(pair) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
                return Err(CodecError::duplicate_key(format!("{:?}", pair[0].1)));
            }
        }

        self.write_head(5, entries.len() as u64);
        for (encoded_key, _, value) in entries {
            self.buffer.extend_from_slice(&encoded_key);
            self.encode(value)?;
        }
        Ok(())
    }
}
