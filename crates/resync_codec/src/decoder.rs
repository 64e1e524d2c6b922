//! CBOR decoder for values written by [`crate::to_canonical_cbor`].

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Upper bound on array/map element counts accepted from input.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Upper bound on byte and text string lengths accepted from input.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Maximum nesting depth of arrays and maps.
const MAX_DEPTH: usize = 256;

/// Decode exactly one value from `bytes`.
///
/// # Errors
///
/// Returns an error if the bytes are truncated, contain floats or
/// indefinite-length items, or are followed by trailing data.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A streaming CBOR decoder over a byte slice.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.take(1)?[0];
        let major = initial >> 5;
        let info = initial & 0x1f;

        match major {
            0 => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let len = self.length(info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            3 => {
                let len = self.length(info, MAX_BYTES_LENGTH)?;
                let raw = self.take(len)?;
                std::str::from_utf8(raw)
                    .map(|s| Value::Text(s.to_string()))
                    .map_err(|_| CodecError::InvalidUtf8)
            }
            4 => {
                let len = self.length(info, MAX_CONTAINER_ELEMENTS)?;
                self.nested(|d| {
                    let mut items = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        items.push(d.decode()?);
                    }
                    Ok(Value::Array(items))
                })
            }
            5 => {
                let len = self.length(info, MAX_CONTAINER_ELEMENTS)?;
                self.nested(|d| {
                    let mut pairs = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        let key = d.decode()?;
                        let value = d.decode()?;
                        pairs.push((key, value));
                    }
                    Ok(Value::map(pairs))
                })
            }
            6 => {
                // Tags carry no meaning here; decode the tagged item.
                self.argument(info)?;
                self.decode()
            }
            _ => match info {
                20 => Ok(Value::Bool(false)),
                21 => Ok(Value::Bool(true)),
                22 | 23 => Ok(Value::Null),
                25..=27 => Err(CodecError::FloatForbidden),
                31 => Err(CodecError::IndefiniteLengthForbidden),
                other => Err(CodecError::invalid_structure(format!(
                    "unsupported simple value {other}"
                ))),
            },
        }
    }

    fn nested<F>(&mut self, f: F) -> CodecResult<Value>
    where
        F: FnOnce(&mut Self) -> CodecResult<Value>,
    {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn argument(&mut self, info: u8) -> CodecResult<u64> {
        let value = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => u64::from(self.take(1)?[0]),
            25 => {
                let b = self.take(2)?;
                u64::from(u16::from_be_bytes([b[0], b[1]]))
            }
            26 => {
                let b = self.take(4)?;
                u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            27 => {
                let b = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                u64::from_be_bytes(raw)
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };

        let minimum = match info {
            24 => 24,
            25 => 0x100,
            26 => 0x1_0000,
            _ => 0x1_0000_0000,
        };
        if value < minimum {
            return Err(CodecError::invalid_structure(
                "non-canonical: argument could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    fn length(&mut self, info: u8, max: u64) -> CodecResult<usize> {
        let len = self.argument(info)?;
        if len > max {
            return Err(CodecError::invalid_structure(format!(
                "length {len} exceeds limit {max}"
            )));
        }
        usize::try_from(len).map_err(|_| CodecError::IntegerOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::to_canonical_cbor;

    #[test]
    fn decodes_nested_record() {
        let value = Value::record([
            ("name", Value::from("Alice")),
            (
                "roles",
                Value::Array(vec![Value::from("admin"), Value::Integer(-7)]),
            ),
            ("blob", Value::Bytes(vec![0, 1, 2])),
            ("manager", Value::Null),
        ]);

        let bytes = to_canonical_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn rejects_floats() {
        // half-precision 1.0
        assert_eq!(
            from_cbor(&[0xf9, 0x3c, 0x00]),
            Err(CodecError::FloatForbidden)
        );
    }

    #[test]
    fn rejects_indefinite_length() {
        assert_eq!(
            from_cbor(&[0x9f, 0x01, 0xff]),
            Err(CodecError::IndefiniteLengthForbidden)
        );
    }

    #[test]
    fn rejects_non_shortest_integer() {
        assert!(matches!(
            from_cbor(&[0x18, 0x05]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn rejects_truncated_and_trailing_input() {
        assert_eq!(from_cbor(&[0x65, b'h']), Err(CodecError::UnexpectedEof));
        assert_eq!(
            from_cbor(&[0x01, 0x02]),
            Err(CodecError::TrailingBytes { remaining: 1 })
        );
    }

    #[test]
    fn rejects_oversized_container_header() {
        // array claiming 2^32 elements
        assert!(from_cbor(&[0x9b, 0, 0, 0, 1, 0, 0, 0, 0]).is_err());
    }
}
