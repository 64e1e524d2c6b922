//! # Resync Codec
//!
//! Value types shared by the resync resource layer.
//!
//! This crate provides:
//! - [`Value`], a dynamic payload for cached results and dataset cells
//! - [`Table`], a rectangular dataset with named columns
//! - Deterministic CBOR encoding, used to derive cache keys and to persist
//!   cached payloads
//! - [`MemoryFootprint`], deep size estimation for memory accounting
//!
//! ## Canonical encoding rules
//!
//! - Map entries are sorted by encoded key (length-first, then bytewise)
//! - Integers and lengths use the shortest encoding
//! - No floats, no indefinite-length items, no duplicate map keys
//!
//! ```
//! use resync_codec::{from_cbor, to_canonical_cbor, Table, Value};
//!
//! let table = Table::new(["id", "email"])
//!     .with_row(vec![Value::Integer(1), "a@corp.fr".into()])
//!     .unwrap();
//!
//! let bytes = to_canonical_cbor(&table.to_value()).unwrap();
//! let decoded = Table::from_value(&from_cbor(&bytes).unwrap()).unwrap();
//! assert_eq!(decoded, table);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod footprint;
mod table;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use footprint::MemoryFootprint;
pub use table::Table;
pub use value::Value;

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

impl Encode for Table {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(&self.to_value())
    }
}

impl Decode for Table {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Table::from_value(&from_cbor(bytes)?)
    }
}
