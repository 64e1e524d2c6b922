//! Deep in-memory size estimation.

use crate::table::Table;
use crate::value::Value;
use std::mem::size_of;

/// Types that can report an approximate deep heap + inline size in bytes.
///
/// Estimates count the inline size of each element plus owned heap buffers.
/// They are used to account datasets against a memory budget, not for exact
/// allocator bookkeeping.
pub trait MemoryFootprint {
    /// Approximate number of bytes held by this value.
    fn footprint_bytes(&self) -> u64;
}

impl MemoryFootprint for Value {
    fn footprint_bytes(&self) -> u64 {
        let inline = size_of::<Value>() as u64;
        let heap = match self {
            Value::Null | Value::Bool(_) | Value::Integer(_) => 0,
            Value::Bytes(b) => b.len() as u64,
            Value::Text(s) => s.len() as u64,
            Value::Array(items) => items.iter().map(MemoryFootprint::footprint_bytes).sum(),
            Value::Map(pairs) => pairs
                .iter()
                .map(|(k, v)| k.footprint_bytes() + v.footprint_bytes())
                .sum(),
        };
        inline + heap
    }
}

impl MemoryFootprint for Table {
    fn footprint_bytes(&self) -> u64 {
        let header: u64 = self
            .columns()
            .iter()
            .map(|c| (size_of::<String>() + c.len()) as u64)
            .sum();
        let body: u64 = self
            .rows()
            .iter()
            .map(|row| {
                size_of::<Vec<Value>>() as u64
                    + row.iter().map(MemoryFootprint::footprint_bytes).sum::<u64>()
            })
            .sum();
        size_of::<Table>() as u64 + header + body
    }
}

impl MemoryFootprint for String {
    fn footprint_bytes(&self) -> u64 {
        (size_of::<String>() + self.len()) as u64
    }
}

impl MemoryFootprint for Vec<u8> {
    fn footprint_bytes(&self) -> u64 {
        (size_of::<Vec<u8>>() + self.len()) as u64
    }
}

impl<T: MemoryFootprint + ?Sized> MemoryFootprint for std::sync::Arc<T> {
    fn footprint_bytes(&self) -> u64 {
        (**self).footprint_bytes()
    }
}
