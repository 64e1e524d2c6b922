//! Synthetic datasets for memory budget tests.

use resync_codec::{MemoryFootprint, Table, Value};

/// Bytes in one mebibyte.
const MB: u64 = 1024 * 1024;

/// A dataset that reports a fixed footprint without allocating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedDataset {
    bytes: u64,
}

impl SizedDataset {
    /// A dataset of `bytes` bytes.
    pub fn bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// A dataset of `mb` mebibytes.
    pub fn mb(mb: u64) -> Self {
        Self::bytes(mb * MB)
    }
}

impl MemoryFootprint for SizedDataset {
    fn footprint_bytes(&self) -> u64 {
        self.bytes
    }
}

/// A table of `rows` users with `email`, `department` and `active` columns.
pub fn users_table(rows: usize) -> Table {
    let mut table = Table::new(["email", "department", "active"]);
    for i in 0..rows {
        table
            .push_row(vec![
                Value::from(format!("user{i}@corp.fr")),
                Value::from(if i % 2 == 0 { "IT" } else { "Finance" }),
                Value::Bool(i % 3 != 0),
            ])
            .expect("three cells per row");
    }
    table
}

/// A single-cell value whose canonical encoding is roughly `bytes` long.
pub fn blob_value(bytes: usize) -> Value {
    Value::Bytes(vec![0xab; bytes])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_dataset_reports_its_size() {
        assert_eq!(SizedDataset::mb(3).footprint_bytes(), 3 * MB);
    }

    #[test]
    fn users_table_has_requested_rows() {
        let table = users_table(5);
        assert_eq!(table.len(), 5);
        assert_eq!(table.columns().len(), 3);
    }
}
