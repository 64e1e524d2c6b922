//! Tabular datasets.
//!
//! A [`Table`] is the in-memory shape of a query result or an API listing:
//! named columns and rows of [`Value`] cells. It converts to a single
//! [`Value`] so it can be cached and persisted like any other payload.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// A rectangular dataset with named columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::RowWidth`] if the row does not have one cell per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> CodecResult<()> {
        if row.len() != self.columns.len() {
            return Err(CodecError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builder-style [`Table::push_row`].
    pub fn with_row(mut self, row: Vec<Value>) -> CodecResult<Self> {
        self.push_row(row)?;
        Ok(self)
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Mutable access to the rows. Row widths must be preserved by the caller.
    pub fn rows_mut(&mut self) -> &mut [Vec<Value>] {
        &mut self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterates over the cells of one column.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Converts the table into a `{"columns": [...], "rows": [[...]]}` value.
    pub fn to_value(&self) -> Value {
        Value::record([
            (
                "columns",
                Value::Array(self.columns.iter().map(Value::from).collect()),
            ),
            (
                "rows",
                Value::Array(self.rows.iter().cloned().map(Value::Array).collect()),
            ),
        ])
    }

    /// Rebuilds a table from the shape produced by [`Table::to_value`].
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not have that shape or a row has the
    /// wrong width.
    pub fn from_value(value: &Value) -> CodecResult<Self> {
        let columns = value
            .get("columns")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::invalid_structure("table value has no columns array"))?;
        let rows = value
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::invalid_structure("table value has no rows array"))?;

        let mut table = Table::new(
            columns
                .iter()
                .map(|c| {
                    c.as_text()
                        .map(str::to_string)
                        .ok_or_else(|| CodecError::invalid_structure("column name is not text"))
                })
                .collect::<CodecResult<Vec<_>>>()?,
        );
        for row in rows {
            let cells = row
                .as_array()
                .ok_or_else(|| CodecError::invalid_structure("table row is not an array"))?;
            table.push_row(cells.to_vec())?;
        }
        Ok(table)
    }
}

impl From<&Table> for Value {
    fn from(table: &Table) -> Self {
        table.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new(["email", "department"])
            .with_row(vec!["a@corp.fr".into(), "IT".into()])
            .unwrap()
            .with_row(vec!["b@corp.fr".into(), Value::Null])
            .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let mut table = Table::new(["a", "b"]);
        let err = table.push_row(vec![Value::Integer(1)]).unwrap_err();
        assert_eq!(
            err,
            CodecError::RowWidth {
                expected: 2,
                actual: 1
            }
        );
        assert!(table.is_empty());
    }

    #[test]
    fn column_access() {
        let table = users();
        let emails: Vec<_> = table
            .column("email")
            .unwrap()
            .filter_map(Value::as_text)
            .collect();
        assert_eq!(emails, vec!["a@corp.fr", "b@corp.fr"]);
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn value_shape_is_reversible() {
        let table = users();
        assert_eq!(Table::from_value(&table.to_value()).unwrap(), table);
        assert!(Table::from_value(&Value::Integer(3)).is_err());
    }
}
