//! Property-based test generators using proptest.

use proptest::prelude::*;
use resync_codec::{Table, Value};

/// Strategy for scalar values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9@._ -]{0,24}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

/// Strategy for nested values with text-keyed maps.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,10}", inner, 0..6).prop_map(|m| {
                Value::map(m.into_iter().map(|(k, v)| (Value::Text(k), v)).collect())
            }),
        ]
    })
}

/// Strategy for column names.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Strategy for tables of scalar cells with distinct column names.
pub fn table_strategy() -> impl Strategy<Value = Table> {
    prop::collection::btree_set(column_name_strategy(), 1..6)
        .prop_flat_map(|columns| {
            let width = columns.len();
            (
                Just(columns),
                prop::collection::vec(prop::collection::vec(scalar_strategy(), width), 0..12),
            )
        })
        .prop_map(|(columns, rows)| {
            let mut table = Table::new(columns);
            for row in rows {
                table.push_row(row).expect("row width matches columns");
            }
            table
        })
}

/// Strategy for operation names as used in cache keys.
pub fn operation_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,23}"
}

/// Strategy for argument lists of cached operations.
pub fn args_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(value_strategy(), 0..4)
}
