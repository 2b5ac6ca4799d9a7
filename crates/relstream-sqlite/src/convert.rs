//! Conversions between relstream values and `SQLite` values.

use rusqlite::types::{Value as SqliteValue, ValueRef};

use relstream_types::Value;

/// Parameter value bound to a `?` placeholder.
#[must_use]
pub fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Integer(v) => SqliteValue::Integer(*v),
        Value::Real(v) => SqliteValue::Real(*v),
        Value::Text(v) => SqliteValue::Text(v.clone()),
        Value::Blob(v) => SqliteValue::Blob(v.clone()),
    }
}

/// Column value read from a result row. Invalid UTF-8 text is replaced
/// lossily.
#[must_use]
pub fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}
