//! Dynamically typed SQL values and result rows.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single SQL value as bound to a statement or read from a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// SQL comparison: `None` when either side is NULL or the storage
    /// classes are not comparable.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Real(b)) => (*a as f64).partial_cmp(b),
            (Self::Real(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Real(a), Self::Real(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Blob(a), Self::Blob(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Compare a column value against a bound operand the way `SQLite`
    /// evaluates `column <op> ?`.
    ///
    /// The operand first takes the column's affinity: numeric-looking text
    /// becomes a number next to a numeric column, and numbers become text
    /// next to a text column. Values still of different storage classes
    /// then order NULL, numbers, text, blob. `None` when either side is
    /// NULL.
    #[must_use]
    pub fn affinity_cmp(&self, operand: &Value) -> Option<Ordering> {
        if self.is_null() || operand.is_null() {
            return None;
        }
        let converted = match (self, operand) {
            (Self::Integer(_) | Self::Real(_), Self::Text(text)) => parse_numeric(text),
            (Self::Text(_), Self::Integer(v)) => Some(Self::Text(v.to_string())),
            (Self::Text(_), Self::Real(v)) => Some(Self::Text(real_text(*v))),
            _ => None,
        };
        let operand = converted.as_ref().unwrap_or(operand);
        Some(
            self.sql_cmp(operand)
                .unwrap_or_else(|| self.class_rank().cmp(&operand.class_rank())),
        )
    }

    /// Total order used for in-memory sorting.
    ///
    /// Follows the `SQLite` storage-class order: NULL, numbers, text, blob.
    /// NULL therefore sorts first in ascending order.
    #[must_use]
    pub fn order_cmp(&self, other: &Value) -> Ordering {
        self.class_rank()
            .cmp(&other.class_rank())
            .then_with(|| match (self, other) {
                (Self::Real(a), Self::Real(b)) => a.total_cmp(b),
                _ => self.sql_cmp(other).unwrap_or(Ordering::Equal),
            })
    }

    fn class_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Real(_) => 1,
            Self::Text(_) => 2,
            Self::Blob(_) => 3,
        }
    }

    /// Borrow the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

/// Numeric affinity applied to text: well-formed integer or real literals
/// convert, anything else stays text.
fn parse_numeric(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(Value::Integer(v));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Value::Real)
}

/// Text affinity applied to a real. Integral reals keep a trailing `.0`.
#[allow(clippy::float_cmp)]
fn real_text(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Conversion from a fetched [`Value`] into a Rust field type.
pub trait FromValue: Sized {
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] when the value has an incompatible type.
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &str, got: &Value) -> Error {
    Error::mapping(format!("expected {expected}, got {}", got.kind()))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(v) => Ok(*v),
            other => Err(mismatch("integer", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| Error::mapping(format!("{wide} does not fit in i32")))
    }
}

impl FromValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Real(v) => Ok(*v),
            Value::Integer(v) => Ok(*v as f64),
            other => Err(mismatch("real", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(i64::from_value(value)? != 0)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => Err(mismatch("text", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Blob(v) => Ok(v.clone()),
            other => Err(mismatch("blob", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// One flattened result row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Read the column at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] when `index` is out of range or the value
    /// cannot be converted to `T`.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.get(index).ok_or_else(|| {
            Error::mapping(format!(
                "column {index} out of range for row of {} columns",
                self.len()
            ))
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Mapping(message) => Error::mapping(format!("column {index}: {message}")),
            other => other,
        })
    }

    /// Sequential reader over the columns starting at `offset`.
    #[must_use]
    pub fn columns_from(&self, offset: usize) -> ColumnReader<'_> {
        ColumnReader {
            row: self,
            position: offset,
        }
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Reads consecutive columns of a [`Row`], as an entity mapper does for
/// its slice of a joined row.
pub struct ColumnReader<'a> {
    row: &'a Row,
    position: usize,
}

impl ColumnReader<'_> {
    /// Read the next column and advance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] when the row is exhausted or the value
    /// cannot be converted to `T`.
    pub fn read<T: FromValue>(&mut self) -> Result<T> {
        let value = self.row.get_as(self.position)?;
        self.position += 1;
        Ok(value)
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}
