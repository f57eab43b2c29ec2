//! Row and value types carried between the source cursor and the target batch.
//!
//! Values are owned: a row lives only from the moment the cursor yields it
//! until the batch containing it is flushed.

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};

/// Declared type of a NULL, so the target binder never sees an untyped null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Numeric,
    Varchar,
    Timestamp,
    Date,
    Blob,
    Clob,
    Other,
}

/// A single column value read from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with the type hint of the column it came from.
    Null(SqlNullType),

    /// Whole number (NUMBER with scale 0 or unknown).
    Integer(i64),

    /// Exact decimal (NUMBER with positive scale).
    Decimal(BigDecimal),

    /// Character data (VARCHAR2, CLOB).
    Text(String),

    /// TIMESTAMP(6), microsecond precision.
    Timestamp(NaiveDateTime),

    /// DATE, time of day dropped.
    Date(NaiveDate),

    /// BLOB contents.
    Bytes(Vec<u8>),

    /// Value of a type outside the supported table, kept in its native form.
    Opaque(OpaqueValue),
}

/// Native value of a column type the type table does not list.
///
/// Carried as read so the target binds it with the matching driver type
/// instead of converting text under the session's NLS formats.
#[derive(Debug, Clone, PartialEq)]
pub enum OpaqueValue {
    /// Any timestamp other than `TIMESTAMP(6)`, with fractional precision.
    Timestamp {
        value: NaiveDateTime,
        precision: u8,
        zone: TimestampZone,
    },

    /// RAW and LONG RAW.
    Binary(Vec<u8>),

    /// Numeric types outside `NUMBER` (FLOAT, BINARY_DOUBLE), as exact text.
    Numeric(String),

    /// Everything else, in the driver's character form.
    Text(String),
}

/// Time zone flavour of an opaque timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampZone {
    Naive,
    /// Fixed offset in seconds east of UTC.
    Offset(i32),
    /// Normalized to the session time zone.
    Local,
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Short name of the value kind, used in binding errors.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            SqlValue::Null(_) => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Date(_) => "date",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Opaque(_) => "opaque",
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<BigDecimal> for SqlValue {
    fn from(v: BigDecimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<OpaqueValue> for SqlValue {
    fn from(v: OpaqueValue) -> Self {
        SqlValue::Opaque(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

/// One source row keyed by column name.
///
/// Readers fill every discovered column, using a typed NULL when the source
/// value is null. A name that is absent reads as NULL at encode time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
        }
    }

    /// Set the value of a column, replacing any previous one.
    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.values.insert(column.into(), value);
    }

    /// Builder form of [`Row::insert`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// Remove and return the value of a column.
    pub fn take(&mut self, column: &str) -> Option<SqlValue> {
        self.values.remove(column)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A batch of encoded parameter tuples, one per row, in column order.
#[derive(Debug, Default)]
pub struct Batch {
    pub rows: Vec<Vec<SqlValue>>,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Vec<SqlValue>>) -> Self {
        Self { rows }
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null(SqlNullType::Varchar).is_null());
        assert!(!SqlValue::Integer(42).is_null());
    }

    #[test]
    fn test_row_take_removes_value() {
        let mut row = Row::new().with("ID", 1i64).with("NAME", "Ada");
        assert_eq!(row.len(), 2);
        assert_eq!(row.take("NAME"), Some(SqlValue::Text("Ada".into())));
        assert_eq!(row.get("NAME"), None);
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_from_implementations() {
        let v: SqlValue = 7i64.into();
        assert_eq!(v, SqlValue::Integer(7));
        assert_eq!(v.kind_name(), "integer");

        let v: SqlValue = vec![0xDEu8, 0xAD].into();
        assert_eq!(v, SqlValue::Bytes(vec![0xDE, 0xAD]));
    }
}
