//! Oracle type table: how each catalog type is extracted from the source
//! and how its values (and NULLs) are bound on the target.
//!
//! | catalog type   | extracted as          | bound as          |
//! |----------------|-----------------------|-------------------|
//! | `NUMBER`       | decimal if scale > 0, else integer | numeric |
//! | `VARCHAR2`     | text                  | varchar           |
//! | `TIMESTAMP(6)` | timestamp             | timestamp         |
//! | `DATE`         | date                  | date              |
//! | `BLOB`         | bytes                 | blob              |
//! | `CLOB`         | text                  | clob              |
//! | anything else  | driver-native value   | its own driver type |

use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::core::{Batch, ColumnInfo, Row, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

/// Catalog type string, matched exactly as the dictionary reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTypeTag {
    Number,
    Varchar2,
    Timestamp6,
    Date,
    Blob,
    Clob,
    Other(String),
}

impl DataTypeTag {
    pub fn from_catalog(data_type: &str) -> Self {
        match data_type {
            "NUMBER" => DataTypeTag::Number,
            "VARCHAR2" => DataTypeTag::Varchar2,
            "TIMESTAMP(6)" => DataTypeTag::Timestamp6,
            "DATE" => DataTypeTag::Date,
            "BLOB" => DataTypeTag::Blob,
            "CLOB" => DataTypeTag::Clob,
            other => DataTypeTag::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DataTypeTag::Number => "NUMBER",
            DataTypeTag::Varchar2 => "VARCHAR2",
            DataTypeTag::Timestamp6 => "TIMESTAMP(6)",
            DataTypeTag::Date => "DATE",
            DataTypeTag::Blob => "BLOB",
            DataTypeTag::Clob => "CLOB",
            DataTypeTag::Other(s) => s,
        }
    }
}

/// How a reader pulls a column out of a source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    Integer,
    Decimal,
    Text,
    Timestamp,
    Date,
    Bytes,
    LongText,
    Opaque,
}

/// Pick the extractor for a column.
pub fn extractor_for(column: &ColumnInfo) -> Extractor {
    match column.tag() {
        DataTypeTag::Number if column.scale > 0 => Extractor::Decimal,
        DataTypeTag::Number => Extractor::Integer,
        DataTypeTag::Varchar2 => Extractor::Text,
        DataTypeTag::Timestamp6 => Extractor::Timestamp,
        DataTypeTag::Date => Extractor::Date,
        DataTypeTag::Blob => Extractor::Bytes,
        DataTypeTag::Clob => Extractor::LongText,
        DataTypeTag::Other(_) => Extractor::Opaque,
    }
}

/// NULL type hint for a column.
pub fn null_type_for(column: &ColumnInfo) -> SqlNullType {
    match column.tag() {
        DataTypeTag::Number => SqlNullType::Numeric,
        DataTypeTag::Varchar2 => SqlNullType::Varchar,
        DataTypeTag::Timestamp6 => SqlNullType::Timestamp,
        DataTypeTag::Date => SqlNullType::Date,
        DataTypeTag::Blob => SqlNullType::Blob,
        DataTypeTag::Clob => SqlNullType::Clob,
        DataTypeTag::Other(_) => SqlNullType::Other,
    }
}

/// Typed NULL for a column.
pub fn null_for(column: &ColumnInfo) -> SqlValue {
    SqlValue::Null(null_type_for(column))
}

/// Parse the text form of an Oracle NUMBER into an exact decimal.
pub fn parse_decimal(column: &ColumnInfo, text: &str) -> Result<SqlValue> {
    BigDecimal::from_str(text.trim())
        .map(SqlValue::Decimal)
        .map_err(|e| {
            MigrateError::Read(format!(
                "column {}: cannot parse NUMBER value '{}': {}",
                column.name, text, e
            ))
        })
}

/// Parse the text form of a scale-0 NUMBER into an integer.
///
/// A column declared without precision can hold fractions or values beyond
/// 64 bits; those are reported rather than truncated.
pub fn parse_integer(column: &ColumnInfo, text: &str) -> Result<SqlValue> {
    text.trim().parse::<i64>().map(SqlValue::Integer).map_err(|_| {
        if column.precision == 0 {
            MigrateError::Read(format!(
                "column {}: NUMBER declared without precision holds '{}', which is not a \
                 64-bit integer; declare a scale on the source column to copy it as a decimal",
                column.name, text
            ))
        } else {
            MigrateError::Read(format!(
                "column {}: NUMBER({}) value '{}' is not a 64-bit integer",
                column.name, column.precision, text
            ))
        }
    })
}

/// Check that a non-null value has a kind the column's binder accepts.
fn check_bindable(column: &ColumnInfo, value: &SqlValue) -> Result<()> {
    let accepted = match column.tag() {
        DataTypeTag::Number => matches!(value, SqlValue::Integer(_) | SqlValue::Decimal(_)),
        DataTypeTag::Varchar2 | DataTypeTag::Clob => matches!(value, SqlValue::Text(_)),
        DataTypeTag::Timestamp6 => matches!(value, SqlValue::Timestamp(_)),
        DataTypeTag::Date => matches!(value, SqlValue::Date(_)),
        DataTypeTag::Blob => matches!(value, SqlValue::Bytes(_)),
        DataTypeTag::Other(_) => true,
    };
    if accepted {
        Ok(())
    } else {
        Err(MigrateError::Write(format!(
            "column {} ({}) cannot bind a {} value",
            column.name,
            column.data_type,
            value.kind_name()
        )))
    }
}

/// Turn a row into a parameter tuple in column order.
///
/// Missing and null values become NULLs typed from the column, never from
/// the value.
pub fn encode_row(columns: &[ColumnInfo], mut row: Row) -> Result<Vec<SqlValue>> {
    let mut params = Vec::with_capacity(columns.len());
    for column in columns {
        let value = match row.take(&column.name) {
            Some(value) if !value.is_null() => {
                check_bindable(column, &value)?;
                value
            }
            _ => null_for(column),
        };
        params.push(value);
    }
    Ok(params)
}

/// Encode a group of rows into one batch.
pub fn encode_batch(columns: &[ColumnInfo], rows: Vec<Row>) -> Result<Batch> {
    let rows = rows
        .into_iter()
        .map(|row| encode_row(columns, row))
        .collect::<Result<Vec<_>>>()?;
    Ok(Batch::new(rows))
}
