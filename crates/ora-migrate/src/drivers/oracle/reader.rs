//! Oracle source reader.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use oracle::sql_type::{OracleType, Timestamp};
use tokio::sync::mpsc;
use tracing::debug;

use super::{positional_binds, read_err, with_connection, OraclePool, PROBE_SQL};
use crate::config::DatabaseConfig;
use crate::core::{
    ColumnInfo, OpaqueValue, Row, RowCursor, SourceReader, SqlValue, TimestampZone,
};
use crate::error::{MigrateError, Result};
use crate::introspect::{
    COLUMNS_BY_OWNER_SQL, COLUMNS_SQL, PARTITIONS_BY_OWNER_SQL, PARTITIONS_SQL,
};
use crate::query::SelectStatement;
use crate::typemap::{self, Extractor};

/// Reads catalogs and rows from an Oracle database.
pub struct OracleSource {
    pool: OraclePool,
    owner: Option<String>,
    fetch_size: usize,
}

impl OracleSource {
    /// Create a reader. No connection is opened until first use.
    pub fn new(config: &DatabaseConfig, fetch_size: usize) -> Self {
        Self {
            pool: super::build_pool(config),
            owner: config.schema.clone(),
            fetch_size: fetch_size.max(1),
        }
    }
}

#[async_trait]
impl SourceReader for OracleSource {
    async fn column_catalog(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let table = table.to_string();
        let owner = self.owner.clone();
        with_connection(&self.pool, "reading column catalog", move |conn| {
            let sql = positional_binds(if owner.is_some() {
                COLUMNS_BY_OWNER_SQL
            } else {
                COLUMNS_SQL
            });
            let rows = match &owner {
                Some(owner) => conn.query(&sql, &[owner, &table]),
                None => conn.query(&sql, &[&table]),
            }
            .map_err(read_err)?;

            let mut columns = Vec::new();
            for row in rows {
                let row = row.map_err(read_err)?;
                let name: String = row.get(0).map_err(read_err)?;
                let data_type: String = row.get(1).map_err(read_err)?;
                let length: Option<i32> = row.get(2).map_err(read_err)?;
                let precision: Option<i32> = row.get(3).map_err(read_err)?;
                let scale: Option<i32> = row.get(4).map_err(read_err)?;
                columns.push(ColumnInfo {
                    name,
                    data_type,
                    length: length.unwrap_or(0),
                    precision: precision.unwrap_or(0),
                    scale: scale.unwrap_or(0),
                });
            }
            Ok(columns)
        })
        .await
    }

    async fn partition_catalog(&self, table: &str, key_pattern: &str) -> Result<Vec<String>> {
        let table = table.to_string();
        let pattern = key_pattern.to_string();
        let owner = self.owner.clone();
        with_connection(&self.pool, "reading partition catalog", move |conn| {
            let sql = positional_binds(if owner.is_some() {
                PARTITIONS_BY_OWNER_SQL
            } else {
                PARTITIONS_SQL
            });
            let rows = match &owner {
                Some(owner) => conn.query(&sql, &[owner, &table, &pattern]),
                None => conn.query(&sql, &[&table, &pattern]),
            }
            .map_err(read_err)?;

            let mut partitions = Vec::new();
            for row in rows {
                let row = row.map_err(read_err)?;
                partitions.push(row.get::<usize, String>(0).map_err(read_err)?);
            }
            Ok(partitions)
        })
        .await
    }

    fn open_cursor(&self, select: &SelectStatement) -> RowCursor {
        let (tx, rx) = mpsc::channel(self.fetch_size);
        let pool = self.pool.clone();
        let sql = select.sql.clone();
        let columns = select.columns.clone();
        let fetch_size = self.fetch_size as u32;

        let producer = tokio::task::spawn_blocking(move || {
            if let Err(e) = stream_rows(&pool, &sql, &columns, fetch_size, &tx) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        RowCursor::new(rx, Some(producer))
    }

    async fn ping(&self) -> Result<()> {
        with_connection(&self.pool, "probing source", |conn| {
            conn.query_row(PROBE_SQL, &[]).map_err(read_err)?;
            Ok(())
        })
        .await
    }

    fn db_type(&self) -> &str {
        "oracle"
    }
}

fn stream_rows(
    pool: &OraclePool,
    sql: &str,
    columns: &Arc<[ColumnInfo]>,
    fetch_size: u32,
    tx: &mpsc::Sender<Result<Row>>,
) -> Result<()> {
    let conn = pool
        .get()
        .map_err(|e| MigrateError::connectivity(e.to_string(), "opening source cursor"))?;
    let mut stmt = conn
        .statement(sql)
        .prefetch_rows(fetch_size)
        .fetch_array_size(fetch_size)
        .build()
        .map_err(read_err)?;
    let rows = stmt.query(&[]).map_err(read_err)?;
    let cursor_types: Vec<OracleType> = rows
        .column_info()
        .iter()
        .map(|info| info.oracle_type().clone())
        .collect();
    let plan = decode_plan(columns, &cursor_types);

    let mut count: u64 = 0;
    for row in rows {
        let row = row.map_err(read_err)?;
        let decoded = decode_row(&row, columns, &plan)?;
        if tx.blocking_send(Ok(decoded)).is_err() {
            debug!("Cursor closed by consumer after {} rows", count);
            return Ok(());
        }
        count += 1;
    }
    debug!("Cursor exhausted after {} rows", count);
    Ok(())
}

/// Native form used for a column outside the type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpaqueKind {
    Timestamp { precision: u8, zone: TimestampZone },
    Binary,
    Numeric,
    Text,
}

/// How one column of a cursor is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decode {
    Typed(Extractor),
    Opaque(OpaqueKind),
}

/// Classify an unlisted type by the cursor's runtime metadata.
fn opaque_kind(oratype: &OracleType) -> OpaqueKind {
    match oratype {
        OracleType::Timestamp(p) => OpaqueKind::Timestamp {
            precision: *p,
            zone: TimestampZone::Naive,
        },
        OracleType::TimestampTZ(p) => OpaqueKind::Timestamp {
            precision: *p,
            zone: TimestampZone::Offset(0),
        },
        OracleType::TimestampLTZ(p) => OpaqueKind::Timestamp {
            precision: *p,
            zone: TimestampZone::Local,
        },
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => OpaqueKind::Binary,
        OracleType::Number(_, _)
        | OracleType::Int64
        | OracleType::UInt64
        | OracleType::Float(_)
        | OracleType::BinaryFloat
        | OracleType::BinaryDouble => OpaqueKind::Numeric,
        _ => OpaqueKind::Text,
    }
}

/// Pick a decoder per column. Catalog tags decide; the cursor's types only
/// refine columns the type table does not list.
fn decode_plan(columns: &[ColumnInfo], cursor_types: &[OracleType]) -> Vec<Decode> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| match typemap::extractor_for(column) {
            Extractor::Opaque => Decode::Opaque(
                cursor_types
                    .get(idx)
                    .map(opaque_kind)
                    .unwrap_or(OpaqueKind::Text),
            ),
            extractor => Decode::Typed(extractor),
        })
        .collect()
}

fn decode_row(row: &oracle::Row, columns: &[ColumnInfo], plan: &[Decode]) -> Result<Row> {
    let mut out = Row::with_capacity(columns.len());
    for ((idx, column), decode) in columns.iter().enumerate().zip(plan) {
        let value = decode_value(row, idx, column, *decode).map_err(|e| match e {
            MigrateError::Read(msg) if !msg.starts_with("column ") => {
                MigrateError::Read(format!("column {}: {}", column.name, msg))
            }
            other => other,
        })?;
        out.insert(column.name.clone(), value);
    }
    Ok(out)
}

/// Pull one column by position.
fn decode_value(
    row: &oracle::Row,
    idx: usize,
    column: &ColumnInfo,
    decode: Decode,
) -> Result<SqlValue> {
    let value = match decode {
        Decode::Typed(Extractor::Integer) => {
            match row.get::<usize, Option<String>>(idx).map_err(read_err)? {
                Some(text) => Some(typemap::parse_integer(column, &text)?),
                None => None,
            }
        }
        Decode::Typed(Extractor::Decimal) => {
            match row.get::<usize, Option<String>>(idx).map_err(read_err)? {
                Some(text) => Some(typemap::parse_decimal(column, &text)?),
                None => None,
            }
        }
        Decode::Typed(Extractor::Text | Extractor::LongText) => row
            .get::<usize, Option<String>>(idx)
            .map_err(read_err)?
            .map(SqlValue::Text),
        Decode::Typed(Extractor::Timestamp) => row
            .get::<usize, Option<NaiveDateTime>>(idx)
            .map_err(read_err)?
            .map(SqlValue::Timestamp),
        Decode::Typed(Extractor::Date) => row
            .get::<usize, Option<NaiveDate>>(idx)
            .map_err(read_err)?
            .map(SqlValue::Date),
        Decode::Typed(Extractor::Bytes) => row
            .get::<usize, Option<Vec<u8>>>(idx)
            .map_err(read_err)?
            .map(SqlValue::Bytes),
        Decode::Typed(Extractor::Opaque) | Decode::Opaque(OpaqueKind::Text) => row
            .get::<usize, Option<String>>(idx)
            .map_err(read_err)?
            .map(|v| SqlValue::Opaque(OpaqueValue::Text(v))),
        Decode::Opaque(OpaqueKind::Numeric) => row
            .get::<usize, Option<String>>(idx)
            .map_err(read_err)?
            .map(|v| SqlValue::Opaque(OpaqueValue::Numeric(v))),
        Decode::Opaque(OpaqueKind::Binary) => row
            .get::<usize, Option<Vec<u8>>>(idx)
            .map_err(read_err)?
            .map(|v| SqlValue::Opaque(OpaqueValue::Binary(v))),
        Decode::Opaque(OpaqueKind::Timestamp { precision, zone }) => {
            match row.get::<usize, Option<Timestamp>>(idx).map_err(read_err)? {
                Some(ts) => Some(SqlValue::Opaque(native_timestamp(&ts, precision, zone)?)),
                None => None,
            }
        }
    };
    Ok(value.unwrap_or_else(|| typemap::null_for(column)))
}

fn native_timestamp(ts: &Timestamp, precision: u8, zone: TimestampZone) -> Result<OpaqueValue> {
    let value = NaiveDate::from_ymd_opt(ts.year(), ts.month(), ts.day())
        .and_then(|d| d.and_hms_nano_opt(ts.hour(), ts.minute(), ts.second(), ts.nanosecond()))
        .ok_or_else(|| MigrateError::Read(format!("timestamp {} is out of range", ts)))?;
    let zone = match zone {
        TimestampZone::Offset(_) => TimestampZone::Offset(ts.tz_offset()),
        other => other,
    };
    Ok(OpaqueValue::Timestamp {
        value,
        precision,
        zone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_kind(precision: u8, zone: TimestampZone) -> OpaqueKind {
        OpaqueKind::Timestamp { precision, zone }
    }

    #[test]
    fn test_opaque_kind_follows_cursor_type() {
        assert_eq!(
            opaque_kind(&OracleType::Timestamp(3)),
            ts_kind(3, TimestampZone::Naive)
        );
        assert_eq!(
            opaque_kind(&OracleType::TimestampTZ(6)),
            ts_kind(6, TimestampZone::Offset(0))
        );
        assert_eq!(
            opaque_kind(&OracleType::TimestampLTZ(9)),
            ts_kind(9, TimestampZone::Local)
        );
        assert_eq!(opaque_kind(&OracleType::Raw(16)), OpaqueKind::Binary);
        assert_eq!(opaque_kind(&OracleType::LongRaw), OpaqueKind::Binary);
        assert_eq!(opaque_kind(&OracleType::BinaryDouble), OpaqueKind::Numeric);
        assert_eq!(opaque_kind(&OracleType::Float(126)), OpaqueKind::Numeric);
        assert_eq!(opaque_kind(&OracleType::NVarchar2(10)), OpaqueKind::Text);
        assert_eq!(opaque_kind(&OracleType::Rowid), OpaqueKind::Text);
    }

    #[test]
    fn test_decode_plan_refines_only_unlisted_columns() {
        let columns = vec![
            ColumnInfo::new("ID", "NUMBER"),
            ColumnInfo::new("AT", "TIMESTAMP(3)"),
            ColumnInfo::new("TAG", "RAW"),
            ColumnInfo::new("CODE", "NCHAR"),
        ];
        let cursor_types = vec![
            OracleType::Number(10, 0),
            OracleType::Timestamp(3),
            OracleType::Raw(16),
        ];
        assert_eq!(
            decode_plan(&columns, &cursor_types),
            vec![
                Decode::Typed(Extractor::Integer),
                Decode::Opaque(ts_kind(3, TimestampZone::Naive)),
                Decode::Opaque(OpaqueKind::Binary),
                Decode::Opaque(OpaqueKind::Text),
            ]
        );
    }

    #[test]
    fn test_native_timestamp_keeps_fraction_and_offset() {
        let ts = Timestamp::new(2024, 1, 2, 3, 4, 5, 123_000_000)
            .unwrap()
            .and_tz_offset(2 * 3600)
            .unwrap();
        let value = native_timestamp(&ts, 3, TimestampZone::Offset(0)).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 123)
            .unwrap();
        assert_eq!(
            value,
            OpaqueValue::Timestamp {
                value: expected,
                precision: 3,
                zone: TimestampZone::Offset(7200),
            }
        );
    }
}
