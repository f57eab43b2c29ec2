//! Oracle target writer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use oracle::sql_type::{OracleType, Timestamp};
use oracle::Connection;
use r2d2::PooledConnection;
use tracing::{debug, warn};

use super::{
    positional_binds, read_err, with_connection, write_err, OracleConnectionManager, OraclePool,
    PROBE_SQL,
};
use crate::config::DatabaseConfig;
use crate::core::{
    Batch, ColumnInfo, InsertSession, OpaqueValue, SqlNullType, SqlValue, TargetWriter,
    TimestampZone,
};
use crate::error::{MigrateError, Result};
use crate::query::InsertStatement;
use crate::typemap::DataTypeTag;

type OracleConnection = PooledConnection<OracleConnectionManager>;

/// Writes batches into an Oracle database.
pub struct OracleTarget {
    pool: OraclePool,
}

impl OracleTarget {
    /// Create a writer. No connection is opened until first use.
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            pool: super::build_pool(config),
        }
    }
}

#[async_trait]
impl TargetWriter for OracleTarget {
    async fn begin(&self) -> Result<Box<dyn InsertSession>> {
        let pool = self.pool.clone();
        let conn = tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|e| MigrateError::Write(format!("connection task failed: {}", e)))?
            .map_err(|e| MigrateError::connectivity(e.to_string(), "opening target transaction"))?;
        // Oracle sessions start a transaction implicitly and the crate
        // never autocommits unless asked, so nothing is sent here.
        Ok(Box::new(OracleInsertSession { conn: Some(conn) }))
    }

    async fn ping(&self) -> Result<()> {
        with_connection(&self.pool, "probing target", |conn| {
            conn.query_row(PROBE_SQL, &[]).map_err(read_err)?;
            Ok(())
        })
        .await
    }

    fn db_type(&self) -> &str {
        "oracle"
    }
}

/// One target transaction on a checked-out connection.
///
/// The connection moves into the blocking pool for each call and comes back
/// afterwards; `None` means the session has ended.
pub struct OracleInsertSession {
    conn: Option<OracleConnection>,
}

impl OracleInsertSession {
    fn take_conn(&mut self) -> Result<OracleConnection> {
        self.conn
            .take()
            .ok_or_else(|| MigrateError::Write("insert session already closed".into()))
    }

    async fn end(&mut self, commit: bool) -> Result<()> {
        let conn = self.take_conn()?;
        tokio::task::spawn_blocking(move || {
            if commit {
                conn.commit().map_err(write_err)
            } else {
                conn.rollback().map_err(write_err)
            }
        })
        .await
        .map_err(|e| MigrateError::Write(format!("transaction task failed: {}", e)))?
    }
}

#[async_trait]
impl InsertSession for OracleInsertSession {
    async fn write_batch(&mut self, insert: &InsertStatement, batch: Batch) -> Result<u64> {
        let conn = self.take_conn()?;
        let sql = positional_binds(&insert.sql);
        let columns = insert.columns.clone();

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = execute_batch(&conn, &sql, &columns, batch);
            (conn, result)
        })
        .await
        .map_err(|e| MigrateError::Write(format!("batch task failed: {}", e)))?;

        self.conn = Some(conn);
        result
    }

    async fn commit(&mut self) -> Result<()> {
        self.end(true).await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.end(false).await
    }
}

impl Drop for OracleInsertSession {
    fn drop(&mut self) {
        // Only reached when the owning future is dropped mid-mapping.
        if let Some(conn) = self.conn.take() {
            off_runtime(move || {
                if let Err(e) = conn.rollback() {
                    warn!("Rollback of abandoned target transaction failed: {}", e);
                }
            });
        }
    }
}

/// Run blocking work on the blocking pool when called from inside a tokio
/// runtime, inline otherwise.
fn off_runtime<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(f);
        }
        Err(_) => f(),
    }
}

fn execute_batch(
    conn: &Connection,
    sql: &str,
    columns: &Arc<[ColumnInfo]>,
    batch: Batch,
) -> Result<u64> {
    let rows = batch.len();
    if rows == 0 {
        return Ok(0);
    }

    let mut stmt = conn.batch(sql, rows).build().map_err(write_err)?;
    for (i, column) in columns.iter().enumerate() {
        let oratype = bind_type(column).or_else(|| opaque_bind_type(&batch, i));
        if let Some(oratype) = oratype {
            stmt.set_type(i + 1, &oratype).map_err(write_err)?;
        }
    }

    for params in &batch.rows {
        for (i, value) in params.iter().enumerate() {
            bind_value(&mut stmt, i + 1, value)?;
        }
        stmt.append_row(&[]).map_err(write_err)?;
    }
    stmt.execute().map_err(write_err)?;

    debug!("Inserted {} rows", rows);
    Ok(rows as u64)
}

/// Declared bind type for a column; `None` lets the driver infer it.
fn bind_type(column: &ColumnInfo) -> Option<OracleType> {
    match column.tag() {
        DataTypeTag::Number => Some(OracleType::Number(0, 0)),
        DataTypeTag::Varchar2 => Some(OracleType::Varchar2(varchar_size(column))),
        DataTypeTag::Timestamp6 => Some(OracleType::Timestamp(6)),
        DataTypeTag::Date => Some(OracleType::Date),
        DataTypeTag::Blob => Some(OracleType::BLOB),
        DataTypeTag::Clob => Some(OracleType::CLOB),
        DataTypeTag::Other(_) => None,
    }
}

/// Bind type for a column outside the type table, taken from the native
/// values in the batch. Sized to the largest value so later rows fit.
fn opaque_bind_type(batch: &Batch, idx: usize) -> Option<OracleType> {
    let mut chosen: Option<OracleType> = None;
    for value in batch.rows.iter().filter_map(|row| row.get(idx)) {
        let SqlValue::Opaque(value) = value else {
            continue;
        };
        let next = match value {
            OpaqueValue::Timestamp {
                precision, zone, ..
            } => match zone {
                TimestampZone::Naive => OracleType::Timestamp(*precision),
                TimestampZone::Offset(_) => OracleType::TimestampTZ(*precision),
                TimestampZone::Local => OracleType::TimestampLTZ(*precision),
            },
            OpaqueValue::Binary(bytes) => OracleType::Raw(bind_size(bytes.len())),
            OpaqueValue::Numeric(_) => OracleType::Number(0, 0),
            OpaqueValue::Text(text) => OracleType::Varchar2(bind_size(text.len())),
        };
        chosen = Some(match (chosen, next) {
            (Some(OracleType::Raw(a)), OracleType::Raw(b)) => OracleType::Raw(a.max(b)),
            (Some(OracleType::Varchar2(a)), OracleType::Varchar2(b)) => {
                OracleType::Varchar2(a.max(b))
            }
            (Some(current), _) => current,
            (None, next) => next,
        });
    }
    chosen
}

fn bind_size(len: usize) -> u32 {
    u32::try_from(len.max(1)).unwrap_or(u32::MAX)
}

fn native_timestamp(
    value: &NaiveDateTime,
    precision: u8,
    zone: TimestampZone,
) -> Result<Timestamp> {
    let ts = Timestamp::new(
        value.year(),
        value.month(),
        value.day(),
        value.hour(),
        value.minute(),
        value.second(),
        value.nanosecond(),
    )
    .map_err(write_err)?
    .and_prec(precision)
    .map_err(write_err)?;
    Ok(match zone {
        TimestampZone::Offset(secs) => ts.and_tz_offset(secs).map_err(write_err)?,
        TimestampZone::Naive | TimestampZone::Local => ts,
    })
}

fn varchar_size(column: &ColumnInfo) -> u32 {
    if column.length > 0 {
        column.length as u32
    } else {
        4000
    }
}

/// Bind type used for a NULL of the given kind.
fn null_type(null: SqlNullType) -> OracleType {
    match null {
        SqlNullType::Numeric => OracleType::Number(0, 0),
        SqlNullType::Varchar | SqlNullType::Other => OracleType::Varchar2(4000),
        SqlNullType::Timestamp => OracleType::Timestamp(6),
        SqlNullType::Date => OracleType::Date,
        SqlNullType::Blob => OracleType::BLOB,
        SqlNullType::Clob => OracleType::CLOB,
    }
}

fn bind_value(stmt: &mut oracle::Batch<'_>, pos: usize, value: &SqlValue) -> Result<()> {
    let result = match value {
        SqlValue::Null(null) => stmt.set(pos, &null_type(*null)),
        SqlValue::Integer(v) => stmt.set(pos, v),
        // Text keeps every digit; NUMBER binds parse it server-side.
        SqlValue::Decimal(v) => stmt.set(pos, &v.to_plain_string()),
        SqlValue::Text(v) => stmt.set(pos, v),
        SqlValue::Opaque(OpaqueValue::Timestamp {
            value,
            precision,
            zone,
        }) => stmt.set(pos, &native_timestamp(value, *precision, *zone)?),
        SqlValue::Opaque(OpaqueValue::Binary(v)) => stmt.set(pos, v),
        SqlValue::Opaque(OpaqueValue::Numeric(v) | OpaqueValue::Text(v)) => stmt.set(pos, v),
        SqlValue::Timestamp(v) => stmt.set(pos, v),
        SqlValue::Date(v) => stmt.set(pos, v),
        SqlValue::Bytes(v) => stmt.set(pos, v),
    };
    result.map_err(|e| MigrateError::Write(format!("binding parameter {}: {}", pos, e)))
}
