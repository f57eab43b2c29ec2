//! Core traits for the migration engine.
//!
//! - [`SourceReader`]: catalog queries and row streaming from the source
//! - [`TargetWriter`]: opens transactional insert sessions on the target
//! - [`InsertSession`]: one target transaction receiving parameter batches
//!
//! The copier only talks to these traits, so the Oracle driver and the
//! in-memory test driver are interchangeable.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MigrateError, Result};
use crate::query::{InsertStatement, SelectStatement};

use super::schema::ColumnInfo;
use super::value::{Batch, Row};

/// Forward-only stream of rows produced by a background reader task.
///
/// The channel is bounded, so a slow consumer stalls the producer instead
/// of buffering the table. Dropping the cursor closes the channel, which
/// the producer observes on its next send and stops.
pub struct RowCursor {
    rx: mpsc::Receiver<Result<Row>>,
    producer: Option<JoinHandle<()>>,
}

impl RowCursor {
    pub fn new(rx: mpsc::Receiver<Result<Row>>, producer: Option<JoinHandle<()>>) -> Self {
        Self { rx, producer }
    }

    /// Next row, `None` once the result set is exhausted.
    ///
    /// A producer that died without reporting an error surfaces as a read
    /// error rather than as a silently truncated result set.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        if let Some(item) = self.rx.recv().await {
            return Some(item);
        }
        let producer = self.producer.take()?;
        match producer.await {
            Ok(()) => None,
            Err(e) => Some(Err(MigrateError::Read(format!(
                "row producer task failed: {}",
                e
            )))),
        }
    }
}

/// Read metadata and rows from the source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Run the column catalog query for `table`, in column-id order.
    ///
    /// An unknown table yields an empty list, not an error.
    async fn column_catalog(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Names of partitions of `table` whose partitioning columns match the
    /// SQL `LIKE` pattern `key_pattern`.
    async fn partition_catalog(&self, table: &str, key_pattern: &str) -> Result<Vec<String>>;

    /// Execute `select` and stream its rows.
    ///
    /// Errors raised while opening or iterating the result set are delivered
    /// through the cursor.
    fn open_cursor(&self, select: &SelectStatement) -> RowCursor;

    /// Trivial round trip to prove a connection can be obtained.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;
}

/// Write rows to the target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Acquire a connection and start a transaction with autocommit off.
    async fn begin(&self) -> Result<Box<dyn InsertSession>>;

    /// Trivial round trip to prove a connection can be obtained.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;
}

/// A target transaction that receives batched inserts.
///
/// Exactly one of [`commit`](InsertSession::commit) or
/// [`rollback`](InsertSession::rollback) ends the session. A session dropped
/// without either rolls back.
#[async_trait]
pub trait InsertSession: Send {
    /// Execute `insert` once per parameter tuple of `batch` as a single
    /// batched round trip. Returns the number of rows sent.
    async fn write_batch(&mut self, insert: &InsertStatement, batch: Batch) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
