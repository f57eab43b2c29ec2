//! Batch copier: streams a source table (or its partitions) into a target
//! table through fixed-size parameter batches inside one target transaction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{ColumnInfo, InsertSession, Row, SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::introspect::SchemaIntrospector;
use crate::mapping::{PartitionMapping, TableMapping};
use crate::query::{InsertStatement, SelectStatement};
use crate::typemap;

/// Statistics from copying one mapping.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Rows inserted on the target.
    pub rows: u64,

    /// Flushes executed.
    pub batches: u64,

    /// Partitions copied (0 for table mappings).
    pub partitions: usize,

    /// Wall time including introspection and commit.
    pub elapsed: Duration,
}

impl TransferStats {
    fn rows_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.rows as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Copies mappings from a [`SourceReader`] into a [`TargetWriter`].
#[derive(Clone)]
pub struct BatchCopier {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    introspector: SchemaIntrospector,
    default_batch_size: usize,
    cancel: CancellationToken,
}

impl BatchCopier {
    /// Create a new copier.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        default_batch_size: usize,
    ) -> Self {
        Self {
            introspector: SchemaIntrospector::new(source.clone()),
            source,
            target,
            default_batch_size: default_batch_size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop at the next batch boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Copy every row of `mapping.source_table` into `mapping.target_table`.
    pub async fn migrate_table(&self, mapping: &TableMapping) -> Result<TransferStats> {
        let batch_size = mapping.effective_batch_size(self.default_batch_size);
        info!(
            source_table = %mapping.source_table,
            target_table = %mapping.target_table,
            batch_size,
            "Starting migration for table"
        );

        let start = Instant::now();
        let mut stats = TransferStats::default();
        self.copy_table(mapping, batch_size, &mut stats)
            .await
            .map_err(|e| {
                MigrateError::migration(&mapping.source_table, &mapping.target_table, e)
            })?;
        stats.elapsed = start.elapsed();

        info!(
            source_table = %mapping.source_table,
            target_table = %mapping.target_table,
            rows = stats.rows,
            batches = stats.batches,
            "Table migration completed in {:?} ({} rows/sec)",
            stats.elapsed,
            stats.rows_per_sec()
        );
        Ok(stats)
    }

    /// Copy every partition of `mapping.source_table` whose partitioning
    /// columns match `mapping.partition_key`.
    pub async fn migrate_partition(&self, mapping: &PartitionMapping) -> Result<TransferStats> {
        let batch_size = mapping.effective_batch_size(self.default_batch_size);
        info!(
            source_table = %mapping.source_table,
            target_table = %mapping.target_table,
            partition_key = %mapping.partition_key,
            batch_size,
            "Starting partition migration"
        );

        let start = Instant::now();
        let mut stats = TransferStats::default();
        self.copy_partitions(mapping, batch_size, &mut stats)
            .await
            .map_err(|e| {
                MigrateError::migration(&mapping.source_table, &mapping.target_table, e)
            })?;
        stats.elapsed = start.elapsed();

        info!(
            source_table = %mapping.source_table,
            target_table = %mapping.target_table,
            rows = stats.rows,
            batches = stats.batches,
            partitions = stats.partitions,
            "Partition migration completed in {:?} ({} rows/sec)",
            stats.elapsed,
            stats.rows_per_sec()
        );
        Ok(stats)
    }

    async fn copy_table(
        &self,
        mapping: &TableMapping,
        batch_size: usize,
        stats: &mut TransferStats,
    ) -> Result<()> {
        self.check_cancelled()?;
        let columns: Arc<[ColumnInfo]> =
            self.introspector.columns_of(&mapping.source_table).await?.into();
        let select =
            SelectStatement::for_table(&mapping.source_table, columns.clone(), mapping.filter());
        let insert = InsertStatement::for_table(&mapping.target_table, columns);
        debug!("{}: {}", mapping.source_table, select.sql);
        debug!("{}: {}", mapping.target_table, insert.sql);

        let mut session = self.target.begin().await?;
        let result = self
            .stream(&select, &insert, batch_size, session.as_mut(), stats)
            .await;
        finish(session, result).await
    }

    async fn copy_partitions(
        &self,
        mapping: &PartitionMapping,
        batch_size: usize,
        stats: &mut TransferStats,
    ) -> Result<()> {
        self.check_cancelled()?;
        let partitions = self
            .introspector
            .partitions_of(&mapping.source_table, &mapping.partition_key)
            .await?;

        if partitions.is_empty() {
            info!(
                "{}: no partitions match key {}, nothing to copy",
                mapping.source_table, mapping.partition_key
            );
            return Ok(());
        }

        let mut session = self.target.begin().await?;
        let mut result = Ok(());
        for partition in &partitions {
            result = self
                .copy_one_partition(mapping, partition, batch_size, session.as_mut(), stats)
                .await;
            if result.is_err() {
                break;
            }
            stats.partitions += 1;
        }
        finish(session, result).await
    }

    async fn copy_one_partition(
        &self,
        mapping: &PartitionMapping,
        partition: &str,
        batch_size: usize,
        session: &mut dyn InsertSession,
        stats: &mut TransferStats,
    ) -> Result<()> {
        info!("Migrating partition: {} of {}", partition, mapping.source_table);
        let before = stats.rows;

        // Re-read per partition: an exchanged partition may differ in shape.
        let columns: Arc<[ColumnInfo]> =
            self.introspector.columns_of(&mapping.source_table).await?.into();
        let select = SelectStatement::for_partition(
            &mapping.source_table,
            columns.clone(),
            &mapping.partition_key,
            partition,
            mapping.filter(),
        );
        let insert = InsertStatement::for_table(&mapping.target_table, columns);
        self.stream(&select, &insert, batch_size, session, stats).await?;

        debug!(
            "{} partition {}: {} rows",
            mapping.source_table,
            partition,
            stats.rows - before
        );
        Ok(())
    }

    /// Drain the cursor for `select` into `session`, `batch_size` rows at a time.
    async fn stream(
        &self,
        select: &SelectStatement,
        insert: &InsertStatement,
        batch_size: usize,
        session: &mut dyn InsertSession,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let mut cursor = self.source.open_cursor(select);
        let mut pending: Vec<Row> = Vec::with_capacity(batch_size);

        while let Some(row) = cursor.next().await {
            pending.push(row?);
            if pending.len() >= batch_size {
                self.flush(insert, &mut pending, batch_size, session, stats)
                    .await?;
                self.check_cancelled()?;
            }
        }

        if !pending.is_empty() {
            self.flush(insert, &mut pending, batch_size, session, stats)
                .await?;
        }
        Ok(())
    }

    async fn flush(
        &self,
        insert: &InsertStatement,
        pending: &mut Vec<Row>,
        batch_size: usize,
        session: &mut dyn InsertSession,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let rows = std::mem::replace(pending, Vec::with_capacity(batch_size));
        let batch = typemap::encode_batch(&insert.columns, rows)?;
        let written = session.write_batch(insert, batch).await?;
        stats.rows += written;
        stats.batches += 1;
        debug!("flushed batch {} ({} rows)", stats.batches, written);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }
}

/// Commit on success, roll back on failure. A failed rollback is logged and
/// the original error is returned.
async fn finish(mut session: Box<dyn InsertSession>, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => session.commit().await,
        Err(e) => {
            if let Err(rollback_err) = session.rollback().await {
                warn!("Rollback failed after error: {}", rollback_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SqlNullType, SqlValue};
    use crate::drivers::memory::{MemorySource, MemoryTable, MemoryTarget};
    use crate::error::ErrorKind;
    use chrono::NaiveDate;

    fn emp_columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("ID", "NUMBER"),
            ColumnInfo::new("NAME", "VARCHAR2").with_length(50),
            ColumnInfo::new("BORN", "DATE"),
        ]
    }

    fn emp_rows(n: i64) -> Vec<Row> {
        (1..=n)
            .map(|i| {
                Row::new()
                    .with("ID", i)
                    .with("NAME", format!("emp{}", i))
                    .with("BORN", NaiveDate::from_ymd_opt(1980, 1, i as u32).unwrap())
            })
            .collect()
    }

    fn setup(rows: i64) -> (Arc<MemorySource>, MemoryTarget, BatchCopier) {
        let source = Arc::new(MemorySource::new());
        source.add_table("EMP", MemoryTable::new(emp_columns()).with_rows(emp_rows(rows)));
        let target = MemoryTarget::new();
        let copier = BatchCopier::new(source.clone(), Arc::new(target.clone()), 1000);
        (source, target, copier)
    }

    #[tokio::test]
    async fn test_five_rows_in_batches_of_two() {
        let (_, target, copier) = setup(5);
        let mapping = TableMapping::new("EMP", "EMP_COPY").with_batch_size(2);

        let stats = copier.migrate_table(&mapping).await.unwrap();

        assert_eq!(stats.rows, 5);
        assert_eq!(stats.batches, 3);
        assert_eq!(target.flush_sizes("EMP_COPY"), vec![2, 2, 1]);
        assert_eq!(
            target.inserts()[0],
            "INSERT INTO EMP_COPY (ID, NAME, BORN) VALUES (?, ?, ?)"
        );
        let committed = target.committed_rows("EMP_COPY");
        assert_eq!(committed.len(), 5);
        assert_eq!(committed[4][0], SqlValue::Integer(5));
        assert_eq!(target.commits(), 1);
    }

    #[tokio::test]
    async fn test_exact_multiple_skips_tail_flush() {
        let (_, target, copier) = setup(3);
        let mapping = TableMapping::new("EMP", "EMP_COPY").with_batch_size(3);

        copier.migrate_table(&mapping).await.unwrap();

        assert_eq!(target.flush_sizes("EMP_COPY"), vec![3]);
    }

    #[tokio::test]
    async fn test_batch_size_one() {
        let (_, target, copier) = setup(3);
        let mapping = TableMapping::new("EMP", "EMP_COPY").with_batch_size(1);

        copier.migrate_table(&mapping).await.unwrap();

        assert_eq!(target.flush_sizes("EMP_COPY"), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_empty_table_commits_without_inserts() {
        let (_, target, copier) = setup(0);

        let stats = copier
            .migrate_table(&TableMapping::new("EMP", "EMP_COPY"))
            .await
            .unwrap();

        assert_eq!(stats.rows, 0);
        assert!(target.inserts().is_empty());
        assert_eq!(target.commits(), 1);
    }

    #[tokio::test]
    async fn test_default_batch_size_applies() {
        let source = Arc::new(MemorySource::new());
        source.add_table("EMP", MemoryTable::new(emp_columns()).with_rows(emp_rows(5)));
        let target = MemoryTarget::new();
        let copier = BatchCopier::new(source, Arc::new(target.clone()), 4);

        copier
            .migrate_table(&TableMapping::new("EMP", "EMP_COPY"))
            .await
            .unwrap();

        assert_eq!(target.flush_sizes("EMP_COPY"), vec![4, 1]);
    }

    #[tokio::test]
    async fn test_where_clause_reaches_select() {
        let (source, _, copier) = setup(2);
        let mapping = TableMapping::new("EMP", "EMP_COPY").with_where("ID > 100");

        copier.migrate_table(&mapping).await.unwrap();

        assert_eq!(
            source.opened_sql(),
            vec!["SELECT ID, NAME, BORN FROM EMP WHERE ID > 100"]
        );
    }

    #[tokio::test]
    async fn test_flush_failure_rolls_back() {
        let (_, target, copier) = setup(5);
        target.fail_on_flush("EMP_COPY", 2);
        let mapping = TableMapping::new("EMP", "EMP_COPY").with_batch_size(2);

        let err = copier.migrate_table(&mapping).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Write);
        assert!(err.to_string().contains("EMP -> EMP_COPY"));
        assert!(target.committed_rows("EMP_COPY").is_empty());
        assert_eq!(target.rollbacks(), 1);
        assert_eq!(target.commits(), 0);
    }

    #[tokio::test]
    async fn test_cursor_failure_rolls_back() {
        let (source, target, copier) = setup(5);
        source.fail_read_after("EMP", 3);
        let mapping = TableMapping::new("EMP", "EMP_COPY").with_batch_size(2);

        let err = copier.migrate_table(&mapping).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Read);
        assert_eq!(target.flush_sizes("EMP_COPY"), vec![2]);
        assert!(target.committed_rows("EMP_COPY").is_empty());
        assert_eq!(target.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_fails_before_target_work() {
        let (_, target, copier) = setup(1);

        let err = copier
            .migrate_table(&TableMapping::new("NOPE", "NOPE_COPY"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(target.commits() + target.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_decimal_and_blob_null_bind_typed() {
        let columns = vec![
            ColumnInfo::new("AMOUNT", "NUMBER").with_precision(10, 2),
            ColumnInfo::new("PHOTO", "BLOB"),
        ];
        let mut row = Row::new();
        row.insert(
            "AMOUNT",
            typemap::parse_decimal(&columns[0], "12.34").unwrap(),
        );
        row.insert("PHOTO", SqlValue::Null(SqlNullType::Blob));

        let source = Arc::new(MemorySource::new());
        source.add_table("DOCS", MemoryTable::new(columns).with_rows(vec![row]));
        let target = MemoryTarget::new();
        let copier = BatchCopier::new(source, Arc::new(target.clone()), 10);

        copier
            .migrate_table(&TableMapping::new("DOCS", "DOCS_COPY"))
            .await
            .unwrap();

        let committed = target.committed_rows("DOCS_COPY");
        match &committed[0][0] {
            SqlValue::Decimal(d) => assert_eq!(d.to_string(), "12.34"),
            other => panic!("expected decimal, got {:?}", other),
        }
        assert_eq!(committed[0][1], SqlValue::Null(SqlNullType::Blob));
    }

    fn orders_source() -> Arc<MemorySource> {
        let columns = vec![
            ColumnInfo::new("ID", "NUMBER"),
            ColumnInfo::new("ORDER_DATE", "DATE"),
        ];
        let row = |id: i64, y: i32| {
            Row::new()
                .with("ID", id)
                .with("ORDER_DATE", NaiveDate::from_ymd_opt(y, 6, 1).unwrap())
        };
        let source = Arc::new(MemorySource::new());
        source.add_table(
            "ORDERS",
            MemoryTable::new(columns)
                .with_partition("P2023", "ORDER_DATE", vec![row(1, 2023), row(2, 2023)])
                .with_partition("P2024", "ORDER_DATE", vec![row(3, 2024)]),
        );
        source
    }

    #[tokio::test]
    async fn test_partitions_copied_in_one_transaction() {
        let source = orders_source();
        let target = MemoryTarget::new();
        let copier = BatchCopier::new(source.clone(), Arc::new(target.clone()), 1000);
        let mapping =
            PartitionMapping::new("ORDERS", "ORDERS_COPY", "ORDER_DATE").with_batch_size(100);

        let stats = copier.migrate_partition(&mapping).await.unwrap();

        assert_eq!(stats.partitions, 2);
        assert_eq!(stats.rows, 3);
        assert_eq!(
            source.opened_sql(),
            vec![
                "SELECT ID, ORDER_DATE FROM ORDERS PARTITION(P2023)",
                "SELECT ID, ORDER_DATE FROM ORDERS PARTITION(P2024)",
            ]
        );
        assert_eq!(target.committed_rows("ORDERS_COPY").len(), 3);
        assert_eq!(target.commits(), 1);
    }

    #[tokio::test]
    async fn test_partition_failure_rolls_back_every_partition() {
        let source = orders_source();
        let target = MemoryTarget::new();
        target.fail_on_flush("ORDERS_COPY", 2);
        let copier = BatchCopier::new(source, Arc::new(target.clone()), 1000);

        let err = copier
            .migrate_partition(&PartitionMapping::new("ORDERS", "ORDERS_COPY", "ORDER_DATE"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(target.flush_sizes("ORDERS_COPY"), vec![2]);
        assert!(target.committed_rows("ORDERS_COPY").is_empty());
        assert_eq!(target.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_no_matching_partitions_is_noop() {
        let source = orders_source();
        let target = MemoryTarget::new();
        let copier = BatchCopier::new(source.clone(), Arc::new(target.clone()), 1000);

        let stats = copier
            .migrate_partition(&PartitionMapping::new("ORDERS", "ORDERS_COPY", "REGION"))
            .await
            .unwrap();

        assert_eq!(stats.partitions, 0);
        assert!(source.opened_sql().is_empty());
        assert_eq!(target.commits() + target.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_batch_boundary() {
        let (_, target, copier) = setup(5);
        let token = CancellationToken::new();
        let copier = copier.with_cancellation(token.clone());
        token.cancel();

        let err = copier
            .migrate_table(&TableMapping::new("EMP", "EMP_COPY").with_batch_size(2))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(target.inserts().is_empty());
    }
}
