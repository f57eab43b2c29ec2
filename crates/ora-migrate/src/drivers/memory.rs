//! In-memory source and target used by the unit tests.
//!
//! The source answers catalog queries from registered tables and serves
//! rows by parsing the table and partition out of the SELECT it is given.
//! The target keeps each session's batches private until commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{
    Batch, ColumnInfo, InsertSession, Row, RowCursor, SourceReader, SqlValue, TargetWriter,
};
use crate::error::{MigrateError, Result};
use crate::query::{InsertStatement, SelectStatement};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
    partitions: Vec<MemoryPartition>,
}

#[derive(Debug, Clone)]
struct MemoryPartition {
    name: String,
    key_columns: String,
    rows: Vec<Row>,
}

impl MemoryTable {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_partition(mut self, name: &str, key_columns: &str, rows: Vec<Row>) -> Self {
        self.partitions.push(MemoryPartition {
            name: name.to_string(),
            key_columns: key_columns.to_string(),
            rows,
        });
        self
    }
}

#[derive(Default)]
struct SourceState {
    tables: HashMap<String, MemoryTable>,
    catalog_error: Option<String>,
    read_error_after: HashMap<String, usize>,
    opened: Vec<String>,
    unhealthy: bool,
}

#[derive(Default)]
pub struct MemorySource {
    state: Mutex<SourceState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&self, name: &str, table: MemoryTable) {
        self.state.lock().unwrap().tables.insert(name.to_string(), table);
    }

    /// Make every catalog query fail with `message`.
    pub fn fail_catalog(&self, message: &str) {
        self.state.lock().unwrap().catalog_error = Some(message.to_string());
    }

    /// Make cursors over `table` fail after yielding `rows` rows.
    pub fn fail_read_after(&self, table: &str, rows: usize) {
        self.state
            .lock()
            .unwrap()
            .read_error_after
            .insert(table.to_string(), rows);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().unwrap().unhealthy = !healthy;
    }

    /// Every SELECT handed to [`SourceReader::open_cursor`], in order.
    pub fn opened_sql(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }
}

/// Pull `(table, partition)` out of `SELECT ... FROM t [PARTITION(p)] ...`.
fn parse_select(sql: &str) -> Option<(String, Option<String>)> {
    let rest = &sql[sql.find(" FROM ")? + " FROM ".len()..];
    let mut parts = rest.splitn(2, ' ');
    let table = parts.next()?.to_string();
    let partition = parts
        .next()
        .and_then(|tail| tail.strip_prefix("PARTITION("))
        .and_then(|tail| tail.split(')').next())
        .map(str::to_string);
    Some((table, partition))
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn column_catalog(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.catalog_error {
            return Err(MigrateError::Read(message.clone()));
        }
        Ok(state
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn partition_catalog(&self, table: &str, key_pattern: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.catalog_error {
            return Err(MigrateError::Read(message.clone()));
        }
        let needle = key_pattern.trim_matches('%');
        Ok(state
            .tables
            .get(table)
            .map(|t| {
                t.partitions
                    .iter()
                    .filter(|p| p.key_columns.contains(needle))
                    .map(|p| p.name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn open_cursor(&self, select: &SelectStatement) -> RowCursor {
        let (tx, rx) = mpsc::channel(1);
        let mut state = self.state.lock().unwrap();
        state.opened.push(select.sql.clone());

        let parsed = parse_select(&select.sql);
        let rows = parsed.as_ref().and_then(|(table, partition)| {
            let t = state.tables.get(table)?;
            match partition {
                Some(name) => t.partitions.iter().find(|p| &p.name == name).map(|p| p.rows.clone()),
                None => Some(t.rows.clone()),
            }
        });
        let fail_after = parsed
            .as_ref()
            .and_then(|(table, _)| state.read_error_after.get(table).copied());
        let sql = select.sql.clone();

        let producer = tokio::spawn(async move {
            let Some(rows) = rows else {
                let _ = tx
                    .send(Err(MigrateError::Read(format!("ORA-00942: cannot run {}", sql))))
                    .await;
                return;
            };
            for (i, row) in rows.into_iter().enumerate() {
                if fail_after == Some(i) {
                    let _ = tx
                        .send(Err(MigrateError::Read("ORA-01555: snapshot too old".into())))
                        .await;
                    return;
                }
                if tx.send(Ok(row)).await.is_err() {
                    return;
                }
            }
        });
        RowCursor::new(rx, Some(producer))
    }

    async fn ping(&self) -> Result<()> {
        if self.state.lock().unwrap().unhealthy {
            return Err(MigrateError::connectivity("listener refused", "source ping"));
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

#[derive(Default)]
struct TargetState {
    committed: HashMap<String, Vec<Vec<SqlValue>>>,
    flushes: Vec<(String, usize)>,
    inserts: Vec<String>,
    fail_on_flush: HashMap<String, usize>,
    flush_counts: HashMap<String, usize>,
    commits: usize,
    rollbacks: usize,
    unhealthy: bool,
}

#[derive(Default, Clone)]
pub struct MemoryTarget {
    state: Arc<Mutex<TargetState>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `nth` (1-based) flush into `table` fail.
    pub fn fail_on_flush(&self, table: &str, nth: usize) {
        self.state
            .lock()
            .unwrap()
            .fail_on_flush
            .insert(table.to_string(), nth);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().unwrap().unhealthy = !healthy;
    }

    /// Rows visible in `table` after commit.
    pub fn committed_rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Sizes of every successful flush into `table`, committed or not.
    pub fn flush_sizes(&self, table: &str) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .flushes
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, n)| *n)
            .collect()
    }

    pub fn inserts(&self) -> Vec<String> {
        self.state.lock().unwrap().inserts.clone()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().unwrap().rollbacks
    }
}

fn insert_table(sql: &str) -> String {
    sql.split_whitespace().nth(2).unwrap_or_default().to_string()
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn begin(&self) -> Result<Box<dyn InsertSession>> {
        if self.state.lock().unwrap().unhealthy {
            return Err(MigrateError::connectivity("listener refused", "target begin"));
        }
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
            pending: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        if self.state.lock().unwrap().unhealthy {
            return Err(MigrateError::connectivity("listener refused", "target ping"));
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

struct MemorySession {
    state: Arc<Mutex<TargetState>>,
    pending: Vec<(String, Vec<Vec<SqlValue>>)>,
}

#[async_trait]
impl InsertSession for MemorySession {
    async fn write_batch(&mut self, insert: &InsertStatement, batch: Batch) -> Result<u64> {
        let table = insert_table(&insert.sql);
        let mut state = self.state.lock().unwrap();
        state.inserts.push(insert.sql.clone());

        let count = {
            let count = state.flush_counts.entry(table.clone()).or_default();
            *count += 1;
            *count
        };
        if state.fail_on_flush.get(&table) == Some(&count) {
            return Err(MigrateError::Write(
                "ORA-00001: unique constraint violated".into(),
            ));
        }

        let rows = batch.len();
        state.flushes.push((table.clone(), rows));
        self.pending.push((table, batch.rows));
        Ok(rows as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for (table, rows) in self.pending.drain(..) {
            state.committed.entry(table).or_default().extend(rows);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.pending.clear();
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}
