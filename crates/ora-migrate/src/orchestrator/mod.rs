//! Migration coordinator: runs every configured mapping in declared order
//! and reports one outcome per mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{ErrorKind, MigrateError, Result};
use crate::mapping::{MappingConfig, MappingStore, PartitionMapping, TableMapping};
use crate::transfer::{BatchCopier, TransferStats};

/// Which copy path a mapping went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    Table,
    Partition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Cancelled,
}

/// Result of one mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingOutcome {
    pub kind: MappingKind,
    pub source_table: String,
    pub target_table: String,
    pub status: OutcomeStatus,
    pub rows: u64,
    pub batches: u64,
    pub partitions: usize,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MappingOutcome {
    fn new(
        kind: MappingKind,
        source_table: &str,
        target_table: &str,
        result: &Result<TransferStats>,
    ) -> Self {
        let mut outcome = Self {
            kind,
            source_table: source_table.to_string(),
            target_table: target_table.to_string(),
            status: OutcomeStatus::Success,
            rows: 0,
            batches: 0,
            partitions: 0,
            duration_seconds: 0.0,
            error_kind: None,
            error: None,
        };
        match result {
            Ok(stats) => {
                outcome.rows = stats.rows;
                outcome.batches = stats.batches;
                outcome.partitions = stats.partitions;
                outcome.duration_seconds = stats.elapsed.as_secs_f64();
            }
            Err(e) => {
                let kind = e.kind();
                outcome.status = if kind == ErrorKind::Cancelled {
                    OutcomeStatus::Cancelled
                } else {
                    OutcomeStatus::Failed
                };
                outcome.error_kind = Some(kind);
                outcome.error = Some(root_message(e));
            }
        }
        outcome
    }

    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Message of the innermost error; the mapping wrapper repeats what the
/// outcome already records.
fn root_message(err: &MigrateError) -> String {
    match err {
        MigrateError::Migration { cause, .. } => root_message(cause),
        other => other.to_string(),
    }
}

/// Result of a coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// One entry per attempted mapping, in execution order.
    pub outcomes: Vec<MappingOutcome>,
}

impl RunReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            completed_at: now,
            outcomes: Vec::new(),
        }
    }

    fn complete(mut self) -> Self {
        self.completed_at = Utc::now();
        self
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(MappingOutcome::succeeded)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    pub fn rows_copied(&self) -> u64 {
        self.outcomes.iter().map(|o| o.rows).sum()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs the mappings held by a [`MappingStore`] through a [`BatchCopier`].
///
/// Entry points never fail: each mapping's error is logged and recorded in
/// the report, and the next mapping is attempted.
pub struct Coordinator {
    copier: BatchCopier,
    store: MappingStore,
}

impl Coordinator {
    pub fn new(copier: BatchCopier, store: MappingStore) -> Self {
        Self { copier, store }
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    /// Copy every table mapping.
    pub async fn migrate_all_tables(&self) -> RunReport {
        let mappings = self.store.lock().await;
        let mut report = RunReport::start();
        self.run_tables(&mappings.tables, &mut report).await;
        self.finish(report)
    }

    /// Copy every partition mapping.
    pub async fn migrate_all_partitions(&self) -> RunReport {
        let mappings = self.store.lock().await;
        let mut report = RunReport::start();
        self.run_partitions(&mappings.partitions, &mut report).await;
        self.finish(report)
    }

    /// Copy every table mapping, then every partition mapping.
    pub async fn migrate_all(&self) -> RunReport {
        let mappings = self.store.lock().await;
        let mut report = RunReport::start();
        self.run_all(&mappings, &mut report).await;
        self.finish(report)
    }

    async fn run_all(&self, mappings: &MappingConfig, report: &mut RunReport) {
        self.run_tables(&mappings.tables, report).await;
        self.run_partitions(&mappings.partitions, report).await;
    }

    async fn run_tables(&self, mappings: &[TableMapping], report: &mut RunReport) {
        for mapping in mappings {
            let result = self.copier.migrate_table(mapping).await;
            let outcome = MappingOutcome::new(
                MappingKind::Table,
                &mapping.source_table,
                &mapping.target_table,
                &result,
            );
            log_failure(&result, &mapping.source_table, &mapping.target_table);
            report.outcomes.push(outcome);
        }
    }

    async fn run_partitions(&self, mappings: &[PartitionMapping], report: &mut RunReport) {
        for mapping in mappings {
            let result = self.copier.migrate_partition(mapping).await;
            let outcome = MappingOutcome::new(
                MappingKind::Partition,
                &mapping.source_table,
                &mapping.target_table,
                &result,
            );
            log_failure(&result, &mapping.source_table, &mapping.target_table);
            report.outcomes.push(outcome);
        }
    }

    fn finish(&self, report: RunReport) -> RunReport {
        let report = report.complete();
        let duration = (report.completed_at - report.started_at)
            .to_std()
            .unwrap_or_default();
        if report.all_succeeded() {
            info!(
                "Run {} complete: {} mappings, {} rows in {:?}",
                report.run_id,
                report.outcomes.len(),
                report.rows_copied(),
                duration
            );
        } else {
            warn!(
                "Run {} finished with {} of {} mappings failed ({} rows copied)",
                report.run_id,
                report.failed(),
                report.outcomes.len(),
                report.rows_copied()
            );
        }
        report
    }
}

fn log_failure(result: &Result<TransferStats>, source_table: &str, target_table: &str) {
    let Err(e) = result else {
        return;
    };
    let error_kind = e.kind();
    if error_kind == ErrorKind::Cancelled {
        warn!(source_table, target_table, "Mapping cancelled");
    } else {
        error!(
            source_table,
            target_table,
            ?error_kind,
            "Mapping failed: {}",
            e.format_detailed()
        );
    }
}
