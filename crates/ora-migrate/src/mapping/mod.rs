//! Mapping documents: which source tables (or partitions) are copied into
//! which target tables.
//!
//! The JSON form uses camelCase keys:
//!
//! ```json
//! {
//!   "tables": [
//!     { "sourceTable": "EMP", "targetTable": "EMP_COPY", "batchSize": 500, "whereClause": "ID > 100" }
//!   ],
//!   "partitions": [
//!     { "sourceTable": "SALES", "targetTable": "SALES_COPY", "partitionKey": "SALE_DATE" }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::{MigrateError, Result};

/// Copy one whole table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMapping {
    pub source_table: String,
    pub target_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
}

/// Copy the partitions of a table whose partitioning columns match a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionMapping {
    pub source_table: String,
    pub target_table: String,
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
}

fn effective_batch_size(own: Option<usize>, default: usize) -> usize {
    own.unwrap_or(default).max(1)
}

fn filter(where_clause: &Option<String>) -> Option<&str> {
    where_clause.as_deref().filter(|w| !w.trim().is_empty())
}

fn require(value: &str, what: &str, position: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MigrateError::Config(format!("{}: {} is required", position, what)));
    }
    Ok(())
}

fn check_batch_size(batch_size: Option<usize>, position: &str) -> Result<()> {
    if batch_size == Some(0) {
        return Err(MigrateError::Config(format!(
            "{}: batchSize must be at least 1",
            position
        )));
    }
    Ok(())
}

impl TableMapping {
    pub fn new(source_table: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            target_table: target_table.into(),
            batch_size: None,
            where_clause: None,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn with_where(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    /// Rows per flush, falling back to the configured default.
    pub fn effective_batch_size(&self, default: usize) -> usize {
        effective_batch_size(self.batch_size, default)
    }

    /// The row filter, if one is set and non-blank.
    pub fn filter(&self) -> Option<&str> {
        filter(&self.where_clause)
    }

    fn validate(&self, index: usize) -> Result<()> {
        let position = format!("tables[{}]", index);
        require(&self.source_table, "sourceTable", &position)?;
        require(&self.target_table, "targetTable", &position)?;
        check_batch_size(self.batch_size, &position)
    }
}

impl PartitionMapping {
    pub fn new(
        source_table: impl Into<String>,
        target_table: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            target_table: target_table.into(),
            partition_key: partition_key.into(),
            batch_size: None,
            where_clause: None,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn with_where(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    pub fn effective_batch_size(&self, default: usize) -> usize {
        effective_batch_size(self.batch_size, default)
    }

    pub fn filter(&self) -> Option<&str> {
        filter(&self.where_clause)
    }

    fn validate(&self, index: usize) -> Result<()> {
        let position = format!("partitions[{}]", index);
        require(&self.source_table, "sourceTable", &position)?;
        require(&self.target_table, "targetTable", &position)?;
        require(&self.partition_key, "partitionKey", &position)?;
        check_batch_size(self.batch_size, &position)
    }
}

/// The active set of mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub tables: Vec<TableMapping>,
    #[serde(default)]
    pub partitions: Vec<PartitionMapping>,
}

impl MappingConfig {
    /// Load a mapping document from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&content)?;
        info!(
            "Loaded {} table and {} partition mappings from {}",
            config.tables.len(),
            config.partitions.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    /// Parse a mapping document. Both lists are required.
    pub fn from_json(json: &str) -> Result<Self> {
        let request: MappingRequest = serde_json::from_str(json)?;
        request.into_config()
    }

    pub fn validate(&self) -> Result<()> {
        for (i, mapping) in self.tables.iter().enumerate() {
            mapping.validate(i)?;
        }
        for (i, mapping) in self.partitions.iter().enumerate() {
            mapping.validate(i)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.partitions.is_empty()
    }
}

/// Body of a configuration update. Lists are optional here so that an
/// absent or null list is reported as a validation error, not a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingRequest {
    #[serde(default)]
    pub tables: Option<Vec<TableMapping>>,
    #[serde(default)]
    pub partitions: Option<Vec<PartitionMapping>>,
}

impl MappingRequest {
    /// Validate and convert into a [`MappingConfig`].
    pub fn into_config(self) -> Result<MappingConfig> {
        let tables = self
            .tables
            .ok_or_else(|| MigrateError::Config("Tables list cannot be null".into()))?;
        let partitions = self
            .partitions
            .ok_or_else(|| MigrateError::Config("Partitions list cannot be null".into()))?;
        let config = MappingConfig { tables, partitions };
        config.validate()?;
        Ok(config)
    }
}

/// Shared, replaceable mapping set.
///
/// A coordinator run holds the lock for its whole duration, so a
/// replacement waits for the run to finish and a run never sees a
/// half-applied update.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    inner: Arc<Mutex<MappingConfig>>,
}

impl MappingStore {
    pub fn new(config: MappingConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(config)),
        }
    }

    /// Swap in a new mapping set.
    pub async fn replace(&self, config: MappingConfig) {
        let mut guard = self.inner.lock().await;
        info!(
            tables = config.tables.len(),
            partitions = config.partitions.len(),
            "Mapping configuration replaced"
        );
        *guard = config;
    }

    /// Copy of the current mapping set.
    pub async fn snapshot(&self) -> MappingConfig {
        self.inner.lock().await.clone()
    }

    /// Exclusive access for the duration of a run.
    pub async fn lock(&self) -> MutexGuard<'_, MappingConfig> {
        self.inner.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_camel_case_document() {
        let json = r#"{
            "tables": [
                {"sourceTable": "EMP", "targetTable": "EMP_COPY", "batchSize": 500, "whereClause": "ID > 100"},
                {"sourceTable": "DEPT", "targetTable": "DEPT_COPY"}
            ],
            "partitions": [
                {"sourceTable": "SALES", "targetTable": "SALES_COPY", "partitionKey": "TS"}
            ]
        }"#;
        let config = MappingConfig::from_json(json).unwrap();
        assert_eq!(
            config.tables[0],
            TableMapping::new("EMP", "EMP_COPY")
                .with_batch_size(500)
                .with_where("ID > 100")
        );
        assert_eq!(config.tables[1].effective_batch_size(1000), 1000);
        assert_eq!(config.partitions[0].partition_key, "TS");
    }

    #[test]
    fn test_null_lists_rejected() {
        let err = MappingConfig::from_json(r#"{"tables": null, "partitions": []}"#).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: Tables list cannot be null");

        let err = MappingConfig::from_json(r#"{"tables": []}"#).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: Partitions list cannot be null");
    }

    #[test]
    fn test_validation_reports_position() {
        let request = MappingRequest {
            tables: Some(vec![
                TableMapping::new("EMP", "EMP_COPY"),
                TableMapping::new("DEPT", ""),
            ]),
            partitions: Some(vec![]),
        };
        let err = request.into_config().unwrap_err();
        assert!(err.to_string().contains("tables[1]: targetTable is required"));

        let request = MappingRequest {
            tables: Some(vec![]),
            partitions: Some(vec![PartitionMapping::new("S", "T", "K").with_batch_size(0)]),
        };
        let err = request.into_config().unwrap_err();
        assert!(err.to_string().contains("partitions[0]: batchSize must be at least 1"));
    }

    #[test]
    fn test_blank_filter_is_absent() {
        assert_eq!(TableMapping::new("A", "B").with_where("  ").filter(), None);
        assert_eq!(
            TableMapping::new("A", "B").with_where("X = 1").filter(),
            Some("X = 1")
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tables": [{{"sourceTable": "EMP", "targetTable": "EMP_COPY"}}], "partitions": []}}"#
        )
        .unwrap();
        let config = MappingConfig::load(file.path()).unwrap();
        assert_eq!(config.tables.len(), 1);
    }

    #[tokio::test]
    async fn test_store_replace() {
        let store = MappingStore::default();
        assert!(store.snapshot().await.is_empty());

        let config = MappingConfig {
            tables: vec![TableMapping::new("EMP", "EMP_COPY")],
            partitions: vec![],
        };
        store.replace(config.clone()).await;
        assert_eq!(store.snapshot().await, config);
    }
}
