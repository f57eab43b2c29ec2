//! Column and partition discovery against the source data dictionary.

use std::sync::Arc;

use tracing::debug;

use crate::core::{ColumnInfo, SourceReader};
use crate::error::{MigrateError, Result};

/// Column catalog for tables visible to the session.
pub const COLUMNS_SQL: &str = "SELECT column_name, data_type, data_length, data_precision, \
     data_scale FROM all_tab_columns WHERE table_name = ? ORDER BY column_id";

/// Column catalog restricted to one owner.
pub const COLUMNS_BY_OWNER_SQL: &str = "SELECT column_name, data_type, data_length, \
     data_precision, data_scale FROM all_tab_columns WHERE owner = ? AND table_name = ? \
     ORDER BY column_id";

/// Partitions whose partitioning column list matches a LIKE pattern.
pub const PARTITIONS_SQL: &str = "SELECT p.partition_name FROM all_tab_partitions p \
     WHERE p.table_name = ? AND EXISTS (SELECT 1 FROM all_part_key_columns k \
     WHERE k.owner = p.table_owner AND k.name = p.table_name AND k.object_type = 'TABLE' \
     AND k.column_name LIKE ?) ORDER BY p.partition_position";

/// Partition catalog restricted to one owner.
pub const PARTITIONS_BY_OWNER_SQL: &str = "SELECT p.partition_name FROM all_tab_partitions p \
     WHERE p.table_owner = ? AND p.table_name = ? AND EXISTS (SELECT 1 FROM all_part_key_columns k \
     WHERE k.owner = p.table_owner AND k.name = p.table_name AND k.object_type = 'TABLE' \
     AND k.column_name LIKE ?) ORDER BY p.partition_position";

/// Substring pattern used to match a partition key.
pub fn key_pattern(partition_key: &str) -> String {
    format!("%{}%", partition_key)
}

/// Looks up table shape through a [`SourceReader`].
#[derive(Clone)]
pub struct SchemaIntrospector {
    source: Arc<dyn SourceReader>,
}

impl SchemaIntrospector {
    pub fn new(source: Arc<dyn SourceReader>) -> Self {
        Self { source }
    }

    /// Columns of `table` in declared order. A table with no visible
    /// columns is a schema error.
    pub async fn columns_of(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let columns = self
            .source
            .column_catalog(table)
            .await
            .map_err(|e| catalog_error(table, e))?;

        if columns.is_empty() {
            return Err(MigrateError::schema(
                table,
                "no columns found in catalog (missing table or no access)",
            ));
        }

        debug!(table, columns = columns.len(), "Discovered columns");
        Ok(columns)
    }

    /// Partitions of `table` partitioned on a column matching `partition_key`.
    /// No match is an empty list.
    pub async fn partitions_of(&self, table: &str, partition_key: &str) -> Result<Vec<String>> {
        let partitions = self
            .source
            .partition_catalog(table, &key_pattern(partition_key))
            .await
            .map_err(|e| catalog_error(table, e))?;

        debug!(table, partition_key, partitions = partitions.len(), "Discovered partitions");
        Ok(partitions)
    }
}

fn catalog_error(table: &str, err: MigrateError) -> MigrateError {
    match err {
        MigrateError::Connectivity { .. } | MigrateError::Cancelled => err,
        other => MigrateError::schema(table, format!("catalog query failed: {}", other)),
    }
}
