//! SELECT and INSERT text for a mapping.
//!
//! Identifiers and filter predicates are inserted verbatim; mappings are
//! operator-authored and trusted.

use std::sync::Arc;

use tracing::debug;

use crate::core::ColumnInfo;

/// A SELECT together with the columns it projects, in order.
#[derive(Debug, Clone)]
pub struct SelectStatement {
    pub sql: String,
    pub columns: Arc<[ColumnInfo]>,
}

/// A parameterized INSERT together with the columns it binds, in order.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub sql: String,
    pub columns: Arc<[ColumnInfo]>,
}

impl SelectStatement {
    pub fn for_table(table: &str, columns: Arc<[ColumnInfo]>, where_clause: Option<&str>) -> Self {
        Self {
            sql: select_for(table, &columns, where_clause),
            columns,
        }
    }

    pub fn for_partition(
        table: &str,
        columns: Arc<[ColumnInfo]>,
        partition_key: &str,
        partition_name: &str,
        where_clause: Option<&str>,
    ) -> Self {
        Self {
            sql: select_partition_for(table, &columns, partition_key, partition_name, where_clause),
            columns,
        }
    }
}

impl InsertStatement {
    pub fn for_table(table: &str, columns: Arc<[ColumnInfo]>) -> Self {
        Self {
            sql: insert_for(table, &columns),
            columns,
        }
    }
}

fn column_list(columns: &[ColumnInfo]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_where(sql: &mut String, where_clause: Option<&str>) {
    if let Some(predicate) = where_clause.filter(|w| !w.trim().is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
}

/// `SELECT c1, c2 FROM table [WHERE predicate]`
pub fn select_for(table: &str, columns: &[ColumnInfo], where_clause: Option<&str>) -> String {
    let mut sql = format!("SELECT {} FROM {}", column_list(columns), table);
    push_where(&mut sql, where_clause);
    sql
}

/// `SELECT c1, c2 FROM table PARTITION(name) [WHERE predicate]`
///
/// The key only selected which partitions to visit; it does not appear in
/// the statement.
pub fn select_partition_for(
    table: &str,
    columns: &[ColumnInfo],
    partition_key: &str,
    partition_name: &str,
    where_clause: Option<&str>,
) -> String {
    debug!(table, partition_key, partition_name, "Building partition select");
    let mut sql = format!(
        "SELECT {} FROM {} PARTITION({})",
        column_list(columns),
        table,
        partition_name
    );
    push_where(&mut sql, where_clause);
    sql
}

/// `INSERT INTO table (c1, c2) VALUES (?, ?)`
pub fn insert_for(table: &str, columns: &[ColumnInfo]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        column_list(columns),
        vec!["?"; columns.len()].join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emp_columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("ID", "NUMBER"),
            ColumnInfo::new("NAME", "VARCHAR2"),
            ColumnInfo::new("BORN", "DATE"),
        ]
    }

    #[test]
    fn test_select_without_filter() {
        assert_eq!(
            select_for("EMP", &emp_columns(), None),
            "SELECT ID, NAME, BORN FROM EMP"
        );
        assert_eq!(
            select_for("EMP", &emp_columns(), Some("")),
            "SELECT ID, NAME, BORN FROM EMP"
        );
    }

    #[test]
    fn test_select_with_filter() {
        assert_eq!(
            select_for("EMP", &emp_columns(), Some("ID > 100")),
            "SELECT ID, NAME, BORN FROM EMP WHERE ID > 100"
        );
    }

    #[test]
    fn test_select_partition() {
        let columns = vec![ColumnInfo::new("ID", "NUMBER"), ColumnInfo::new("TS", "DATE")];
        assert_eq!(
            select_partition_for("SALES", &columns, "TS", "P2023", Some("ID < 5")),
            "SELECT ID, TS FROM SALES PARTITION(P2023) WHERE ID < 5"
        );
    }

    #[test]
    fn test_insert_placeholders() {
        assert_eq!(
            insert_for("EMP_COPY", &emp_columns()),
            "INSERT INTO EMP_COPY (ID, NAME, BORN) VALUES (?, ?, ?)"
        );
        assert_eq!(
            insert_for("ONE", &[ColumnInfo::new("X", "NUMBER")]),
            "INSERT INTO ONE (X) VALUES (?)"
        );
    }

    #[test]
    fn test_statements_share_columns() {
        let columns: Arc<[ColumnInfo]> = emp_columns().into();
        let select = SelectStatement::for_table("EMP", columns.clone(), None);
        let insert = InsertStatement::for_table("EMP_COPY", columns);
        assert!(Arc::ptr_eq(&select.columns, &insert.columns));
    }
}
