//! Error types for the migration library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failure, reported per mapping and over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Schema,
    Read,
    Write,
    Connectivity,
    Cancelled,
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, bad mapping document)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Column catalog query failed or the table has no columns
    #[error("Schema error for table {table}: {message}")]
    Schema { table: String, message: String },

    /// Source query or row extraction failed
    #[error("Source read error: {0}")]
    Read(String),

    /// Parameter binding, batch execution or commit failed on the target
    #[error("Target write error: {0}")]
    Write(String),

    /// Could not obtain a connection
    #[error("Connectivity error: {message}\n  Context: {context}")]
    Connectivity { message: String, context: String },

    /// A single mapping failed; wraps the underlying cause
    #[error("Migration {source_table} -> {target_table} failed")]
    Migration {
        source_table: String,
        target_table: String,
        #[source]
        cause: Box<MigrateError>,
    },

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Schema error for a table
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Connectivity error with context about where it occurred
    pub fn connectivity(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Wrap a failure of one mapping.
    pub fn migration(
        source_table: impl Into<String>,
        target_table: impl Into<String>,
        cause: MigrateError,
    ) -> Self {
        MigrateError::Migration {
            source_table: source_table.into(),
            target_table: target_table.into(),
            cause: Box::new(cause),
        }
    }

    /// Classify the error. Mapping failures report the kind of their cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrateError::Config(_)
            | MigrateError::Io(_)
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => ErrorKind::Config,
            MigrateError::Schema { .. } => ErrorKind::Schema,
            MigrateError::Read(_) => ErrorKind::Read,
            MigrateError::Write(_) => ErrorKind::Write,
            MigrateError::Connectivity { .. } => ErrorKind::Connectivity,
            MigrateError::Cancelled => ErrorKind::Cancelled,
            MigrateError::Migration { cause, .. } => cause.kind(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Config => 2,
            ErrorKind::Connectivity => 3,
            ErrorKind::Schema | ErrorKind::Read | ErrorKind::Write => 4,
            ErrorKind::Cancelled => 130,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
