//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration.
    pub source: DatabaseConfig,

    /// Target database configuration.
    pub target: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// HTTP control surface configuration.
    #[serde(default)]
    pub server: ServerConfig,
}

/// One Oracle endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type (always "oracle" for now).
    #[serde(default = "default_oracle")]
    pub r#type: String,

    /// Easy Connect string or TNS alias, e.g. `//db-host:1521/ORCLPDB1`.
    pub connect_string: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema to resolve unqualified names against. When set, catalog
    /// lookups are also restricted to this owner.
    #[serde(default)]
    pub schema: Option<String>,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("connect_string", &self.connect_string)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per target flush when a mapping does not set its own (default: 1000).
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Rows fetched per source round trip (default: 1000).
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// JSON mapping document loaded at startup.
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            fetch_size: default_fetch_size(),
            mapping_file: None,
        }
    }
}

/// HTTP control surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default: "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_oracle() -> String {
    "oracle".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_batch_size() -> usize {
    1000
}

fn default_fetch_size() -> usize {
    1000
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
