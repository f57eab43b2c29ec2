//! # ora-migrate
//!
//! Batched table copy between Oracle databases driven by declarative mappings.
//!
//! A mapping names a source table (or the partitions of one), a target
//! table, a batch size and an optional row filter. For each mapping the
//! engine:
//!
//! - **Discovers** the source columns from the data dictionary
//! - **Streams** rows through a server-side cursor
//! - **Inserts** them in fixed-size parameter batches, typed per column
//! - **Commits** once per mapping, rolling back on any failure
//!
//! ## Example
//!
//! ```rust,no_run
//! use ora_migrate::{BatchCopier, Config, Coordinator, Endpoints, MappingStore};
//!
//! #[tokio::main]
//! async fn main() -> ora_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let endpoints = Endpoints::from_config(&config)?;
//!     let copier = BatchCopier::new(
//!         endpoints.source,
//!         endpoints.target,
//!         config.migration.default_batch_size,
//!     );
//!     let coordinator = Coordinator::new(copier, MappingStore::new(config.load_mappings()?));
//!     let report = coordinator.migrate_all().await;
//!     println!("Copied {} rows", report.rows_copied());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod health;
pub mod introspect;
pub mod mapping;
pub mod orchestrator;
pub mod query;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, MigrationConfig, ServerConfig};
pub use crate::core::{ColumnInfo, OpaqueValue, Row, SqlNullType, SqlValue};
pub use drivers::Endpoints;
pub use error::{ErrorKind, MigrateError, Result};
pub use health::{ConnectionReport, ConnectionTester};
pub use introspect::SchemaIntrospector;
pub use mapping::{MappingConfig, MappingStore, PartitionMapping, TableMapping};
pub use orchestrator::{Coordinator, MappingOutcome, OutcomeStatus, RunReport};
pub use transfer::{BatchCopier, TransferStats};
