//! Database driver implementations of the core traits.
//!
//! - [`oracle`]: Oracle source and target
//! - `memory`: in-process fake used by the unit tests

#[cfg(test)]
pub(crate) mod memory;
pub mod oracle;

pub use self::oracle::{OracleSource, OracleTarget};

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::core::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};

/// The two database handles every component is built from.
#[derive(Clone)]
pub struct Endpoints {
    pub source: Arc<dyn SourceReader>,
    pub target: Arc<dyn TargetWriter>,
}

impl Endpoints {
    /// Build source and target handles for a validated configuration.
    ///
    /// Pools connect lazily, so this succeeds even when a database is down.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn SourceReader> = match config.source.r#type.as_str() {
            "oracle" => Arc::new(OracleSource::new(
                &config.source,
                config.migration.fetch_size,
            )),
            other => {
                return Err(MigrateError::Config(format!(
                    "unsupported source type '{}'",
                    other
                )))
            }
        };
        let target: Arc<dyn TargetWriter> = match config.target.r#type.as_str() {
            "oracle" => Arc::new(OracleTarget::new(&config.target)),
            other => {
                return Err(MigrateError::Config(format!(
                    "unsupported target type '{}'",
                    other
                )))
            }
        };
        info!(
            "Source: {} ({}), target: {} ({})",
            config.source.connect_string,
            source.db_type(),
            config.target.connect_string,
            target.db_type()
        );
        Ok(Self { source, target })
    }
}
