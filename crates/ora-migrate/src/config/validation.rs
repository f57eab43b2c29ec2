//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::error::{MigrateError, Result};

fn validate_database(name: &str, db: &DatabaseConfig) -> Result<()> {
    if db.r#type != "oracle" {
        return Err(MigrateError::Config(format!(
            "{}.type must be 'oracle', got '{}'",
            name, db.r#type
        )));
    }
    if db.connect_string.is_empty() {
        return Err(MigrateError::Config(format!(
            "{}.connect_string is required",
            name
        )));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", name)));
    }
    if let Some(schema) = &db.schema {
        if schema.is_empty() {
            return Err(MigrateError::Config(format!(
                "{}.schema must not be empty when set",
                name
            )));
        }
    }
    if db.max_connections == 0 {
        return Err(MigrateError::Config(format!(
            "{}.max_connections must be at least 1",
            name
        )));
    }
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;

    if config.migration.default_batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.default_batch_size must be at least 1".into(),
        ));
    }
    if config.migration.fetch_size == 0 {
        return Err(MigrateError::Config(
            "migration.fetch_size must be at least 1".into(),
        ));
    }

    config.bind_addr()?;

    Ok(())
}
