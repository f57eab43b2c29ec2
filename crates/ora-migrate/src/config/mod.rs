//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::net::SocketAddr;
use std::path::Path;

use crate::error::{MigrateError, Result};
use crate::mapping::MappingConfig;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Mappings from `migration.mapping_file`, or an empty set when unset.
    pub fn load_mappings(&self) -> Result<MappingConfig> {
        match &self.migration.mapping_file {
            Some(path) => MappingConfig::load(path),
            None => Ok(MappingConfig::default()),
        }
    }

    /// Parsed `server.bind`.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server.bind.parse().map_err(|e| {
            MigrateError::Config(format!("server.bind '{}' is invalid: {}", self.server.bind, e))
        })
    }
}
