//! Connectivity probes for the configured databases.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{SourceReader, TargetWriter};

/// Probe results for both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub source_connection: bool,
    pub target_connection: bool,
}

impl ConnectionReport {
    pub fn all_ok(&self) -> bool {
        self.source_connection && self.target_connection
    }
}

/// Answers "can we reach the source / target right now".
#[derive(Clone)]
pub struct ConnectionTester {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
}

impl ConnectionTester {
    pub fn new(source: Arc<dyn SourceReader>, target: Arc<dyn TargetWriter>) -> Self {
        Self { source, target }
    }

    /// `true` when a trivial query succeeds on the source.
    pub async fn test_source(&self) -> bool {
        match self.source.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Source connection test failed: {}", e);
                false
            }
        }
    }

    /// `true` when a trivial query succeeds on the target.
    pub async fn test_target(&self) -> bool {
        match self.target.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Target connection test failed: {}", e);
                false
            }
        }
    }

    pub async fn test_all(&self) -> ConnectionReport {
        ConnectionReport {
            source_connection: self.test_source().await,
            target_connection: self.test_target().await,
        }
    }
}
