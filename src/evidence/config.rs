// Configuration for evidence collection and retention

use crate::evidence::compliance::{default_tables, ComplianceTable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// SQLite file; none keeps evidence in memory for the process lifetime
    pub database_path: Option<PathBuf>,

    /// File holding the hex Ed25519 seed
    pub signing_key_path: Option<PathBuf>,

    /// Days packages and items are kept before `purge_expired` removes them
    pub retention_days: i64,

    /// Backoff before the single store retry, in milliseconds
    pub retry_backoff_ms: u64,

    /// Actor recorded in custody events
    pub actor: String,

    pub compliance: Vec<ComplianceTable>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            signing_key_path: None,
            retention_days: 2555,
            retry_backoff_ms: 100,
            actor: "veracity".to_string(),
            compliance: default_tables(),
        }
    }
}

impl EvidenceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.retention_days <= 0 {
            return Err(format!(
                "retention_days must be positive, got {}",
                self.retention_days
            ));
        }

        if self.actor.trim().is_empty() {
            return Err("actor must not be empty".to_string());
        }

        for table in &self.compliance {
            table.validate()?;
        }

        Ok(())
    }
}
