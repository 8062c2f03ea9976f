//! `veracity.toml` configuration
//!
//! Every section is optional; missing keys take their defaults.
//!
//! ```toml
//! [detectors]
//! comment_ratio_threshold = 2.0
//!
//! [validation]
//! significance_level = 0.01
//!
//! [analyzer]
//! detector_deadline_ms = 2000
//!
//! [evidence]
//! database_path = "evidence.db"
//! signing_key_path = "keys/evidence.hex"
//! retention_days = 2555
//! ```

use crate::analyzer::{AnalyzerConfig, TheaterPatternAnalyzer};
use crate::detectors::DetectorThresholds;
use crate::evidence::EvidenceConfig;
use crate::validation::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid [{section}] configuration: {reason}")]
    Invalid { section: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VeracityConfig {
    pub detectors: DetectorThresholds,
    pub validation: ValidationConfig,
    pub analyzer: AnalyzerConfig,
    pub evidence: EvidenceConfig,
}

impl VeracityConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |section: &'static str| move |reason: String| ConfigError::Invalid { section, reason };
        self.detectors.validate().map_err(invalid("detectors"))?;
        self.validation.validate().map_err(invalid("validation"))?;
        self.analyzer.validate().map_err(invalid("analyzer"))?;
        self.evidence.validate().map_err(invalid("evidence"))?;
        Ok(())
    }

    /// Analyzer wired with this configuration's detector and validation sections
    pub fn analyzer(&self) -> TheaterPatternAnalyzer {
        TheaterPatternAnalyzer::new(
            self.analyzer.clone(),
            &self.detectors,
            self.validation.clone(),
        )
    }
}
