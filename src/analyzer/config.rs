// Configuration for the theater pattern analyzer

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Patterns below this confidence are dropped from the report
    pub min_confidence: f64,

    /// Mean improvement of changed metrics that makes gaming worth checking
    pub gaming_improvement_threshold: f64,

    /// Substantive lines expected per unit (100%) of total improvement
    pub lines_per_improvement_unit: f64,

    /// Cosmetic/documentation/config share of changed lines counted as superficial
    pub superficial_share_threshold: f64,

    /// Isolation forest size
    pub num_trees: usize,
    pub subsample_size: usize,
    /// Minimum history + candidate patterns before the forest is trained
    pub min_training_samples: usize,
    pub anomaly_threshold: f64,
    pub seed: u64,

    /// Patterns kept for similarity lookups and anomaly training
    pub history_capacity: usize,

    /// Detector deadline in milliseconds; none waits for every detector
    pub detector_deadline_ms: Option<u64>,
    /// Detector worker pool size; none uses one worker per detector
    pub detector_workers: Option<usize>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            gaming_improvement_threshold: 0.25,
            lines_per_improvement_unit: 40.0,
            superficial_share_threshold: 0.6,
            num_trees: 100,
            subsample_size: 256,
            min_training_samples: 16,
            anomaly_threshold: 0.65,
            seed: 42,
            history_capacity: 10_000,
            detector_deadline_ms: None,
            detector_workers: None,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("superficial_share_threshold", self.superficial_share_threshold),
            ("anomaly_threshold", self.anomaly_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }

        if self.gaming_improvement_threshold <= 0.0 {
            return Err(format!(
                "gaming_improvement_threshold must be positive, got {}",
                self.gaming_improvement_threshold
            ));
        }

        if self.lines_per_improvement_unit <= 0.0 {
            return Err(format!(
                "lines_per_improvement_unit must be positive, got {}",
                self.lines_per_improvement_unit
            ));
        }

        if self.num_trees == 0 || self.subsample_size < 2 {
            return Err("num_trees must be >= 1 and subsample_size >= 2".to_string());
        }

        if self.min_training_samples < 2 {
            return Err(format!(
                "min_training_samples must be >= 2, got {}",
                self.min_training_samples
            ));
        }

        if self.history_capacity == 0 {
            return Err("history_capacity must be >= 1".to_string());
        }

        if self.detector_workers == Some(0) {
            return Err("detector_workers must be >= 1".to_string());
        }

        Ok(())
    }
}
