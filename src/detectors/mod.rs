//! Pattern detector registry
//!
//! Each detector flags one theater signature from the same
//! `(ChangeSet, MetricDelta)` input. Detectors never talk to each other and
//! never mutate shared state, so the orchestrator can run them on any thread.
//!
//! # Detectors
//!
//! ## 1. Comment Inflation
//! Added comments outnumber added code.
//! - **Detection:** comment/code ratio above threshold in at least N files,
//!   or more than 90% of the added lines are comments
//! - **Fix:** Keep documentation proportional to the code it describes
//!
//! ## 2. Variable Renaming
//! Diff is dominated by identifier swaps with unchanged structure.
//! - **Detection:** removed/added line pairs with identical token shape
//!
//! ## 3. Test Padding
//! Many trivial tests added alongside a large coverage jump.
//! - **Detection:** trivial test ratio high, coverage gain high, few assertions
//!
//! ## 4. Micro-Optimization
//! Idiom swaps claimed as performance work.
//! - **Detection:** micro idiom swaps dominate algorithmic lines while a
//!   measured performance metric stays flat
//!
//! ## 5. Complexity Hiding
//! Complexity drops because logic was split into tiny delegating functions.
//! - **Detection:** substantial complexity drop plus many small extracted helpers
//!
//! # Scoring
//!
//! Confidence is the mean of a detector's indicator ratios, clipped to `[0, 1]`.
//! Severity buckets `confidence × impact`: critical ≥ 0.8, high ≥ 0.6,
//! medium ≥ 0.4, otherwise low.

mod comment_inflation;
mod complexity_hiding;
mod micro_optimization;
mod test_padding;
mod thresholds;
mod variable_renaming;

pub use comment_inflation::CommentInflationDetector;
pub use complexity_hiding::ComplexityHidingDetector;
pub use micro_optimization::{classify_line, MicroOptimizationDetector, OptimizationKind};
pub use test_padding::{parse_added_tests, AddedTest, TestPaddingDetector};
pub use thresholds::DetectorThresholds;
pub use variable_renaming::VariableRenamingDetector;

use crate::change_set::ChangeSet;
use crate::metrics::MetricDelta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Severity level for detections and theater patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity - worth a note in review
    Low,
    /// Medium severity - reviewer should look closer
    Medium,
    /// High severity - likely theater
    High,
    /// Critical severity - block the change
    Critical,
}

impl Severity {
    /// Ranking weight; `weight() × confidence` orders findings
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 0.25,
            Severity::Medium => 0.5,
            Severity::High => 0.75,
            Severity::Critical => 1.0,
        }
    }

    /// Bucket a `[0, 1]` score
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Severity::Critical
        } else if score >= 0.6 {
            Severity::High
        } else if score >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Errors a detector may report instead of a result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("Detector '{detector}' received unusable input: {reason}")]
    InvalidInput {
        detector: &'static str,
        reason: String,
    },

    #[error("Detector '{detector}' failed: {reason}")]
    Computation {
        detector: &'static str,
        reason: String,
    },

    #[error("Detector '{detector}' panicked: {message}")]
    Panicked { detector: String, message: String },
}

/// Output of a single detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detector: String,
    pub theater_detected: bool,
    pub confidence: f64,
    pub severity: Severity,
    pub evidence: Vec<String>,
    pub recommendations: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl DetectionResult {
    /// Empty, non-triggered result
    pub fn clean(detector: &str) -> Self {
        Self {
            detector: detector.to_string(),
            theater_detected: false,
            confidence: 0.0,
            severity: Severity::Low,
            evidence: Vec::new(),
            recommendations: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set confidence from indicator ratios and severity from `confidence × impact`
    pub fn scored(mut self, indicators: &[f64], impact: f64) -> Self {
        self.confidence = mean_indicator(indicators);
        self.severity = Severity::from_score(self.confidence * impact.clamp(0.0, 1.0));
        self
    }

    pub fn detected(mut self, detected: bool) -> Self {
        self.theater_detected = detected;
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// `severity weight × confidence`
    pub fn rank(&self) -> f64 {
        self.severity.weight() * self.confidence
    }
}

/// Mean of indicator ratios, each clipped to [0, 1]
pub fn mean_indicator(indicators: &[f64]) -> f64 {
    if indicators.is_empty() {
        return 0.0;
    }
    let sum: f64 = indicators
        .iter()
        .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
        .sum();
    (sum / indicators.len() as f64).clamp(0.0, 1.0)
}

/// A pluggable theater heuristic
pub trait Detector: Send + Sync {
    /// Stable identifier used in results and logs
    fn name(&self) -> &'static str;

    /// Inspect the change-set and metric delta; must be side-effect free
    fn detect(
        &self,
        changes: &ChangeSet,
        delta: &MetricDelta,
    ) -> Result<DetectionResult, DetectorError>;
}

/// The fixed detector set for a deployment
pub fn default_detectors(thresholds: &DetectorThresholds) -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(CommentInflationDetector::new(thresholds.clone())),
        Arc::new(VariableRenamingDetector::new(thresholds.clone())),
        Arc::new(TestPaddingDetector::new(thresholds.clone())),
        Arc::new(MicroOptimizationDetector::new(thresholds.clone())),
        Arc::new(ComplexityHidingDetector::new(thresholds.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_buckets() {
        assert_eq!(Severity::from_score(0.95), Severity::Critical);
        assert_eq!(Severity::from_score(0.8), Severity::Critical);
        assert_eq!(Severity::from_score(0.6), Severity::High);
        assert_eq!(Severity::from_score(0.45), Severity::Medium);
        assert_eq!(Severity::from_score(0.1), Severity::Low);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_rank_monotonic_in_confidence_and_severity() {
        let mut a = DetectionResult::clean("a");
        a.confidence = 0.5;
        a.severity = Severity::High;
        let mut b = a.clone();
        b.confidence = 0.6;
        assert!(b.rank() > a.rank());
        let mut c = a.clone();
        c.severity = Severity::Critical;
        assert!(c.rank() > a.rank());
    }

    #[test]
    fn test_mean_indicator_clips() {
        assert_eq!(mean_indicator(&[]), 0.0);
        assert_eq!(mean_indicator(&[2.0, 1.0]), 1.0);
        assert_eq!(mean_indicator(&[-1.0, 0.5]), 0.25);
        assert_eq!(mean_indicator(&[f64::NAN, 1.0]), 0.5);
    }

    #[test]
    fn test_default_registry_has_five_unique_detectors() {
        let detectors = default_detectors(&DetectorThresholds::default());
        let mut names: Vec<&str> = detectors.iter().map(|d| d.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }
}
