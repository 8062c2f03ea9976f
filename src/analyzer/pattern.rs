//! Theater patterns emitted by the analyzer

use crate::detectors::{DetectionResult, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of theater a pattern describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    SuperficialRefactoring,
    MetricGaming,
    DocumentationTheater,
    PerformanceTheater,
    CorrelationMismatch,
    Anomaly,
}

impl PatternType {
    pub const ALL: [PatternType; 6] = [
        PatternType::SuperficialRefactoring,
        PatternType::MetricGaming,
        PatternType::DocumentationTheater,
        PatternType::PerformanceTheater,
        PatternType::CorrelationMismatch,
        PatternType::Anomaly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::SuperficialRefactoring => "superficial_refactoring",
            PatternType::MetricGaming => "metric_gaming",
            PatternType::DocumentationTheater => "documentation_theater",
            PatternType::PerformanceTheater => "performance_theater",
            PatternType::CorrelationMismatch => "correlation_mismatch",
            PatternType::Anomaly => "anomaly",
        }
    }

    /// Position in [`PatternType::ALL`], used as a model feature
    pub fn index(&self) -> usize {
        match self {
            PatternType::SuperficialRefactoring => 0,
            PatternType::MetricGaming => 1,
            PatternType::DocumentationTheater => 2,
            PatternType::PerformanceTheater => 3,
            PatternType::CorrelationMismatch => 4,
            PatternType::Anomaly => 5,
        }
    }

    /// Pattern type a triggered detector maps to
    pub fn for_detector(detector: &str) -> Option<PatternType> {
        match detector {
            "comment_inflation" => Some(PatternType::DocumentationTheater),
            "variable_renaming" => Some(PatternType::SuperficialRefactoring),
            "test_padding" | "complexity_hiding" => Some(PatternType::MetricGaming),
            "micro_optimization" => Some(PatternType::PerformanceTheater),
            _ => None,
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected theater pattern; never mutated once recorded in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheaterPattern {
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub confidence: f64,
    pub evidence: Vec<String>,
    /// Module, path or commit the pattern refers to
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TheaterPattern {
    pub fn new(pattern_type: PatternType, severity: Severity, confidence: f64, location: &str) -> Self {
        Self {
            pattern_type,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
            location: location.to_string(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Pattern for a triggered detector result, if the detector maps to one
    pub fn from_detection(result: &DetectionResult, location: &str) -> Option<Self> {
        if !result.theater_detected {
            return None;
        }
        let pattern_type = PatternType::for_detector(&result.detector)?;
        let mut pattern = Self::new(pattern_type, result.severity, result.confidence, location);
        pattern.evidence = result.evidence.clone();
        pattern.metadata = result.metadata.clone();
        pattern
            .metadata
            .insert("detector".to_string(), result.detector.clone().into());
        Some(pattern)
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_mapping() {
        assert_eq!(
            PatternType::for_detector("comment_inflation"),
            Some(PatternType::DocumentationTheater)
        );
        assert_eq!(
            PatternType::for_detector("complexity_hiding"),
            Some(PatternType::MetricGaming)
        );
        assert_eq!(PatternType::for_detector("unknown"), None);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, t) in PatternType::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
    }

    #[test]
    fn test_untriggered_detection_yields_no_pattern() {
        let result = DetectionResult::clean("comment_inflation");
        assert!(TheaterPattern::from_detection(&result, "src").is_none());
    }

    #[test]
    fn test_from_detection_copies_evidence() {
        let mut result = DetectionResult::clean("micro_optimization")
            .detected(true)
            .with_evidence("3 micro lines");
        result.confidence = 0.9;
        result.severity = Severity::High;
        let pattern = TheaterPattern::from_detection(&result, "src/hot.rs").unwrap();
        assert_eq!(pattern.pattern_type, PatternType::PerformanceTheater);
        assert_eq!(pattern.evidence, vec!["3 micro lines".to_string()]);
        assert_eq!(pattern.metadata["detector"], "micro_optimization");
        assert!((pattern.rank() - 0.675).abs() < 1e-12);
    }
}
