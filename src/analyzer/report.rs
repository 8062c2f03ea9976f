//! Theater report: the analyzer's external output

use crate::analyzer::pattern::TheaterPattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TheaterStatus {
    Clean,
    LowTheaterRisk,
    ModerateTheaterRisk,
    HighTheaterRisk,
}

impl TheaterStatus {
    /// Status for an overall score; `Clean` only when nothing was found
    pub fn classify(pattern_count: usize, overall_score: f64) -> Self {
        if pattern_count == 0 {
            TheaterStatus::Clean
        } else if overall_score < 0.4 {
            TheaterStatus::LowTheaterRisk
        } else if overall_score < 0.7 {
            TheaterStatus::ModerateTheaterRisk
        } else {
            TheaterStatus::HighTheaterRisk
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TheaterStatus::Clean => "CLEAN",
            TheaterStatus::LowTheaterRisk => "LOW_THEATER_RISK",
            TheaterStatus::ModerateTheaterRisk => "MODERATE_THEATER_RISK",
            TheaterStatus::HighTheaterRisk => "HIGH_THEATER_RISK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheaterReport {
    pub status: TheaterStatus,
    pub theater_detected: bool,
    /// Highest `severity × confidence` among reported patterns
    pub overall_score: f64,
    pub confidence: f64,
    pub pattern_count: usize,
    /// Patterns keyed by type, each list ranked highest first
    pub patterns: BTreeMap<String, Vec<TheaterPattern>>,
    pub recommendations: Vec<String>,
    /// False when the detector deadline cut detection short
    pub detection_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_commit: Option<String>,
}

impl TheaterReport {
    /// Patterns ranked across all types
    pub fn ranked_patterns(&self) -> Vec<&TheaterPattern> {
        let mut all: Vec<&TheaterPattern> = self.patterns.values().flatten().collect();
        all.sort_by(|a, b| {
            b.rank()
                .partial_cmp(&a.rank())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        match self.status {
            TheaterStatus::Clean => report.push_str("✅ CLEAN - no theater patterns detected\n\n"),
            status => report.push_str(&format!(
                "⚠️  {} ({} pattern{})\n\n",
                status.as_str(),
                self.pattern_count,
                if self.pattern_count == 1 { "" } else { "s" }
            )),
        }

        if let Some(module) = &self.module_name {
            report.push_str(&format!("Module: {}\n", module));
        }
        if let Some(commit) = &self.source_commit {
            report.push_str(&format!("Commit: {}\n", commit));
        }
        report.push_str(&format!("Overall score: {:.3}\n", self.overall_score));
        report.push_str(&format!("Confidence: {:.2}\n", self.confidence));
        if !self.detection_complete {
            report.push_str("Note: detector deadline expired, results are partial\n");
        }

        for pattern in self.ranked_patterns() {
            report.push_str(&format!(
                "\n[{}] {} (confidence {:.2}) at {}\n",
                pattern.severity.as_str().to_uppercase(),
                pattern.pattern_type,
                pattern.confidence,
                pattern.location
            ));
            for evidence in &pattern.evidence {
                report.push_str(&format!("    - {}\n", evidence));
            }
        }

        if !self.recommendations.is_empty() {
            report.push_str("\nRecommendations:\n");
            for rec in &self.recommendations {
                report.push_str(&format!("  - {}\n", rec));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::pattern::PatternType;
    use crate::detectors::Severity;

    #[test]
    fn test_status_classification() {
        assert_eq!(TheaterStatus::classify(0, 0.9), TheaterStatus::Clean);
        assert_eq!(TheaterStatus::classify(1, 0.2), TheaterStatus::LowTheaterRisk);
        assert_eq!(TheaterStatus::classify(1, 0.5), TheaterStatus::ModerateTheaterRisk);
        assert_eq!(TheaterStatus::classify(2, 0.7), TheaterStatus::HighTheaterRisk);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&TheaterStatus::ModerateTheaterRisk).unwrap();
        assert_eq!(json, "\"MODERATE_THEATER_RISK\"");
    }

    #[test]
    fn test_report_string_lists_patterns_by_rank() {
        let low = TheaterPattern::new(PatternType::DocumentationTheater, Severity::Low, 0.6, "docs");
        let high = TheaterPattern::new(PatternType::MetricGaming, Severity::Critical, 0.9, "src")
            .with_evidence("coverage +35 points from a config toggle");
        let mut patterns = BTreeMap::new();
        patterns.insert("documentation_theater".to_string(), vec![low]);
        patterns.insert("metric_gaming".to_string(), vec![high]);

        let report = TheaterReport {
            status: TheaterStatus::HighTheaterRisk,
            theater_detected: true,
            overall_score: 0.9,
            confidence: 0.75,
            pattern_count: 2,
            patterns,
            recommendations: vec!["Review metric sources".to_string()],
            detection_complete: true,
            module_name: Some("billing".to_string()),
            source_commit: None,
        };

        let text = report.to_report_string();
        assert!(text.contains("HIGH_THEATER_RISK (2 patterns)"));
        assert!(text.contains("Module: billing"));
        let gaming = text.find("metric_gaming").unwrap();
        let docs = text.find("documentation_theater").unwrap();
        assert!(gaming < docs);
        assert!(text.contains("Review metric sources"));
    }
}
