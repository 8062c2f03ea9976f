//! Theater pattern analyzer
//!
//! Top-level entry point. One call runs the whole pipeline:
//!
//! 1. Metric delta between the before/after snapshots
//! 2. All detectors through the [`DetectorOrchestrator`]
//! 3. Reality validation of the claimed improvement
//! 4. Correlation: detector patterns, the analyzer's own metric-gaming check,
//!    the correlation-mismatch check, and isolation-forest anomalies over the
//!    candidate patterns against recorded history
//!
//! Patterns below `min_confidence` are dropped; the rest are ranked by
//! `severity × confidence` and appended to the shared [`PatternHistory`].
//!
//! # Example
//!
//! ```
//! use veracity::analyzer::{AnalysisRequest, TheaterPatternAnalyzer, TheaterStatus};
//! use veracity::change_set::{ChangeSet, FileChange};
//! use veracity::metrics::MetricSnapshot;
//!
//! let analyzer = TheaterPatternAnalyzer::default();
//! let request = AnalysisRequest::new(
//!     ChangeSet::new(vec![FileChange::new("config/app.toml", "-fast = false\n+fast = true")]),
//!     MetricSnapshot::new().with("complexity", 20.0).with("coverage", 0.6),
//!     MetricSnapshot::new().with("complexity", 8.0).with("coverage", 0.95),
//! );
//! let analysis = analyzer.analyze(&request).unwrap();
//! assert_eq!(analysis.report.status, TheaterStatus::HighTheaterRisk);
//! ```

mod config;
mod history;
mod pattern;
mod report;

pub use config::AnalyzerConfig;
pub use history::{similarity, PatternHistory};
pub use pattern::{PatternType, TheaterPattern};
pub use report::{TheaterReport, TheaterStatus};

use crate::change_set::{ChangeSet, InputError};
use crate::detectors::{DetectorThresholds, Severity};
use crate::isolation_forest::{feature_contributions, pattern_features, IsolationForest};
use crate::metrics::{MetricDelta, MetricSnapshot};
use crate::orchestrator::{DetectorOrchestrator, OrchestratorReport};
use crate::validation::{category_lines, RealityValidator, ValidationConfig, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Input of one analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub changes: ChangeSet,
    pub before: MetricSnapshot,
    pub after: MetricSnapshot,
    pub description: String,
    pub claimed_improvements: Vec<String>,
    pub source_commit: Option<String>,
    pub module_name: Option<String>,
}

#[derive(Deserialize)]
struct RawRequest {
    changes: serde_json::Value,
    before: serde_json::Value,
    after: serde_json::Value,
    #[serde(default)]
    description: String,
    #[serde(default)]
    claimed_improvements: Vec<String>,
    #[serde(default)]
    source_commit: Option<String>,
    #[serde(default)]
    module_name: Option<String>,
}

impl AnalysisRequest {
    pub fn new(changes: ChangeSet, before: MetricSnapshot, after: MetricSnapshot) -> Self {
        Self {
            changes,
            before,
            after,
            description: String::new(),
            claimed_improvements: Vec::new(),
            source_commit: None,
            module_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_claims<I, S>(mut self, claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.claimed_improvements = claims.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module_name = Some(module.into());
        self
    }

    /// Parse the JSON request format
    pub fn from_json(input: &str) -> Result<Self, InputError> {
        let raw: RawRequest =
            serde_json::from_str(input).map_err(|e| InputError::MalformedRequest(e.to_string()))?;
        Ok(Self {
            changes: ChangeSet::from_value(raw.changes)?,
            before: MetricSnapshot::from_value(raw.before)?,
            after: MetricSnapshot::from_value(raw.after)?,
            description: raw.description,
            claimed_improvements: raw.claimed_improvements,
            source_commit: raw.source_commit,
            module_name: raw.module_name,
        })
    }

    /// Location attached to emitted patterns
    pub fn location(&self) -> String {
        if let Some(module) = &self.module_name {
            return module.clone();
        }
        match self.changes.paths().as_slice() {
            [] => "empty change-set".to_string(),
            [only] => only.to_string(),
            many => format!("{} files", many.len()),
        }
    }
}

/// Everything one analysis produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TheaterAnalysis {
    pub report: TheaterReport,
    pub validation: ValidationResult,
    pub detection: OrchestratorReport,
    pub delta: MetricDelta,
}

pub struct TheaterPatternAnalyzer {
    config: AnalyzerConfig,
    orchestrator: DetectorOrchestrator,
    validator: RealityValidator,
    history: Arc<PatternHistory>,
}

impl TheaterPatternAnalyzer {
    pub fn new(
        config: AnalyzerConfig,
        thresholds: &DetectorThresholds,
        validation: ValidationConfig,
    ) -> Self {
        let history = Arc::new(PatternHistory::new(config.history_capacity));
        Self::with_history(config, thresholds, validation, history)
    }

    /// Share a pattern history between analyzers
    pub fn with_history(
        config: AnalyzerConfig,
        thresholds: &DetectorThresholds,
        validation: ValidationConfig,
        history: Arc<PatternHistory>,
    ) -> Self {
        let mut orchestrator = DetectorOrchestrator::with_defaults(thresholds);
        if let Some(workers) = config.detector_workers {
            orchestrator = orchestrator.with_workers(workers);
        }
        if let Some(ms) = config.detector_deadline_ms {
            orchestrator = orchestrator.with_deadline(Duration::from_millis(ms));
        }
        Self {
            config,
            orchestrator,
            validator: RealityValidator::new(validation),
            history,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<PatternHistory> {
        &self.history
    }

    pub fn validator(&self) -> &RealityValidator {
        &self.validator
    }

    /// Run the full pipeline; fails only on malformed input
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<TheaterAnalysis, InputError> {
        request.before.validate()?;
        request.after.validate()?;

        let delta = MetricDelta::between(&request.before, &request.after);
        let detection = self.orchestrator.run(&request.changes, &delta);
        let validation = self.validator.validate(
            &request.before,
            &request.after,
            &request.changes,
            &request.claimed_improvements,
            &request.description,
        )?;

        let location = request.location();
        let mut candidates: Vec<TheaterPattern> = detection
            .ranked_triggered()
            .into_iter()
            .filter_map(|r| TheaterPattern::from_detection(r, &location))
            .collect();

        if let Some(gaming) = self.metric_gaming(&request.changes, &delta, &location) {
            candidates.push(gaming);
        }
        if let Some(mismatch) = self.correlation_mismatch(&candidates, &request.changes, &location) {
            candidates.push(mismatch);
        }
        let anomalies = self.anomalies(&candidates, &location);
        candidates.extend(anomalies);

        let mut patterns: Vec<TheaterPattern> = candidates
            .into_iter()
            .filter(|p| p.confidence >= self.config.min_confidence)
            .map(|p| {
                let prior = self.history.similar(&p).len();
                p.with_metadata("similar_prior_cases", prior)
            })
            .collect();
        patterns.sort_by(|a, b| {
            b.rank()
                .partial_cmp(&a.rank())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.history.record_all(&patterns);

        let report = self.build_report(request, &patterns, &detection, &validation);
        tracing::info!(
            status = report.status.as_str(),
            patterns = report.pattern_count,
            overall_score = report.overall_score,
            is_genuine = validation.is_genuine,
            "theater analysis complete"
        );

        Ok(TheaterAnalysis {
            report,
            validation,
            detection,
            delta,
        })
    }

    /// Large metric improvements that the substantive lines cannot explain
    fn metric_gaming(
        &self,
        changes: &ChangeSet,
        delta: &MetricDelta,
        location: &str,
    ) -> Option<TheaterPattern> {
        let c = &self.config;
        let mean_improvement = delta.mean_changed_improvement();
        if mean_improvement < c.gaming_improvement_threshold {
            return None;
        }

        let total_improvement = delta.total_positive_improvement();
        let expected_lines = c.lines_per_improvement_unit * total_improvement;
        let substantive: usize = category_lines(changes)
            .iter()
            .filter(|(cat, _)| cat.is_substantive())
            .map(|(_, n)| *n)
            .sum();
        if substantive as f64 >= expected_lines {
            return None;
        }

        let unsupported = 1.0 - substantive as f64 / expected_lines;
        let saturation = (mean_improvement / (2.0 * c.gaming_improvement_threshold)).min(1.0);
        let confidence = (unsupported * saturation).clamp(0.0, 1.0);

        let mut pattern = TheaterPattern::new(
            PatternType::MetricGaming,
            Severity::from_score(confidence),
            confidence,
            location,
        )
        .with_evidence(format!(
            "Changed metrics improved {:.0}% on average with {} substantive lines (about {:.0} expected)",
            mean_improvement * 100.0,
            substantive,
            expected_lines
        ))
        .with_metadata("mean_improvement", mean_improvement)
        .with_metadata("substantive_lines", substantive)
        .with_metadata("expected_lines", expected_lines);

        for (name, change) in delta.changes.iter().filter(|(_, c)| c.improvement > 0.0) {
            pattern = pattern.with_evidence(format!(
                "{}: {} -> {} ({:+.0}%)",
                name,
                change.before,
                change.after,
                change.improvement * 100.0
            ));
        }
        Some(pattern)
    }

    /// Metric gaming on a predominantly superficial change-set
    fn correlation_mismatch(
        &self,
        candidates: &[TheaterPattern],
        changes: &ChangeSet,
        location: &str,
    ) -> Option<TheaterPattern> {
        let gaming_confidence = candidates
            .iter()
            .filter(|p| p.pattern_type == PatternType::MetricGaming)
            .map(|p| p.confidence)
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))))?;

        let share = changes.superficial_share();
        if share < self.config.superficial_share_threshold {
            return None;
        }

        let confidence = ((gaming_confidence + share) / 2.0).clamp(0.0, 1.0);
        let severity = if confidence >= 0.8 {
            Severity::Critical
        } else {
            Severity::High
        };
        Some(
            TheaterPattern::new(PatternType::CorrelationMismatch, severity, confidence, location)
                .with_evidence(format!(
                    "Metric gaming flagged while {:.0}% of changed lines are cosmetic, documentation or configuration",
                    share * 100.0
                ))
                .with_metadata("superficial_share", share)
                .with_metadata("gaming_confidence", gaming_confidence),
        )
    }

    /// Candidates the isolation forest finds unusual against history
    fn anomalies(&self, candidates: &[TheaterPattern], location: &str) -> Vec<TheaterPattern> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let c = &self.config;
        let candidate_features: Vec<Vec<f64>> = candidates.iter().map(pattern_features).collect();
        let mut training = self.history.feature_matrix();
        training.extend(candidate_features.iter().cloned());
        if training.len() < c.min_training_samples {
            tracing::debug!(
                samples = training.len(),
                required = c.min_training_samples,
                "not enough patterns to train the anomaly model"
            );
            return Vec::new();
        }

        let mut forest = IsolationForest::new(c.num_trees, Some(c.subsample_size), c.seed);
        forest.fit(&training);

        candidates
            .iter()
            .zip(candidate_features.iter())
            .filter_map(|(candidate, features)| {
                let score = forest.anomaly_score(features);
                if score <= c.anomaly_threshold {
                    return None;
                }
                let drivers: Vec<String> = feature_contributions(features, &training)
                    .into_iter()
                    .take(2)
                    .map(|(name, share)| format!("{} ({:.0}%)", name, share))
                    .collect();
                Some(
                    TheaterPattern::new(
                        PatternType::Anomaly,
                        Severity::from_score(score),
                        score,
                        location,
                    )
                    .with_evidence(format!(
                        "Unusual {} pattern (anomaly score {:.2}); driven by {}",
                        candidate.pattern_type,
                        score,
                        drivers.join(", ")
                    ))
                    .with_metadata("anomaly_score", score)
                    .with_metadata("source_pattern", candidate.pattern_type.as_str()),
                )
            })
            .collect()
    }

    fn build_report(
        &self,
        request: &AnalysisRequest,
        patterns: &[TheaterPattern],
        detection: &OrchestratorReport,
        validation: &ValidationResult,
    ) -> TheaterReport {
        let overall_score = patterns.iter().map(TheaterPattern::rank).fold(0.0, f64::max);
        let confidence = if patterns.is_empty() {
            1.0 - detection.confidence
        } else {
            patterns.iter().map(|p| p.confidence).sum::<f64>() / patterns.len() as f64
        };

        let mut grouped: BTreeMap<String, Vec<TheaterPattern>> = BTreeMap::new();
        for pattern in patterns {
            grouped
                .entry(pattern.pattern_type.as_str().to_string())
                .or_default()
                .push(pattern.clone());
        }

        let mut recommendations = Vec::new();
        for t in PatternType::ALL {
            if grouped.contains_key(t.as_str()) {
                if let Some(rec) = pattern_recommendation(t) {
                    recommendations.push(rec.to_string());
                }
            }
        }
        recommendations.extend(detection.recommendations.iter().cloned());
        if !validation.is_genuine {
            recommendations.extend(validation.recommendations.iter().cloned());
        }
        let mut seen = HashSet::new();
        recommendations.retain(|r| seen.insert(r.clone()));

        TheaterReport {
            status: TheaterStatus::classify(patterns.len(), overall_score),
            theater_detected: !patterns.is_empty(),
            overall_score,
            confidence: confidence.clamp(0.0, 1.0),
            pattern_count: patterns.len(),
            patterns: grouped,
            recommendations,
            detection_complete: detection.complete,
            module_name: request.module_name.clone(),
            source_commit: request.source_commit.clone(),
        }
    }
}

fn pattern_recommendation(pattern_type: PatternType) -> Option<&'static str> {
    match pattern_type {
        PatternType::MetricGaming => Some(
            "Reconcile the reported metric gains with the code that changed; re-run the metric producers on a clean checkout.",
        ),
        PatternType::CorrelationMismatch => Some(
            "Block the change: metric gains come from a change-set that is mostly cosmetic, documentation or configuration.",
        ),
        PatternType::Anomaly => Some(
            "This pattern is unlike previously recorded cases; route the change to manual review.",
        ),
        _ => None,
    }
}

impl Default for TheaterPatternAnalyzer {
    fn default() -> Self {
        Self::new(
            AnalyzerConfig::default(),
            &DetectorThresholds::default(),
            ValidationConfig::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::FileChange;

    fn config_toggle_request() -> AnalysisRequest {
        AnalysisRequest::new(
            ChangeSet::new(vec![FileChange::new(
                "config/features.toml",
                "-legacy_path = true\n+legacy_path = false",
            )]),
            MetricSnapshot::new()
                .with("complexity", 20.0)
                .with("coverage", 0.6)
                .with("maintainability", 60.0),
            MetricSnapshot::new()
                .with("complexity", 8.0)
                .with("coverage", 0.95)
                .with("maintainability", 95.0),
        )
        .with_claims(["Reduced complexity", "Improved coverage"])
    }

    #[test]
    fn test_config_toggle_is_metric_gaming() {
        let analyzer = TheaterPatternAnalyzer::default();
        let analysis = analyzer.analyze(&config_toggle_request()).unwrap();
        let report = &analysis.report;

        assert!(report.theater_detected);
        let gaming = &report.patterns["metric_gaming"][0];
        assert!(gaming.severity >= Severity::High);
        assert!(report.patterns.contains_key("correlation_mismatch"));
        assert_eq!(report.status, TheaterStatus::HighTheaterRisk);
        assert!(!analysis.validation.is_genuine);
    }

    #[test]
    fn test_patterns_are_recorded_in_history() {
        let analyzer = TheaterPatternAnalyzer::default();
        let analysis = analyzer.analyze(&config_toggle_request()).unwrap();
        assert_eq!(analyzer.history().len(), analysis.report.pattern_count);

        let again = analyzer
            .analyze(&config_toggle_request().with_description("second run"))
            .unwrap();
        let gaming = &again.report.patterns["metric_gaming"][0];
        assert_eq!(gaming.metadata["similar_prior_cases"], 1);
    }

    #[test]
    fn test_small_honest_change_is_clean() {
        let diff = (0..20)
            .map(|i| format!("+let value_{i} = compute(input_{i});"))
            .collect::<Vec<_>>()
            .join("\n");
        let request = AnalysisRequest::new(
            ChangeSet::new(vec![FileChange::new("src/pipeline.rs", diff)]),
            MetricSnapshot::new().with("coverage", 0.70),
            MetricSnapshot::new().with("coverage", 0.72),
        );
        let analysis = TheaterPatternAnalyzer::default().analyze(&request).unwrap();
        assert_eq!(analysis.report.status, TheaterStatus::Clean);
        assert!(!analysis.report.theater_detected);
    }

    #[test]
    fn test_unusual_pattern_flagged_against_history() {
        let analyzer = TheaterPatternAnalyzer::default();
        let routine: Vec<TheaterPattern> = (0..20)
            .map(|_| {
                TheaterPattern::new(PatternType::DocumentationTheater, Severity::Low, 0.55, "docs")
            })
            .collect();
        analyzer.history().record_all(&routine);

        let analysis = analyzer.analyze(&config_toggle_request()).unwrap();
        let anomalies = &analysis.report.patterns["anomaly"];
        assert!(!anomalies.is_empty());
        assert!(anomalies[0].confidence > 0.65);
    }

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "changes": [{"path": "src/a.rs", "diff": "+let x = f();"}],
            "before": {"coverage": 0.5},
            "after": {"coverage": 0.6},
            "description": "More tests",
            "claimed_improvements": ["coverage"],
            "module_name": "core"
        }"#;
        let request = AnalysisRequest::from_json(json).unwrap();
        assert_eq!(request.changes.len(), 1);
        assert_eq!(request.location(), "core");
        assert_eq!(request.claimed_improvements, vec!["coverage".to_string()]);
    }

    #[test]
    fn test_request_from_json_rejects_bad_metrics() {
        let json = r#"{"changes": [], "before": {"coverage": "high"}, "after": {}}"#;
        assert!(matches!(
            AnalysisRequest::from_json(json),
            Err(InputError::MalformedMetrics(_))
        ));
    }
}
