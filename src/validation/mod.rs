// Reality validation: is a claimed improvement real?
//
// Five sequential checks over the same inputs:
//
// 1. Statistical significance of the metric delta against measurement noise
// 2. Evidence quality: what kind of code changed, and does it back the claims
// 3. Change genuineness: improvement per substantive line, superficial shapes
// 4. Behavioural validation: claimed behaviours vs the metrics that show them
// 5. Historical cross-validation against prior verdicts
//
// Checks 1-4 are combined into a weighted score; a change is genuine only
// when that score clears the threshold AND check 1 is significant AND the
// evidence and genuineness scores clear their own floors. Results are cached
// by a SHA-256 of the full input so repeat calls are idempotent.

mod behavioral;
mod config;
mod evidence_quality;
mod genuineness;
mod history;
mod statistics;

pub use behavioral::{assess_behavior, claimed_types, BehavioralCheck};
pub use config::{CheckWeights, ValidationConfig};
pub use evidence_quality::{
    assess_evidence_quality, categorize, category_lines, ClaimType, EvidenceCategory,
    EvidenceQuality,
};
pub use genuineness::{assess_genuineness, superficial_indicators, Genuineness, SuperficialIndicator};
pub use history::{HistoricalCheck, VerdictHistory, VerdictRecord};
pub use statistics::{
    assess_significance, normal_sf, stouffer, wilcoxon_signed_rank, SignificanceTest,
    StandardizedChange, TestMethod,
};

use crate::change_set::{ChangeSet, InputError};
use crate::metrics::{MetricDelta, MetricSnapshot};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Per-check sub-results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub statistical: SignificanceTest,
    pub evidence_quality: EvidenceQuality,
    pub genuineness: Genuineness,
    pub behavioral: BehavioralCheck,
    pub historical: HistoricalCheck,
    /// Weighted score of checks 1-4
    pub weighted_score: f64,
}

/// Verdict of the reality validation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_genuine: bool,
    /// Confidence in the verdict itself
    pub confidence: f64,
    /// Evidence-quality score of check 2, the one gated by `min_evidence_score`
    pub evidence_score: f64,
    /// p-value of check 1
    pub statistical_significance: f64,
    pub validation_details: ValidationDetails,
    pub recommendations: Vec<String>,
    /// SHA-256 of the inputs; also the cache key
    pub input_hash: String,
}

impl ValidationResult {
    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let d = &self.validation_details;
        let mut report = String::new();
        if self.is_genuine {
            report.push_str("✅ GENUINE IMPROVEMENT\n\n");
        } else {
            report.push_str("❌ IMPROVEMENT NOT VALIDATED\n\n");
        }
        report.push_str(&format!("Confidence: {:.2}\n", self.confidence));
        report.push_str(&format!("Weighted score: {:.3}\n", d.weighted_score));
        report.push_str(&format!(
            "Statistical: p = {:.4}, effect = {:.2}, method = {:?}{}\n",
            d.statistical.p_value,
            d.statistical.effect_size,
            d.statistical.method,
            if d.statistical.significant { " (significant)" } else { "" }
        ));
        report.push_str(&format!("Evidence quality: {:.3}\n", d.evidence_quality.score));
        report.push_str(&format!("Genuineness: {:.3}\n", d.genuineness.score));
        report.push_str(&format!("Behavioural: {:.3}\n", d.behavioral.score));
        report.push_str(&format!(
            "History: {} similar of {} prior cases\n",
            d.historical.similar_cases, d.historical.history_size
        ));
        if !self.recommendations.is_empty() {
            report.push_str("\nRecommendations:\n");
            for rec in &self.recommendations {
                report.push_str(&format!("  - {}\n", rec));
            }
        }
        report
    }
}

#[derive(Debug, Default)]
struct ResultCache {
    entries: HashMap<String, ValidationResult>,
    order: VecDeque<String>,
}

impl ResultCache {
    fn get(&self, key: &str) -> Option<ValidationResult> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, result: ValidationResult, capacity: usize) {
        if self.entries.contains_key(&key) {
            return;
        }
        while self.order.len() >= capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, result);
    }
}

/// SHA-256 over the canonical JSON of all validation inputs
pub fn input_hash(
    before: &MetricSnapshot,
    after: &MetricSnapshot,
    changes: &ChangeSet,
    claims: &[String],
    description: &str,
) -> Result<String, InputError> {
    let canonical = serde_json::to_vec(&(before, after, changes, claims, description))
        .map_err(|e| InputError::MalformedRequest(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// The reality validation engine
#[derive(Debug)]
pub struct RealityValidator {
    config: ValidationConfig,
    history: Arc<VerdictHistory>,
    cache: Mutex<ResultCache>,
}

impl RealityValidator {
    pub fn new(config: ValidationConfig) -> Self {
        let history = Arc::new(VerdictHistory::new(config.history_capacity));
        Self::with_history(config, history)
    }

    /// Share a history store between validators
    pub fn with_history(config: ValidationConfig, history: Arc<VerdictHistory>) -> Self {
        Self {
            config,
            history,
            cache: Mutex::new(ResultCache::default()),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<VerdictHistory> {
        &self.history
    }

    /// Validate a claimed improvement
    ///
    /// Fails only on malformed input. Identical inputs return the cached
    /// result without touching the history.
    pub fn validate(
        &self,
        before: &MetricSnapshot,
        after: &MetricSnapshot,
        changes: &ChangeSet,
        claims: &[String],
        description: &str,
    ) -> Result<ValidationResult, InputError> {
        before.validate()?;
        after.validate()?;

        let key = input_hash(before, after, changes, claims, description)?;
        if let Some(hit) = self.lock_cache().get(&key) {
            tracing::debug!(input_hash = %key, "validation cache hit");
            return Ok(hit);
        }

        let delta = MetricDelta::between(before, after);
        let result = self.evaluate(&delta, changes, claims, description, key.clone());

        self.history.record(VerdictRecord {
            improvements: delta.improvement_vector(),
            claims: claimed_types(description, claims),
            is_genuine: result.is_genuine,
        });
        self.lock_cache()
            .insert(key, result.clone(), self.config.cache_capacity);

        Ok(result)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ResultCache> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn evaluate(
        &self,
        delta: &MetricDelta,
        changes: &ChangeSet,
        claims: &[String],
        description: &str,
        input_hash: String,
    ) -> ValidationResult {
        let c = &self.config;

        let statistical = assess_significance(delta, c);
        let evidence_quality = assess_evidence_quality(changes, claims);
        let genuineness = assess_genuineness(changes, delta, c);
        let behavioral = assess_behavior(description, claims, delta);

        let query = VerdictRecord {
            improvements: delta.improvement_vector(),
            claims: claimed_types(description, claims),
            is_genuine: false,
        };
        let historical = self.history.cross_validate(
            &query,
            c.history_similarity_threshold,
            c.history_min_cases,
            c.history_genuine_share,
            c.history_confidence_boost,
        );

        let w = &c.weights;
        let weighted_score = w.statistical * statistical.confidence
            + w.evidence_quality * evidence_quality.score
            + w.genuineness * genuineness.score
            + w.behavioral * behavioral.score;

        let is_genuine = weighted_score > c.evidence_weight_threshold
            && statistical.significant
            && evidence_quality.score >= c.min_evidence_score
            && genuineness.score >= c.min_genuineness_score;

        let mut confidence = if is_genuine {
            weighted_score + historical.confidence_boost
        } else {
            1.0 - weighted_score
        };
        confidence = confidence.clamp(0.0, 1.0);

        let mut recommendations = Vec::new();
        if !statistical.significant {
            recommendations.push(format!(
                "Metric changes are not distinguishable from measurement noise (p = {:.3}, effect = {:.2}); collect more measurements before claiming an improvement.",
                statistical.p_value, statistical.effect_size
            ));
        }
        if evidence_quality.score < c.min_evidence_score {
            recommendations.push(
                "Change composition does not support the claimed improvements; most changed lines are low-impact categories.".to_string(),
            );
        }
        for claim in &evidence_quality.unsupported_claims {
            recommendations.push(format!("Claim not backed by the changed code: {}", claim));
        }
        if genuineness.score < c.min_genuineness_score {
            recommendations.push(format!(
                "Improvement of {:.1} points from {} substantive lines is implausible; verify the metric source.",
                genuineness.total_improvement_points, genuineness.substantive_lines
            ));
        }
        for claim in &behavioral.unsupported {
            recommendations.push(format!(
                "No {} metric improved; add measurements that back the {} claim.",
                claim.as_str(),
                claim.as_str()
            ));
        }

        tracing::info!(
            is_genuine,
            weighted_score,
            confidence,
            p_value = statistical.p_value,
            "reality validation verdict"
        );

        ValidationResult {
            is_genuine,
            confidence,
            evidence_score: evidence_quality.score,
            statistical_significance: statistical.p_value,
            validation_details: ValidationDetails {
                statistical,
                evidence_quality,
                genuineness,
                behavioral,
                historical,
                weighted_score,
            },
            recommendations,
            input_hash,
        }
    }
}

impl Default for RealityValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests;
