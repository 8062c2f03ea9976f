// Configuration for reality validation
//
// Every threshold of the five checks lives here so deployments can tune the
// engine from TOML without touching code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weights of checks 1-4 in the final score; must sum to 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckWeights {
    pub statistical: f64,
    pub evidence_quality: f64,
    pub genuineness: f64,
    pub behavioral: f64,
}

impl Default for CheckWeights {
    fn default() -> Self {
        Self {
            statistical: 0.3,
            evidence_quality: 0.25,
            genuineness: 0.25,
            behavioral: 0.2,
        }
    }
}

impl CheckWeights {
    pub fn sum(&self) -> f64 {
        self.statistical + self.evidence_quality + self.genuineness + self.behavioral
    }
}

/// Configuration for the reality validation engine
///
/// # Example
/// ```
/// use veracity::validation::ValidationConfig;
///
/// let config = ValidationConfig::default();
/// assert_eq!(config.significance_level, 0.05);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Alpha for the significance tests
    pub significance_level: f64,

    /// Minimum standardised effect size (mean change / sd of changes)
    pub min_effect_size: f64,

    /// Changed metrics needed before the paired tests are used
    ///
    /// Below this the engine falls back to a combined z-test.
    pub min_paired_samples: usize,

    /// Measurement noise as a fraction of the metric magnitude
    pub relative_noise: f64,

    /// Smallest noise scale used to standardise a change
    pub noise_floor: f64,

    /// Absolute noise scale per metric name, overriding `relative_noise`
    pub noise_overrides: BTreeMap<String, f64>,

    /// Confidence multiplier applied when the fallback test is used
    pub fallback_confidence_factor: f64,

    pub weights: CheckWeights,

    /// Weighted score of checks 1-4 must exceed this
    pub evidence_weight_threshold: f64,

    /// Evidence-quality score required for a genuine verdict
    pub min_evidence_score: f64,

    /// Genuineness score required for a genuine verdict
    pub min_genuineness_score: f64,

    /// Percentage points of improvement per substantive line still considered plausible
    pub plausible_efficiency: f64,

    /// Deduction per superficial indicator in the genuineness check
    pub superficial_penalty: f64,

    /// Prior verdicts kept for historical cross-validation
    pub history_capacity: usize,

    /// Similarity above which a prior case counts as "similar"
    pub history_similarity_threshold: f64,

    /// Similar prior cases required before history adjusts confidence
    pub history_min_cases: usize,

    /// Genuine share among similar cases required for the boost
    pub history_genuine_share: f64,

    pub history_confidence_boost: f64,

    /// Cached validation results
    pub cache_capacity: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            min_effect_size: 0.5,
            min_paired_samples: 3,
            relative_noise: 0.02,
            noise_floor: 1e-3,
            noise_overrides: BTreeMap::new(),
            fallback_confidence_factor: 0.8,
            weights: CheckWeights::default(),
            evidence_weight_threshold: 0.6,
            min_evidence_score: 0.6,
            min_genuineness_score: 0.5,
            plausible_efficiency: 5.0,
            superficial_penalty: 0.2,
            history_capacity: 1000,
            history_similarity_threshold: 0.7,
            history_min_cases: 3,
            history_genuine_share: 0.7,
            history_confidence_boost: 0.1,
            cache_capacity: 1024,
        }
    }
}

impl ValidationConfig {
    /// Fewer false "genuine" verdicts
    pub fn strict() -> Self {
        Self {
            significance_level: 0.01,
            min_effect_size: 0.8,
            evidence_weight_threshold: 0.7,
            min_evidence_score: 0.7,
            min_genuineness_score: 0.6,
            plausible_efficiency: 3.0,
            ..Self::default()
        }
    }

    /// Accept more changes as genuine
    pub fn permissive() -> Self {
        Self {
            significance_level: 0.10,
            min_effect_size: 0.3,
            evidence_weight_threshold: 0.5,
            min_evidence_score: 0.5,
            min_genuineness_score: 0.4,
            plausible_efficiency: 10.0,
            ..Self::default()
        }
    }

    /// Noise scale used to standardise a change of `name`
    pub fn noise_scale(&self, name: &str, before: f64, after: f64) -> f64 {
        if let Some(&scale) = self.noise_overrides.get(name) {
            return scale.max(self.noise_floor);
        }
        (self.relative_noise * before.abs().max(after.abs())).max(self.noise_floor)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.significance_level) {
            return Err(format!(
                "significance_level must be in [0, 1], got {}",
                self.significance_level
            ));
        }

        if self.min_effect_size < 0.0 {
            return Err(format!(
                "min_effect_size must be non-negative, got {}",
                self.min_effect_size
            ));
        }

        if self.min_paired_samples < 2 {
            return Err(format!(
                "min_paired_samples must be >= 2 for a paired test, got {}",
                self.min_paired_samples
            ));
        }

        if self.relative_noise <= 0.0 || self.noise_floor <= 0.0 {
            return Err("relative_noise and noise_floor must be positive".to_string());
        }

        if let Some((name, scale)) = self.noise_overrides.iter().find(|(_, s)| **s <= 0.0) {
            return Err(format!("noise override for '{}' must be positive, got {}", name, scale));
        }

        let weights = [
            self.weights.statistical,
            self.weights.evidence_quality,
            self.weights.genuineness,
            self.weights.behavioral,
        ];
        if weights.iter().any(|w| *w < 0.0) {
            return Err("check weights must be non-negative".to_string());
        }
        if (self.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(format!("check weights must sum to 1, got {}", self.weights.sum()));
        }

        for (name, value) in [
            ("fallback_confidence_factor", self.fallback_confidence_factor),
            ("evidence_weight_threshold", self.evidence_weight_threshold),
            ("min_evidence_score", self.min_evidence_score),
            ("min_genuineness_score", self.min_genuineness_score),
            ("superficial_penalty", self.superficial_penalty),
            ("history_similarity_threshold", self.history_similarity_threshold),
            ("history_genuine_share", self.history_genuine_share),
            ("history_confidence_boost", self.history_confidence_boost),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }

        if self.plausible_efficiency <= 0.0 {
            return Err(format!(
                "plausible_efficiency must be positive, got {}",
                self.plausible_efficiency
            ));
        }

        if self.cache_capacity == 0 || self.history_capacity == 0 {
            return Err("cache_capacity and history_capacity must be >= 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ValidationConfig::default();
        assert_eq!(config.significance_level, 0.05);
        assert_eq!(config.min_effect_size, 0.5);
        assert_eq!(config.cache_capacity, 1024);
        assert!((config.weights.sum() - 1.0).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        let strict = ValidationConfig::strict();
        let permissive = ValidationConfig::permissive();
        assert!(strict.validate().is_ok());
        assert!(permissive.validate().is_ok());
        assert!(strict.significance_level < permissive.significance_level);
        assert!(strict.evidence_weight_threshold > permissive.evidence_weight_threshold);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = ValidationConfig::default();
        config.weights.behavioral = 0.5;
        assert!(config.validate().unwrap_err().contains("sum to 1"));
    }

    #[test]
    fn test_invalid_significance() {
        let config = ValidationConfig {
            significance_level: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_noise_scale() {
        let mut config = ValidationConfig::default();
        assert!((config.noise_scale("complexity", 20.0, 8.0) - 0.4).abs() < 1e-12);
        assert_eq!(config.noise_scale("flag", 0.0, 0.0), config.noise_floor);
        config.noise_overrides.insert("complexity".to_string(), 2.0);
        assert_eq!(config.noise_scale("complexity", 20.0, 8.0), 2.0);
    }
}
