// Detection thresholds for the pattern detectors
//
// Every threshold is configurable; defaults are tuned so a genuine algorithmic
// change with tests never trips a detector.

use serde::{Deserialize, Serialize};

/// Thresholds shared by all detectors
///
/// # Example
/// ```
/// use veracity::detectors::DetectorThresholds;
///
/// let thresholds = DetectorThresholds::default();
/// assert_eq!(thresholds.comment_ratio_threshold, 1.0);
/// assert!(thresholds.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorThresholds {
    /// Comment lines per code line above which a file counts as inflated
    pub comment_ratio_threshold: f64,
    /// Minimum comment lines a file must add before it can be flagged
    pub min_comment_lines: usize,
    /// Minimum number of inflated files for the detector to fire
    pub min_flagged_files: usize,
    /// Change-set comment fraction above which the detector fires regardless of files
    pub flood_comment_fraction: f64,

    /// Share of changed lines explained by renames that counts as dominant
    pub rename_dominance: f64,
    /// Minimum rename pairs before the detector may fire
    pub min_renames: usize,

    /// Trivial test share above which padding is suspected
    pub trivial_ratio_threshold: f64,
    /// Absolute coverage gain considered significant
    pub significant_coverage_delta: f64,
    /// Assertions per test below which density counts as low
    pub min_assertion_density: f64,
    /// Body lines at or below which a test is trivial
    pub trivial_test_lines: usize,

    /// Micro share of optimisation lines above which work is cosmetic
    pub micro_ratio_threshold: f64,
    /// Minimum micro-optimisation lines before firing
    pub min_micro_lines: usize,
    /// Relative performance gain that makes micro-optimisations legitimate
    pub min_performance_gain: f64,

    /// Relative complexity improvement that counts as substantial
    pub complexity_drop_threshold: f64,
    /// Minimum small delegating functions before firing
    pub min_extracted_functions: usize,
    /// Body lines at or below which an extracted function is small
    pub small_function_lines: usize,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            comment_ratio_threshold: 1.0,
            min_comment_lines: 3,
            min_flagged_files: 1,
            flood_comment_fraction: 0.9,
            rename_dominance: 0.6,
            min_renames: 3,
            trivial_ratio_threshold: 0.5,
            significant_coverage_delta: 0.05,
            min_assertion_density: 1.5,
            trivial_test_lines: 3,
            micro_ratio_threshold: 0.7,
            min_micro_lines: 2,
            min_performance_gain: 0.05,
            complexity_drop_threshold: 0.2,
            min_extracted_functions: 3,
            small_function_lines: 3,
        }
    }
}

impl DetectorThresholds {
    pub fn validate(&self) -> Result<(), String> {
        let ratios = [
            ("flood_comment_fraction", self.flood_comment_fraction),
            ("rename_dominance", self.rename_dominance),
            ("trivial_ratio_threshold", self.trivial_ratio_threshold),
            ("micro_ratio_threshold", self.micro_ratio_threshold),
            ("complexity_drop_threshold", self.complexity_drop_threshold),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }

        if self.comment_ratio_threshold <= 0.0 {
            return Err(format!(
                "comment_ratio_threshold must be positive, got {}",
                self.comment_ratio_threshold
            ));
        }

        if self.min_flagged_files == 0 {
            return Err("min_flagged_files must be >= 1".to_string());
        }

        if self.significant_coverage_delta < 0.0 || self.min_performance_gain < 0.0 {
            return Err("coverage and performance thresholds must be non-negative".to_string());
        }

        Ok(())
    }
}
