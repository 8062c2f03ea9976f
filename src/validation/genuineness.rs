// Check 3: change genuineness
//
// Compares how much the metrics moved with how much substantive code changed.
// Large improvements from a handful of lines are implausible; superficial
// diff shapes each cost a fixed penalty.

use crate::change_set::{is_whitespace_only_diff, ChangeCategory, ChangeSet};
use crate::detectors::{Detector, DetectorThresholds, VariableRenamingDetector};
use crate::metrics::MetricDelta;
use crate::validation::config::ValidationConfig;
use crate::validation::evidence_quality::category_lines;
use serde::{Deserialize, Serialize};

/// Diff shapes that suggest the change is superficial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuperficialIndicator {
    CosmeticOnly,
    WhitespaceOnly,
    PureRename,
    CommentDominated,
}

/// Outcome of check 3
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genuineness {
    pub score: f64,
    pub base_score: f64,
    /// Percentage points of improvement per substantive line
    pub efficiency: f64,
    pub substantive_lines: usize,
    pub total_improvement_points: f64,
    pub indicators: Vec<SuperficialIndicator>,
}

/// Superficial indicators present in a change-set
pub fn superficial_indicators(changes: &ChangeSet) -> Vec<SuperficialIndicator> {
    let mut indicators = Vec::new();
    if changes.is_empty() {
        return indicators;
    }

    if changes
        .iter()
        .all(|c| matches!(c.category, ChangeCategory::Cosmetic | ChangeCategory::Documentation))
    {
        indicators.push(SuperficialIndicator::CosmeticOnly);
    }

    if changes.iter().all(|c| is_whitespace_only_diff(&c.diff)) {
        indicators.push(SuperficialIndicator::WhitespaceOnly);
    }

    let renaming = VariableRenamingDetector::new(DetectorThresholds::default());
    if let Ok(result) = renaming.detect(changes, &MetricDelta::default()) {
        if result.theater_detected {
            indicators.push(SuperficialIndicator::PureRename);
        }
    }

    let comments: usize = changes.iter().map(|c| c.added_comment_lines()).sum();
    let code: usize = changes.iter().map(|c| c.added_code_lines()).sum();
    if comments >= 3 && comments > code {
        indicators.push(SuperficialIndicator::CommentDominated);
    }

    indicators
}

pub fn assess_genuineness(
    changes: &ChangeSet,
    delta: &MetricDelta,
    config: &ValidationConfig,
) -> Genuineness {
    let substantive_lines: usize = category_lines(changes)
        .iter()
        .filter(|(cat, _)| cat.is_substantive())
        .map(|(_, n)| *n)
        .sum();
    let total_improvement_points = delta.total_positive_improvement() * 100.0;

    let (base_score, efficiency) = if total_improvement_points <= 0.0 {
        (0.5, 0.0)
    } else if substantive_lines == 0 {
        (0.2, f64::INFINITY)
    } else {
        let efficiency = total_improvement_points / substantive_lines as f64;
        let base = if efficiency <= config.plausible_efficiency {
            1.0
        } else {
            config.plausible_efficiency / efficiency
        };
        (base, efficiency)
    };

    let indicators = superficial_indicators(changes);
    let score =
        (base_score - config.superficial_penalty * indicators.len() as f64).clamp(0.0, 1.0);

    tracing::debug!(
        score,
        efficiency,
        substantive_lines,
        indicators = indicators.len(),
        "genuineness check"
    );

    Genuineness {
        score,
        base_score,
        // JSON has no infinity
        efficiency: if efficiency.is_finite() { efficiency } else { f64::MAX },
        substantive_lines,
        total_improvement_points,
        indicators,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::FileChange;
    use crate::metrics::MetricSnapshot;

    fn delta(before: f64, after: f64) -> MetricDelta {
        MetricDelta::between(
            &MetricSnapshot::new().with("coverage", before),
            &MetricSnapshot::new().with("coverage", after),
        )
    }

    fn structural(lines: usize) -> ChangeSet {
        let diff = (0..lines)
            .map(|i| format!("+let value_{i} = compute(input_{i});"))
            .collect::<Vec<_>>()
            .join("\n");
        ChangeSet::new(vec![FileChange::new("src/a.rs", diff)])
    }

    #[test]
    fn test_plausible_efficiency_scores_full() {
        // 10% improvement over 20 lines = 0.5 points per line
        let g = assess_genuineness(&structural(20), &delta(0.5, 0.55), &ValidationConfig::default());
        assert_eq!(g.base_score, 1.0);
        assert_eq!(g.score, 1.0);
        assert!(g.indicators.is_empty());
    }

    #[test]
    fn test_implausible_efficiency_decays() {
        // 100% improvement over 2 lines = 50 points per line
        let g = assess_genuineness(&structural(2), &delta(0.4, 0.8), &ValidationConfig::default());
        assert!((g.base_score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_improvement_without_substance() {
        let changes = ChangeSet::new(vec![FileChange::new("config/app.toml", "-a = 1\n+a = 2")]);
        let g = assess_genuineness(&changes, &delta(0.6, 0.95), &ValidationConfig::default());
        assert_eq!(g.base_score, 0.2);
        assert_eq!(g.substantive_lines, 0);
    }

    #[test]
    fn test_nothing_improved_is_neutral() {
        let g = assess_genuineness(&structural(5), &delta(0.5, 0.5), &ValidationConfig::default());
        assert_eq!(g.base_score, 0.5);
    }

    #[test]
    fn test_superficial_penalties_stack() {
        let changes = ChangeSet::new(vec![FileChange::new(
            "src/a.rs",
            "+// explains a\n+// explains b\n+// explains c\n+// explains d",
        )]);
        let indicators = superficial_indicators(&changes);
        assert!(indicators.contains(&SuperficialIndicator::CosmeticOnly));
        assert!(indicators.contains(&SuperficialIndicator::CommentDominated));

        let g = assess_genuineness(&changes, &delta(0.5, 0.5), &ValidationConfig::default());
        assert!((g.score - (0.5 - 0.2 * indicators.len() as f64)).abs() < 1e-9);
    }

    #[test]
    fn test_whitespace_only() {
        let changes = ChangeSet::new(vec![FileChange::new("src/a.rs", "-let a=f(x);\n+let a = f(x);")]);
        let indicators = superficial_indicators(&changes);
        assert!(indicators.contains(&SuperficialIndicator::WhitespaceOnly));
        assert!(indicators.contains(&SuperficialIndicator::CosmeticOnly));
    }
}
