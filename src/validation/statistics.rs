// Statistical significance of a metric delta
//
// A change-set yields one before/after pair per metric, so the "samples" of
// the paired tests are the metrics themselves. Each change is standardised by
// a noise scale first so that metrics with different units are comparable and
// direction-aligned (positive = improvement).
//
// - Paired t-test (aprender `ttest_rel`) on the standardised vectors
// - Exact Wilcoxon signed-rank as a distribution-free confirmation
//   (normal approximation above 20 samples)
// - Effect size = mean standardised change / sd, sd floored at one noise unit
//   (trueno vector statistics)
// - Too few changed metrics or degenerate variance: Stouffer combined z-test
//   with reduced confidence

use crate::metrics::MetricDelta;
use crate::validation::config::ValidationConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use trueno::Vector;

/// Exact Wilcoxon distribution is enumerated up to this many samples
const WILCOXON_EXACT_LIMIT: usize = 20;

/// Which test produced the p-value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    PairedT,
    StoufferZ,
    /// No metric moved; nothing to test
    NoChange,
}

/// A metric change expressed in noise units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedChange {
    pub metric: String,
    pub before: f64,
    pub after: f64,
    /// `after - before`, positive = improvement
    pub z: f64,
}

/// Outcome of check 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceTest {
    pub method: TestMethod,
    pub samples: usize,
    /// One-sided p-value for "the change is an improvement"
    pub p_value: f64,
    pub statistic: f64,
    pub mean_change: f64,
    pub effect_size: f64,
    pub wilcoxon_p: Option<f64>,
    /// False when the Wilcoxon test could have confirmed but did not
    pub confirmed: bool,
    pub significant: bool,
    /// Check score in [0, 1]
    pub confidence: f64,
    pub fallback_reason: Option<String>,
}

/// Standardise every changed metric by its noise scale
pub fn standardize(delta: &MetricDelta, config: &ValidationConfig) -> Vec<StandardizedChange> {
    delta
        .changes
        .iter()
        .filter(|(_, c)| c.is_changed())
        .map(|(name, c)| {
            let noise = config.noise_scale(name, c.before, c.after);
            let sign = c.direction.sign();
            let before = sign * c.before / noise;
            let after = sign * c.after / noise;
            StandardizedChange {
                metric: name.clone(),
                before,
                after,
                z: after - before,
            }
        })
        .collect()
}

/// Paired t-test via aprender; returns (statistic, two-sided p)
pub fn paired_t_test(before: &[f64], after: &[f64]) -> Result<(f64, f64)> {
    if before.len() != after.len() {
        anyhow::bail!("Paired samples must have equal length");
    }
    if before.len() < 2 {
        anyhow::bail!("Need at least 2 pairs for a paired t-test");
    }

    let before: Vec<f32> = before.iter().map(|v| *v as f32).collect();
    let after: Vec<f32> = after.iter().map(|v| *v as f32).collect();

    let result = aprender::stats::hypothesis::ttest_rel(&after, &before)
        .context("Failed to compute paired t-test")?;

    let statistic = f64::from(result.statistic);
    let pvalue = f64::from(result.pvalue);
    if !statistic.is_finite() || !pvalue.is_finite() {
        anyhow::bail!("Paired t-test is degenerate (zero variance of differences)");
    }
    Ok((statistic, pvalue))
}

/// Standardised mean difference, sd floored at one noise unit
pub fn effect_size(diffs: &[f64]) -> Result<f64> {
    if diffs.is_empty() {
        anyhow::bail!("Cannot compute effect size of an empty sample");
    }
    let values: Vec<f32> = diffs.iter().map(|v| *v as f32).collect();
    let v = Vector::from_slice(&values);
    let mean = v.mean().context("Failed to compute mean change")?;
    let sd = v.stddev().context("Failed to compute change deviation")?;
    Ok(f64::from(mean) / f64::from(sd).max(1.0))
}

/// One-sided Wilcoxon signed-rank p-value for "differences are positive"
///
/// Zero differences are dropped; tied magnitudes get average ranks. Exact
/// enumeration up to 20 samples, normal approximation above.
pub fn wilcoxon_signed_rank(diffs: &[f64]) -> Option<f64> {
    let mut nonzero: Vec<f64> = diffs.iter().copied().filter(|d| *d != 0.0 && d.is_finite()).collect();
    let n = nonzero.len();
    if n == 0 {
        return None;
    }
    nonzero.sort_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap_or(std::cmp::Ordering::Equal));

    // Doubled average ranks keep tied ranks integral
    let mut doubled_ranks = vec![0usize; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && nonzero[j + 1].abs() == nonzero[i].abs() {
            j += 1;
        }
        // ranks i+1..=j+1, doubled average = (i+1)+(j+1)
        let doubled = i + j + 2;
        for rank in doubled_ranks.iter_mut().take(j + 1).skip(i) {
            *rank = doubled;
        }
        i = j + 1;
    }

    let observed: usize = nonzero
        .iter()
        .zip(&doubled_ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| *r)
        .sum();

    if n > WILCOXON_EXACT_LIMIT {
        let nf = n as f64;
        let mean = nf * (nf + 1.0) / 4.0;
        let sd = (nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0).sqrt();
        let w = observed as f64 / 2.0;
        let z = (w - mean - 0.5) / sd;
        return Some(normal_sf(z));
    }

    // counts[s] = number of sign assignments with doubled rank sum s
    let max_sum: usize = doubled_ranks.iter().sum();
    let mut counts = vec![0u64; max_sum + 1];
    counts[0] = 1;
    for &rank in &doubled_ranks {
        for s in (rank..=max_sum).rev() {
            counts[s] += counts[s - rank];
        }
    }
    let total = 2f64.powi(n as i32);
    let at_least: u64 = counts[observed..].iter().sum();
    Some(at_least as f64 / total)
}

/// Stouffer combined z; returns (Z, one-sided p)
pub fn stouffer(z: &[f64]) -> (f64, f64) {
    if z.is_empty() {
        return (0.0, 1.0);
    }
    let combined = z.iter().sum::<f64>() / (z.len() as f64).sqrt();
    (combined, normal_sf(combined))
}

/// Upper tail of the standard normal
pub fn normal_sf(z: f64) -> f64 {
    0.5 * erfc(z / std::f64::consts::SQRT_2)
}

// Complementary error function, fractional error < 1.2e-7
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let r = t * (-z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77)))))))))
        .exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}

/// Check 1: is the metric improvement statistically distinguishable from noise?
pub fn assess_significance(delta: &MetricDelta, config: &ValidationConfig) -> SignificanceTest {
    let changes = standardize(delta, config);
    let samples = changes.len();

    if samples == 0 {
        return SignificanceTest {
            method: TestMethod::NoChange,
            samples,
            p_value: 1.0,
            statistic: 0.0,
            mean_change: 0.0,
            effect_size: 0.0,
            wilcoxon_p: None,
            confirmed: false,
            significant: false,
            confidence: 0.0,
            fallback_reason: Some("no metric changed".to_string()),
        };
    }

    let z: Vec<f64> = changes.iter().map(|c| c.z).collect();
    let mean_change = z.iter().sum::<f64>() / samples as f64;
    let effect = effect_size(&z).unwrap_or_else(|e| {
        tracing::warn!("Effect size unavailable, using mean change: {}", e);
        mean_change
    });

    let paired = if samples >= config.min_paired_samples {
        let before: Vec<f64> = changes.iter().map(|c| c.before).collect();
        let after: Vec<f64> = changes.iter().map(|c| c.after).collect();
        paired_t_test(&before, &after).map_err(|e| e.to_string())
    } else {
        Err(format!(
            "{} changed metrics, {} needed for paired tests",
            samples, config.min_paired_samples
        ))
    };

    let (method, statistic, p_value, wilcoxon_p, confirmed, fallback_reason) = match paired {
        Ok((t, two_sided)) => {
            let one_sided = if mean_change > 0.0 {
                two_sided / 2.0
            } else {
                1.0 - two_sided / 2.0
            };
            let wilcoxon_p = wilcoxon_signed_rank(&z);
            // Only meaningful once the smallest attainable p is below alpha
            let can_confirm = 0.5f64.powi(samples as i32) < config.significance_level;
            let confirmed = match wilcoxon_p {
                Some(p) if can_confirm => p < config.significance_level,
                _ => true,
            };
            (TestMethod::PairedT, t, one_sided, wilcoxon_p, confirmed, None)
        }
        Err(reason) => {
            tracing::warn!("Falling back to combined z-test: {}", reason);
            let (combined, p) = stouffer(&z);
            (TestMethod::StoufferZ, combined, p, None, true, Some(reason))
        }
    };

    let significant = p_value < config.significance_level
        && effect >= config.min_effect_size
        && mean_change > 0.0;

    let mut confidence = if mean_change > 0.0 {
        let effect_ratio = if config.min_effect_size > 0.0 {
            (effect / config.min_effect_size).clamp(0.0, 1.0)
        } else {
            1.0
        };
        (1.0 - p_value).clamp(0.0, 1.0) * effect_ratio
    } else {
        0.0
    };
    if method == TestMethod::StoufferZ || !confirmed {
        confidence *= config.fallback_confidence_factor;
    }

    tracing::debug!(
        ?method,
        samples,
        p_value,
        effect,
        significant,
        "statistical significance check"
    );

    SignificanceTest {
        method,
        samples,
        p_value,
        statistic,
        mean_change,
        effect_size: effect,
        wilcoxon_p,
        confirmed,
        significant,
        confidence,
        fallback_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricSnapshot;

    fn delta(pairs: &[(&str, f64, f64)]) -> MetricDelta {
        let mut before = MetricSnapshot::new();
        let mut after = MetricSnapshot::new();
        for (name, b, a) in pairs {
            before.insert(*name, *b);
            after.insert(*name, *a);
        }
        MetricDelta::between(&before, &after)
    }

    #[test]
    fn test_normal_sf() {
        assert!((normal_sf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_sf(1.96) - 0.025).abs() < 1e-3);
        assert!((normal_sf(-1.96) - 0.975).abs() < 1e-3);
    }

    #[test]
    fn test_standardize_aligns_direction() {
        let d = delta(&[("complexity", 20.0, 8.0), ("coverage", 0.6, 0.5)]);
        let z = standardize(&d, &ValidationConfig::default());
        let complexity = z.iter().find(|c| c.metric == "complexity").unwrap();
        let coverage = z.iter().find(|c| c.metric == "coverage").unwrap();
        assert!(complexity.z > 0.0);
        assert!(coverage.z < 0.0);
        assert!((complexity.z - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_wilcoxon_exact_all_positive() {
        // All 5 positive: only one of 32 sign assignments reaches the max sum
        let p = wilcoxon_signed_rank(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!((p - 1.0 / 32.0).abs() < 1e-12);
    }

    #[test]
    fn test_wilcoxon_mixed_signs() {
        let p = wilcoxon_signed_rank(&[1.0, -2.0, 3.0, -4.0]).unwrap();
        assert!(p > 0.3);
        assert!(wilcoxon_signed_rank(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_wilcoxon_handles_ties() {
        let p = wilcoxon_signed_rank(&[2.0, 2.0, -2.0]).unwrap();
        assert!(p > 0.0 && p <= 1.0);
    }

    #[test]
    fn test_stouffer() {
        let (z, p) = stouffer(&[2.0, 2.0]);
        assert!((z - 4.0 / 2f64.sqrt()).abs() < 1e-12);
        assert!(p < 0.01);
        assert_eq!(stouffer(&[]), (0.0, 1.0));
    }

    #[test]
    fn test_effect_size_floors_sd() {
        // Identical changes: sd 0 is floored at 1
        let e = effect_size(&[3.0, 3.0, 3.0]).unwrap();
        assert!((e - 3.0).abs() < 1e-4);
        assert!(effect_size(&[]).is_err());
    }

    #[test]
    fn test_no_change_is_not_significant() {
        let result = assess_significance(&delta(&[("coverage", 0.5, 0.5)]), &ValidationConfig::default());
        assert_eq!(result.method, TestMethod::NoChange);
        assert!(!result.significant);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_few_metrics_fall_back_with_reduced_confidence() {
        let d = delta(&[("coverage", 0.6, 0.8), ("test_count", 40.0, 48.0)]);
        let result = assess_significance(&d, &ValidationConfig::default());
        assert_eq!(result.method, TestMethod::StoufferZ);
        assert!(result.significant);
        assert!(result.confidence <= 0.8 + 1e-12);
        assert!(result.fallback_reason.is_some());
    }

    #[test]
    fn test_large_consistent_improvement_uses_paired_test() {
        let d = delta(&[
            ("complexity", 20.0, 8.0),
            ("coverage", 0.6, 0.95),
            ("maintainability", 60.0, 95.0),
        ]);
        let result = assess_significance(&d, &ValidationConfig::default());
        assert_eq!(result.method, TestMethod::PairedT);
        assert!(result.p_value < 0.05, "p = {}", result.p_value);
        assert!(result.significant);
    }

    #[test]
    fn test_regression_is_never_significant() {
        let d = delta(&[
            ("coverage", 0.9, 0.5),
            ("maintainability", 90.0, 50.0),
            ("complexity", 5.0, 15.0),
        ]);
        let result = assess_significance(&d, &ValidationConfig::default());
        assert!(!result.significant);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_noise_sized_changes_are_not_significant() {
        let d = delta(&[("coverage", 0.800, 0.801), ("maintainability", 70.0, 70.1)]);
        let result = assess_significance(&d, &ValidationConfig::default());
        assert!(!result.significant, "{:?}", result);
    }
}
