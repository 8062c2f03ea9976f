//! Isolation Forest for pattern outlier detection
//!
//! Unsupervised anomaly scoring over theater-pattern feature vectors. A
//! pattern whose combination of severity, confidence, evidence volume, type and
//! metadata is unlike the recorded history isolates in fewer random splits and
//! gets a score close to 1.
//!
//! Trees are grown from a seeded RNG so the same history always yields the
//! same scores.
//!
//! # References
//!
//! Liu, F. T., Ting, K. M., & Zhou, Z. H. (2008). Isolation forest.
//! In 2008 Eighth IEEE International Conference on Data Mining (pp. 413-422).

use crate::analyzer::TheaterPattern;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Default sub-sampling size (following original paper)
const DEFAULT_SUBSAMPLE_SIZE: usize = 256;

/// Names of the pattern features, in vector order
pub const FEATURE_NAMES: [&str; 5] = [
    "severity_weight",
    "confidence",
    "log_evidence_count",
    "pattern_type",
    "log_metadata_size",
];

/// A node in an Isolation Tree
#[derive(Debug, Clone)]
enum IsolationNode {
    /// Internal node with split feature and threshold
    Internal {
        feature_idx: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    /// Leaf node with sample count (for path length calculation)
    Leaf { size: usize },
}

impl IsolationNode {
    fn path_length(&self, sample: &[f64], current_depth: usize) -> f64 {
        match self {
            IsolationNode::Internal {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                let value = sample.get(*feature_idx).copied().unwrap_or(0.0);
                if value < *threshold {
                    left.path_length(sample, current_depth + 1)
                } else {
                    right.path_length(sample, current_depth + 1)
                }
            }
            IsolationNode::Leaf { size } => {
                // Add average path length for unresolved instances
                current_depth as f64 + Self::average_path_length(*size)
            }
        }
    }

    /// Expected path length of an unsuccessful BST search over n samples
    fn average_path_length(n: usize) -> f64 {
        if n <= 1 {
            return 0.0;
        }
        // Harmonic number approximation: H(n-1) ≈ ln(n-1) + γ
        const EULER_GAMMA: f64 = 0.5772156649;
        2.0 * (((n - 1) as f64).ln() + EULER_GAMMA) - 2.0 * (n - 1) as f64 / n as f64
    }
}

/// Single Isolation Tree
#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    fn build(samples: &[Vec<f64>], max_depth: usize, rng: &mut StdRng) -> Self {
        IsolationTree {
            root: Self::build_node(samples, 0, max_depth, rng),
        }
    }

    fn build_node(
        samples: &[Vec<f64>],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> IsolationNode {
        if depth >= max_depth || samples.len() <= 1 {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        // All samples are identical - create leaf
        if samples.windows(2).all(|w| w[0] == w[1]) {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        // Only split on features that still vary
        let num_features = samples[0].len();
        let varying: Vec<(usize, f64, f64)> = (0..num_features)
            .filter_map(|idx| {
                let (min, max) = samples.iter().fold((f64::MAX, f64::MIN), |(lo, hi), s| {
                    (lo.min(s[idx]), hi.max(s[idx]))
                });
                (max - min > f64::EPSILON).then_some((idx, min, max))
            })
            .collect();

        let Some(&(feature_idx, min_val, max_val)) = varying.choose(rng) else {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        };

        let threshold = rng.gen_range(min_val..max_val);

        let (left_samples, right_samples): (Vec<Vec<f64>>, Vec<Vec<f64>>) = samples
            .iter()
            .cloned()
            .partition(|sample| sample[feature_idx] < threshold);

        if left_samples.is_empty() || right_samples.is_empty() {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        let left = Box::new(Self::build_node(&left_samples, depth + 1, max_depth, rng));
        let right = Box::new(Self::build_node(&right_samples, depth + 1, max_depth, rng));

        IsolationNode::Internal {
            feature_idx,
            threshold,
            left,
            right,
        }
    }

    fn path_length(&self, sample: &[f64]) -> f64 {
        self.root.path_length(sample, 0)
    }
}

/// Isolation Forest - ensemble of Isolation Trees
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    num_trees: usize,
    subsample_size: usize,
    /// Sub-sample size actually used by the last fit
    fitted_size: usize,
    seed: u64,
}

impl IsolationForest {
    pub fn new(num_trees: usize, subsample_size: Option<usize>, seed: u64) -> Self {
        IsolationForest {
            trees: Vec::new(),
            num_trees,
            subsample_size: subsample_size.unwrap_or(DEFAULT_SUBSAMPLE_SIZE),
            fitted_size: 0,
            seed,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fit the model on training data, replacing any previous fit
    pub fn fit(&mut self, samples: &[Vec<f64>]) {
        self.trees.clear();
        if samples.is_empty() {
            return;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = self.subsample_size.min(samples.len()).max(1);
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;

        for _ in 0..self.num_trees {
            let mut indices: Vec<usize> = (0..samples.len()).collect();
            indices.shuffle(&mut rng);
            let subsamples: Vec<Vec<f64>> = indices[..sample_size]
                .iter()
                .map(|&i| samples[i].clone())
                .collect();

            self.trees
                .push(IsolationTree::build(&subsamples, max_depth, &mut rng));
        }
        self.fitted_size = sample_size;
    }

    /// Anomaly score in [0, 1]; higher = more anomalous, ~0.5 = ordinary
    pub fn anomaly_score(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }

        let avg_path_length: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(sample))
            .sum::<f64>()
            / self.trees.len() as f64;

        let c = IsolationNode::average_path_length(self.fitted_size);
        if c <= 0.0 {
            return 0.5;
        }
        2_f64.powf(-avg_path_length / c)
    }

    pub fn is_anomaly(&self, sample: &[f64], threshold: f64) -> bool {
        self.anomaly_score(sample) > threshold
    }
}

/// Feature vector of a pattern, see [`FEATURE_NAMES`]
pub fn pattern_features(pattern: &TheaterPattern) -> Vec<f64> {
    vec![
        pattern.severity.weight(),
        pattern.confidence,
        (pattern.evidence.len() as f64).ln_1p(),
        pattern.pattern_type.index() as f64,
        (pattern.metadata.len() as f64).ln_1p(),
    ]
}

/// Features that pull a sample furthest from the training mean, in percent
pub fn feature_contributions(sample: &[f64], training: &[Vec<f64>]) -> Vec<(String, f64)> {
    if training.is_empty() {
        return Vec::new();
    }
    let n = training.len() as f64;
    let deviations: Vec<f64> = (0..sample.len())
        .map(|idx| {
            let mean = training.iter().map(|s| s[idx]).sum::<f64>() / n;
            (sample[idx] - mean).abs()
        })
        .collect();
    let total: f64 = deviations.iter().sum();

    let mut contributions: Vec<(String, f64)> = FEATURE_NAMES
        .iter()
        .zip(deviations.iter())
        .map(|(name, d)| {
            let share = if total > 0.0 { d / total * 100.0 } else { 0.0 };
            (name.to_string(), share)
        })
        .collect();
    contributions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    contributions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::PatternType;
    use crate::detectors::Severity;

    fn cluster() -> Vec<Vec<f64>> {
        (0..32)
            .map(|i| {
                let jitter = (i % 4) as f64 * 0.01;
                vec![0.5, 0.6 + jitter, 1.0, 1.0, 1.5]
            })
            .collect()
    }

    #[test]
    fn test_isolation_tree_outlier_has_shorter_path() {
        let samples = vec![vec![1.0, 2.0], vec![1.1, 2.1], vec![10.0, 20.0]];
        let mut rng = StdRng::seed_from_u64(7);
        let tree = IsolationTree::build(&samples, 10, &mut rng);
        assert!(tree.path_length(&[10.0, 20.0]) < tree.path_length(&[1.0, 2.0]));
    }

    #[test]
    fn test_forest_scores_outlier_higher() {
        let mut training = cluster();
        let outlier = vec![1.0, 1.0, 3.0, 4.0, 3.0];
        training.push(outlier.clone());

        let mut forest = IsolationForest::new(100, None, 42);
        forest.fit(&training);

        let outlier_score = forest.anomaly_score(&outlier);
        let normal_score = forest.anomaly_score(&training[0]);
        assert!(
            outlier_score > normal_score,
            "outlier {} vs normal {}",
            outlier_score,
            normal_score
        );
        assert!(outlier_score > 0.6, "outlier score {}", outlier_score);
    }

    #[test]
    fn test_seeded_forest_is_deterministic() {
        let training = cluster();
        let mut a = IsolationForest::new(50, None, 9);
        let mut b = IsolationForest::new(50, None, 9);
        a.fit(&training);
        b.fit(&training);
        let query = [0.9, 0.9, 2.0, 3.0, 2.0];
        assert_eq!(a.anomaly_score(&query), b.anomaly_score(&query));
    }

    #[test]
    fn test_unfitted_forest_scores_zero() {
        let forest = IsolationForest::new(10, None, 1);
        assert!(!forest.is_fitted());
        assert_eq!(forest.anomaly_score(&[1.0]), 0.0);
    }

    #[test]
    fn test_pattern_features() {
        let pattern = TheaterPattern::new(PatternType::MetricGaming, Severity::High, 0.8, "src")
            .with_evidence("a")
            .with_metadata("k", 1);
        let f = pattern_features(&pattern);
        assert_eq!(f.len(), FEATURE_NAMES.len());
        assert_eq!(f[0], 0.75);
        assert_eq!(f[3], 1.0);
        assert!((f[2] - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_feature_contributions_sum_to_100() {
        let contributions = feature_contributions(&[1.0, 1.0, 3.0, 4.0, 3.0], &cluster());
        let total: f64 = contributions.iter().map(|(_, v)| v).sum();
        assert!((total - 100.0).abs() < 1e-6);
        assert_eq!(contributions[0].0, "pattern_type");
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(IsolationNode::average_path_length(1), 0.0);
        let apl_10 = IsolationNode::average_path_length(10);
        assert!(apl_10 > 2.0 && apl_10 < 4.0);
    }
}
