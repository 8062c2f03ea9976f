//! Metric snapshots and the Metric Delta Analyzer
//!
//! Snapshots are flat `name → value` maps supplied by external metric
//! producers (coverage tools, complexity analyzers, security scanners).
//! [`MetricDelta::between`] is a pure function: it never stores anything and
//! the same pair of snapshots always yields the same delta.
//!
//! Improvement ratios are directional: for metrics where lower is better
//! (complexity, technical debt, duplication, latency, violations) a decrease
//! counts as a positive improvement.

use crate::change_set::InputError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Denominator floor for relative changes on near-zero baselines
const RELATIVE_EPSILON: f64 = 1e-9;

/// Name fragments of metrics where a smaller value is an improvement
const LOWER_IS_BETTER: &[&str] = &["complexity", "debt", "duplication", "latency", "violation"];

/// Named numeric quality metrics at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSnapshot {
    values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Parse a flat JSON object of numbers, rejecting NaN/infinite values
    pub fn from_json(input: &str) -> Result<Self, InputError> {
        let value: serde_json::Value =
            serde_json::from_str(input).map_err(|e| InputError::MalformedMetrics(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, InputError> {
        let values: BTreeMap<String, f64> = serde_json::from_value(value)
            .map_err(|e| InputError::MalformedMetrics(e.to_string()))?;
        let snapshot = Self { values };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        for (name, value) in &self.values {
            if !value.is_finite() {
                return Err(InputError::NonFiniteMetric {
                    name: name.clone(),
                    value: *value,
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Which direction counts as an improvement for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
}

impl MetricDirection {
    pub fn for_metric(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if LOWER_IS_BETTER.iter().any(|frag| lower.contains(frag)) {
            MetricDirection::LowerIsBetter
        } else {
            MetricDirection::HigherIsBetter
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            MetricDirection::HigherIsBetter => 1.0,
            MetricDirection::LowerIsBetter => -1.0,
        }
    }
}

/// Before/after comparison of a single metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricChange {
    pub before: f64,
    pub after: f64,
    pub delta: f64,
    /// Directional relative change, clipped to [-1, 1]
    pub improvement: f64,
    pub direction: MetricDirection,
}

impl MetricChange {
    pub fn new(name: &str, before: f64, after: f64) -> Self {
        let direction = MetricDirection::for_metric(name);
        let delta = after - before;
        let improvement =
            (direction.sign() * delta / before.abs().max(RELATIVE_EPSILON)).clamp(-1.0, 1.0);
        Self {
            before,
            after,
            delta,
            improvement,
            direction,
        }
    }

    pub fn is_changed(&self) -> bool {
        self.delta.abs() > f64::EPSILON
    }
}

/// Derived per-metric deltas between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub changes: BTreeMap<String, MetricChange>,
    /// Metrics present only in the before snapshot
    pub missing_after: Vec<String>,
    /// Metrics present only in the after snapshot
    pub missing_before: Vec<String>,
}

impl MetricDelta {
    /// Compute deltas over the metrics both snapshots share
    pub fn between(before: &MetricSnapshot, after: &MetricSnapshot) -> Self {
        let mut changes = BTreeMap::new();
        let mut missing_after = Vec::new();

        for (name, &b) in before.iter() {
            match after.get(name) {
                Some(a) => {
                    changes.insert(name.clone(), MetricChange::new(name, b, a));
                }
                None => missing_after.push(name.clone()),
            }
        }

        let missing_before = after
            .iter()
            .filter(|(name, _)| before.get(name).is_none())
            .map(|(name, _)| name.clone())
            .collect();

        Self {
            changes,
            missing_after,
            missing_before,
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricChange> {
        self.changes.get(name)
    }

    /// First metric whose name contains `fragment` (case-insensitive)
    pub fn find(&self, fragment: &str) -> Option<&MetricChange> {
        let fragment = fragment.to_ascii_lowercase();
        self.changes
            .iter()
            .find(|(name, _)| name.to_ascii_lowercase().contains(&fragment))
            .map(|(_, change)| change)
    }

    /// Directional improvement of the first metric matching `fragment`, or 0
    pub fn improvement_of(&self, fragment: &str) -> f64 {
        self.find(fragment).map(|c| c.improvement).unwrap_or(0.0)
    }

    /// Absolute coverage gain (after - before), or 0 without a coverage metric
    pub fn coverage_delta(&self) -> f64 {
        self.find("coverage").map(|c| c.delta).unwrap_or(0.0)
    }

    /// First performance, latency or throughput metric both snapshots carry
    pub fn performance_metric(&self) -> Option<&MetricChange> {
        self.find("perf")
            .or_else(|| self.find("latency"))
            .or_else(|| self.find("throughput"))
    }

    pub fn complexity_improvement(&self) -> f64 {
        self.improvement_of("complexity")
    }

    /// Sum of positive directional improvements
    pub fn total_positive_improvement(&self) -> f64 {
        self.changes
            .values()
            .map(|c| c.improvement.max(0.0))
            .sum()
    }

    pub fn changed_count(&self) -> usize {
        self.changes.values().filter(|c| c.is_changed()).count()
    }

    /// Mean directional improvement across metrics that actually moved
    pub fn mean_changed_improvement(&self) -> f64 {
        let changed: Vec<f64> = self
            .changes
            .values()
            .filter(|c| c.is_changed())
            .map(|c| c.improvement)
            .collect();
        if changed.is_empty() {
            0.0
        } else {
            changed.iter().sum::<f64>() / changed.len() as f64
        }
    }

    pub fn has_regression(&self) -> bool {
        self.changes.values().any(|c| c.improvement < 0.0)
    }

    /// Improvement vector keyed by metric name, for similarity lookups
    pub fn improvement_vector(&self) -> BTreeMap<String, f64> {
        self.changes
            .iter()
            .map(|(name, c)| (name.clone(), c.improvement))
            .collect()
    }
}
