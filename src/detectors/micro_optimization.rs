//! Micro-optimization: idiom swaps presented as performance work
//!
//! An added micro line only counts when it replaces a removed line that does
//! the same job (shares most of its identifiers), or when it is a bare
//! optimisation hint such as `#[inline]`. Freshly written code that happens to
//! use `+= 1` or `is_empty()` is not a swap.

use super::{DetectionResult, Detector, DetectorError, DetectorThresholds};
use crate::change_set::{is_comment_line, ChangeSet};
use crate::metrics::MetricDelta;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const NAME: &str = "micro_optimization";

/// Shared-identifier overlap at which a removed line counts as the original
const SWAP_OVERLAP: f64 = 0.5;

fn micro_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\+\+\w|\w\+\+|<<\s*1\b|>>\s*1\b|#\[inline|\binline\b|with_capacity|\.reserve\(|\.is_empty\(\)|_unchecked|\.copied\(\)|\+=\s*1\b|\bxrange\b|''\.join|"\.join|\bregister\b"#,
        )
        .expect("static micro regex")
    })
}

fn hint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:#\[(?:inline|cold)[^\]]*\]|@(?:functools\.)?cache|register)\s*$")
            .expect("static hint regex")
    })
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("static identifier regex"))
}

fn identifiers(line: &str) -> BTreeSet<&str> {
    identifier_regex()
        .find_iter(line)
        .map(|m| m.as_str())
        .collect()
}

/// Overlap coefficient of the identifiers two lines use
fn identifier_overlap(a: &str, b: &str) -> f64 {
    let a = identifiers(a);
    let b = identifiers(b);
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / smaller as f64
}

fn algorithmic_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)sort|binary_search|bisect|hashmap|hashset|btreemap|btreeset|binaryheap|heapq|priority.?queue|\bdict\(|\bset\(|memoi[sz]|\bmemo\b|lru_cache|\bdp\[|dynamic programming|(?-i:\bO\((?:n|log|1\)))|windows\(|dedup|\btrie\b|bloom|union.?find|two.?pointer|sliding.?window|divide.?and.?conquer",
        )
        .expect("static algorithmic regex")
    })
}

/// How an optimisation-looking line is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationKind {
    Micro,
    Algorithmic,
}

/// Classify a line; algorithmic signals take precedence
pub fn classify_line(line: &str) -> Option<OptimizationKind> {
    if algorithmic_regex().is_match(line) {
        Some(OptimizationKind::Algorithmic)
    } else if micro_regex().is_match(line) {
        Some(OptimizationKind::Micro)
    } else {
        None
    }
}

/// Claim the unused removed line this added line most plausibly replaces
fn take_original<'a>(originals: &mut [Option<&'a str>], added: &str) -> Option<&'a str> {
    let best = originals
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            let removed = (*slot)?;
            (removed.trim() != added.trim()).then(|| (i, identifier_overlap(removed, added)))
        })
        .filter(|(_, overlap)| *overlap >= SWAP_OVERLAP)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    originals[best.0].take()
}

pub struct MicroOptimizationDetector {
    thresholds: DetectorThresholds,
}

impl MicroOptimizationDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }
}

impl Detector for MicroOptimizationDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(
        &self,
        changes: &ChangeSet,
        delta: &MetricDelta,
    ) -> Result<DetectionResult, DetectorError> {
        let Some(performance) = delta.performance_metric() else {
            return Ok(DetectionResult::clean(NAME).with_metadata("performance_metric", false));
        };

        let significant = |l: &&str| !l.trim().is_empty() && !is_comment_line(l);
        let mut micro = Vec::new();
        let mut algorithmic = 0usize;

        for change in changes.iter().filter(|c| !c.is_test_path()) {
            let mut originals: Vec<Option<&str>> = change
                .removed()
                .filter(significant)
                .filter(|l| classify_line(l) != Some(OptimizationKind::Micro))
                .map(Some)
                .collect();

            for line in change.added().filter(significant) {
                match classify_line(line) {
                    Some(OptimizationKind::Micro) => {
                        let swapped = hint_regex().is_match(line)
                            || take_original(&mut originals, line).is_some();
                        if swapped {
                            micro.push(format!("{}: {}", change.path, line.trim()));
                        }
                    }
                    Some(OptimizationKind::Algorithmic) => algorithmic += 1,
                    None => {}
                }
            }
        }

        let total = micro.len() + algorithmic;
        if total == 0 {
            return Ok(DetectionResult::clean(NAME)
                .with_metadata("micro_lines", 0)
                .with_metadata("algorithmic_lines", 0));
        }

        let t = &self.thresholds;
        let micro_ratio = micro.len() as f64 / total as f64;
        let performance_gain = performance.improvement;
        let shortfall = if t.min_performance_gain > 0.0 {
            1.0 - (performance_gain.max(0.0) / t.min_performance_gain).min(1.0)
        } else {
            0.0
        };

        let fired = micro_ratio >= t.micro_ratio_threshold
            && micro.len() >= t.min_micro_lines
            && performance_gain < t.min_performance_gain;

        let mut result = DetectionResult::clean(NAME)
            .scored(&[micro_ratio, shortfall], micro_ratio)
            .detected(fired)
            .with_metadata("micro_lines", micro.len())
            .with_metadata("algorithmic_lines", algorithmic)
            .with_metadata("performance_gain", performance_gain);

        if fired {
            result = result.with_evidence(format!(
                "{} micro-optimisation lines vs {} algorithmic lines; measured performance gain {:.1}%",
                micro.len(),
                algorithmic,
                performance_gain * 100.0
            ));
            for line in micro.iter().take(5) {
                result = result.with_evidence(line.clone());
            }
            result = result.with_recommendation(
                "Back performance claims with benchmarks; idiom swaps rarely change \
                 measured performance.",
            );
        }

        Ok(result)
    }
}
