//! Complexity hiding: split-and-delegate instead of simplification
//!
//! Cyclomatic complexity is usually reported per function, so slicing one
//! function into many tiny helpers that just call each other lowers the number
//! without removing any logic.

use super::{DetectionResult, Detector, DetectorError, DetectorThresholds};
use crate::change_set::{is_comment_line, ChangeSet};
use crate::metrics::MetricDelta;
use regex::Regex;
use std::sync::OnceLock;

const NAME: &str = "complexity_hiding";

/// Share of new functions that must be small delegators
const DELEGATION_SHARE_THRESHOLD: f64 = 0.6;

fn function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|def|func|function)\s+(?P<name>\w+)",
        )
        .expect("static function regex")
    })
}

fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][\w.:]*\s*\(").expect("static call regex"))
}

#[derive(Debug, Clone)]
struct ExtractedFunction {
    name: String,
    body_lines: usize,
    calls: usize,
}

fn extracted_functions(changes: &ChangeSet) -> Vec<(String, ExtractedFunction)> {
    let mut found = Vec::new();
    for change in changes.iter().filter(|c| !c.is_test_path()) {
        let mut current: Option<ExtractedFunction> = None;
        for line in change.added() {
            if let Some(caps) = function_regex().captures(line) {
                if let Some(done) = current.take() {
                    found.push((change.path.clone(), done));
                }
                current = Some(ExtractedFunction {
                    name: caps["name"].to_string(),
                    body_lines: 0,
                    calls: 0,
                });
                // Single-line bodies: `fn a() { b() }`
                if let Some(open) = line.find('{') {
                    let rest = &line[open + 1..];
                    if let Some(f) = current.as_mut() {
                        if call_regex().is_match(rest) {
                            f.body_lines += 1;
                            f.calls += 1;
                        }
                    }
                }
                continue;
            }
            let Some(f) = current.as_mut() else {
                continue;
            };
            let t = line.trim();
            if t.is_empty()
                || is_comment_line(t)
                || t.chars().all(|c| matches!(c, '}' | ')' | ';'))
            {
                continue;
            }
            f.body_lines += 1;
            if call_regex().is_match(t) {
                f.calls += 1;
            }
        }
        if let Some(done) = current.take() {
            found.push((change.path.clone(), done));
        }
    }
    found
}

pub struct ComplexityHidingDetector {
    thresholds: DetectorThresholds,
}

impl ComplexityHidingDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }
}

impl Detector for ComplexityHidingDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(
        &self,
        changes: &ChangeSet,
        delta: &MetricDelta,
    ) -> Result<DetectionResult, DetectorError> {
        let functions = extracted_functions(changes);
        let complexity_drop = delta.complexity_improvement();
        if functions.is_empty() {
            return Ok(DetectionResult::clean(NAME)
                .with_metadata("complexity_improvement", complexity_drop));
        }

        let t = &self.thresholds;
        let delegators: Vec<&(String, ExtractedFunction)> = functions
            .iter()
            .filter(|(_, f)| f.body_lines <= t.small_function_lines && f.calls > 0)
            .collect();
        let share = delegators.len() as f64 / functions.len() as f64;

        let drop_indicator = if t.complexity_drop_threshold > 0.0 {
            complexity_drop / (2.0 * t.complexity_drop_threshold)
        } else {
            complexity_drop.max(0.0)
        };
        let extraction_indicator =
            delegators.len() as f64 / (2 * t.min_extracted_functions.max(1)) as f64;

        let fired = complexity_drop >= t.complexity_drop_threshold
            && delegators.len() >= t.min_extracted_functions
            && share >= DELEGATION_SHARE_THRESHOLD;

        let mut result = DetectionResult::clean(NAME)
            .scored(&[drop_indicator, share, extraction_indicator], share)
            .detected(fired)
            .with_metadata("functions_added", functions.len())
            .with_metadata("small_delegators", delegators.len())
            .with_metadata("complexity_improvement", complexity_drop);

        if fired {
            result = result.with_evidence(format!(
                "Complexity improved {:.0}% while {} of {} new functions are tiny delegators",
                complexity_drop * 100.0,
                delegators.len(),
                functions.len()
            ));
            for (path, f) in delegators.iter().take(5) {
                result = result.with_evidence(format!(
                    "{}::{} ({} body lines, delegates)",
                    path, f.name, f.body_lines
                ));
            }
            result = result.with_recommendation(
                "Measure complexity at module level as well; splitting a function \
                 into delegating helpers relocates complexity rather than removing it.",
            );
        }

        Ok(result)
    }
}
