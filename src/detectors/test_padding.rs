//! Test padding: many trivial tests inflating coverage
//!
//! Added test functions are parsed from diff text (Rust `#[test]`, Python
//! `def test_*`, Go `func Test*`, JavaScript `it(`/`test(`). A test is trivial
//! when its body has at most `trivial_test_lines` lines or no assertion.
//! Assertion density only counts assertions in non-trivial tests, so adding
//! or converting trivial tests can never make the density look better.

use super::{DetectionResult, Detector, DetectorError, DetectorThresholds};
use crate::change_set::{is_comment_line, ChangeSet};
use crate::metrics::MetricDelta;
use regex::Regex;
use std::sync::OnceLock;

const NAME: &str = "test_padding";

fn test_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^\s*(?:(?:pub\s+)?(?:async\s+)?fn\s+(?P<rs>\w+)|def\s+(?P<py>test_\w*)|func\s+(?P<go>Test\w*)|(?:it|test)\s*\(\s*['"`](?P<js>[^'"`]*))"#,
        )
        .expect("static test regex")
    })
}

fn test_attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*#\[(?:tokio::|async_std::)?test(?:\(.*\))?\]").expect("static attr regex")
    })
}

fn assertion_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"assert|expect\(|\.should|\.to(?:Be|Equal|Have|Throw)|t\.(?:Error|Fatal)|require\.")
            .expect("static assertion regex")
    })
}

fn is_closing_line(line: &str) -> bool {
    let t = line.trim();
    !t.is_empty() && t.chars().all(|c| matches!(c, '}' | ')' | ';' | ']'))
}

/// A test function found in added diff lines
#[derive(Debug, Clone, PartialEq)]
pub struct AddedTest {
    pub path: String,
    pub name: String,
    pub body_lines: usize,
    pub assertions: usize,
}

impl AddedTest {
    pub fn is_trivial(&self, trivial_lines: usize) -> bool {
        self.body_lines <= trivial_lines || self.assertions == 0
    }
}

/// Parse added test functions from a change-set
pub fn parse_added_tests(changes: &ChangeSet) -> Vec<AddedTest> {
    let mut tests = Vec::new();

    for change in changes {
        let mut current: Option<AddedTest> = None;
        let mut pending_attribute = false;

        for line in change.added() {
            if test_attribute_regex().is_match(line) {
                if let Some(done) = current.take() {
                    tests.push(done);
                }
                pending_attribute = true;
                continue;
            }

            if let Some(caps) = test_start_regex().captures(line) {
                let name = if let Some(rs) = caps.name("rs") {
                    // Rust functions are tests only when preceded by #[test]
                    pending_attribute.then(|| rs.as_str().to_string())
                } else {
                    caps.name("py")
                        .or_else(|| caps.name("go"))
                        .or_else(|| caps.name("js"))
                        .map(|m| m.as_str().to_string())
                };

                if let Some(name) = name {
                    if let Some(done) = current.take() {
                        tests.push(done);
                    }
                    pending_attribute = false;
                    current = Some(AddedTest {
                        path: change.path.clone(),
                        name,
                        body_lines: 0,
                        assertions: 0,
                    });
                    continue;
                }
            }

            if let Some(test) = current.as_mut() {
                let trimmed = line.trim();
                if trimmed.is_empty() || is_closing_line(trimmed) || is_comment_line(trimmed) {
                    continue;
                }
                test.body_lines += 1;
                test.assertions += assertion_regex().find_iter(trimmed).count();
            }
        }

        if let Some(done) = current.take() {
            tests.push(done);
        }
    }

    tests
}

pub struct TestPaddingDetector {
    thresholds: DetectorThresholds,
}

impl TestPaddingDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }
}

impl Detector for TestPaddingDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(
        &self,
        changes: &ChangeSet,
        delta: &MetricDelta,
    ) -> Result<DetectionResult, DetectorError> {
        let tests = parse_added_tests(changes);
        if tests.is_empty() {
            return Ok(DetectionResult::clean(NAME));
        }

        let t = &self.thresholds;
        let trivial: Vec<&AddedTest> = tests
            .iter()
            .filter(|test| test.is_trivial(t.trivial_test_lines))
            .collect();
        let trivial_ratio = trivial.len() as f64 / tests.len() as f64;

        let meaningful_assertions: usize = tests
            .iter()
            .filter(|test| !test.is_trivial(t.trivial_test_lines))
            .map(|test| test.assertions)
            .sum();
        let assertion_density = meaningful_assertions as f64 / tests.len() as f64;

        let coverage_delta = delta.coverage_delta();
        let coverage_indicator = if t.significant_coverage_delta > 0.0 {
            coverage_delta / (2.0 * t.significant_coverage_delta)
        } else if coverage_delta > 0.0 {
            1.0
        } else {
            0.0
        };
        let low_density = if t.min_assertion_density > 0.0 {
            1.0 - (assertion_density / t.min_assertion_density).min(1.0)
        } else {
            0.0
        };

        let fired = trivial_ratio >= t.trivial_ratio_threshold
            && coverage_delta >= t.significant_coverage_delta
            && assertion_density < t.min_assertion_density;

        let mut result = DetectionResult::clean(NAME)
            .scored(&[trivial_ratio, coverage_indicator, low_density], trivial_ratio)
            .detected(fired)
            .with_metadata("tests_added", tests.len())
            .with_metadata("trivial_tests", trivial.len())
            .with_metadata("assertion_density", assertion_density)
            .with_metadata("coverage_delta", coverage_delta);

        if fired {
            result = result.with_evidence(format!(
                "{} of {} added tests are trivial ({:.0}%) while coverage rose by {:.1} points",
                trivial.len(),
                tests.len(),
                trivial_ratio * 100.0,
                coverage_delta * 100.0
            ));
            for test in trivial.iter().take(5) {
                result = result.with_evidence(format!(
                    "{}::{} has {} body lines and {} assertions",
                    test.path, test.name, test.body_lines, test.assertions
                ));
            }
            result = result.with_recommendation(
                "Replace trivial tests with tests that assert on behaviour; \
                 coverage from assertion-free tests is not evidence of quality.",
            );
        }

        Ok(result)
    }
}
