//! Variable renaming: identifier swaps presented as refactoring
//!
//! Removed and added lines are reduced to a token "shape" in which every
//! identifier becomes a placeholder. A removed line and an added line with the
//! same shape but different text differ only in naming.

use super::{DetectionResult, Detector, DetectorError, DetectorThresholds};
use crate::change_set::{is_comment_line, ChangeSet};
use crate::metrics::MetricDelta;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

const NAME: &str = "variable_renaming";

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "case", "catch", "class", "const", "continue", "def", "else",
    "elif", "enum", "except", "false", "False", "fn", "for", "from", "function", "if", "impl",
    "import", "in", "let", "loop", "match", "mod", "mut", "new", "None", "null", "pub", "return",
    "self", "Self", "static", "struct", "switch", "this", "throw", "trait", "true", "True", "try",
    "type", "use", "var", "void", "where", "while", "with", "yield",
];

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|[0-9]+(?:\.[0-9]+)?|\S").expect("static token regex")
    })
}

fn is_identifier(token: &str) -> bool {
    token
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && !KEYWORDS.contains(&token)
}

/// Token shape of a line: identifiers replaced by a placeholder
fn shape(line: &str) -> (Vec<String>, Vec<String>) {
    let mut shape = Vec::new();
    let mut identifiers = Vec::new();
    for m in token_regex().find_iter(line) {
        let token = m.as_str();
        if is_identifier(token) {
            shape.push("\u{1}ID".to_string());
            identifiers.push(token.to_string());
        } else {
            shape.push(token.to_string());
        }
    }
    (shape, identifiers)
}

pub struct VariableRenamingDetector {
    thresholds: DetectorThresholds,
}

impl VariableRenamingDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }
}

impl Detector for VariableRenamingDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn detect(
        &self,
        changes: &ChangeSet,
        _delta: &MetricDelta,
    ) -> Result<DetectionResult, DetectorError> {
        let significant = |l: &&str| !l.trim().is_empty() && !is_comment_line(l);

        let mut rename_pairs = 0usize;
        let mut changed_lines = 0usize;
        // old identifier -> set of new identifiers it was swapped for
        let mut mapping: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut swap_count = 0usize;
        let mut examples = Vec::new();

        for change in changes {
            let removed: Vec<&str> = change.removed().filter(significant).collect();
            let added: Vec<&str> = change.added().filter(significant).collect();
            changed_lines += removed.len() + added.len();

            let mut added_shapes: Vec<Option<(Vec<String>, Vec<String>, &str)>> = added
                .iter()
                .map(|l| {
                    let (s, ids) = shape(l);
                    Some((s, ids, *l))
                })
                .collect();

            for old_line in &removed {
                let (old_shape, old_ids) = shape(old_line);
                if old_ids.is_empty() {
                    continue;
                }
                let matched = added_shapes.iter_mut().find(|slot| {
                    slot.as_ref()
                        .map(|(s, _, text)| *s == old_shape && text.trim() != old_line.trim())
                        .unwrap_or(false)
                });
                let Some(slot) = matched else {
                    continue;
                };
                let Some((_, new_ids, new_line)) = slot.take() else {
                    continue;
                };

                rename_pairs += 1;
                for (old, new) in old_ids.iter().zip(new_ids.iter()) {
                    if old != new {
                        swap_count += 1;
                        mapping.entry(old.clone()).or_default().insert(new.clone());
                    }
                }
                if examples.len() < 5 {
                    examples.push(format!(
                        "{}: '{}' -> '{}'",
                        change.path,
                        old_line.trim(),
                        new_line.trim()
                    ));
                }
            }
        }

        if changed_lines == 0 {
            return Ok(DetectionResult::clean(NAME));
        }

        let dominance = 2.0 * rename_pairs as f64 / changed_lines as f64;
        let consistent_swaps: usize = mapping
            .values()
            .filter(|targets| targets.len() == 1)
            .count();
        let consistency = if mapping.is_empty() {
            0.0
        } else {
            consistent_swaps as f64 / mapping.len() as f64
        };

        let fired = dominance >= self.thresholds.rename_dominance
            && rename_pairs >= self.thresholds.min_renames;

        let renamed: Vec<String> = mapping
            .iter()
            .map(|(old, new)| {
                format!(
                    "{} -> {}",
                    old,
                    new.iter().cloned().collect::<Vec<_>>().join("|")
                )
            })
            .collect();

        let mut result = DetectionResult::clean(NAME)
            .scored(&[dominance, consistency], dominance)
            .detected(fired)
            .with_metadata("rename_pairs", rename_pairs)
            .with_metadata("identifier_swaps", swap_count)
            .with_metadata("changed_lines", changed_lines)
            .with_metadata("renamed_identifiers", renamed);

        if fired {
            result = result.with_evidence(format!(
                "{} of {} changed lines are identifier renames ({:.0}%)",
                rename_pairs * 2,
                changed_lines,
                dominance.min(1.0) * 100.0
            ));
            for example in examples {
                result = result.with_evidence(example);
            }
            result = result.with_recommendation(
                "Separate pure renames from behavioural changes and do not report \
                 them as maintainability improvements.",
            );
        }

        Ok(result)
    }
}
