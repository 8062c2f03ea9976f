//! Change-set input model
//!
//! A change-set is the ordered list of per-file diffs produced by an external
//! diff extractor. It is immutable once constructed; every detector and every
//! validation check reads the same instance.
//!
//! # Input format
//!
//! ```json
//! [
//!   {"path": "src/sort.rs", "diff": "+fn a() {}\n-fn b() {}", "lines_added": 1, "lines_removed": 1}
//! ]
//! ```
//!
//! `category` is optional; when absent it is inferred from the path and the
//! diff content.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading change-sets and metric snapshots
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Malformed change-set JSON: {0}")]
    MalformedChangeSet(String),

    #[error("File change #{index} has an empty path")]
    EmptyPath { index: usize },

    #[error("Malformed metric snapshot JSON: {0}")]
    MalformedMetrics(String),

    #[error("Metric '{name}' is not a finite number ({value})")]
    NonFiniteMetric { name: String, value: f64 },

    #[error("Malformed analysis request: {0}")]
    MalformedRequest(String),
}

/// Coarse category of a file change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Structural,
    Cosmetic,
    Test,
    Documentation,
    Config,
    Dependency,
}

impl ChangeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::Structural => "structural",
            ChangeCategory::Cosmetic => "cosmetic",
            ChangeCategory::Test => "test",
            ChangeCategory::Documentation => "documentation",
            ChangeCategory::Config => "config",
            ChangeCategory::Dependency => "dependency",
        }
    }

    /// Cosmetic, documentation and configuration edits do not change behaviour
    pub fn is_superficial(&self) -> bool {
        matches!(
            self,
            ChangeCategory::Cosmetic | ChangeCategory::Documentation | ChangeCategory::Config
        )
    }
}

/// A single file's diff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub diff: String,
    pub category: ChangeCategory,
}

/// Raw wire shape, before validation and category inference
#[derive(Debug, Deserialize)]
struct RawFileChange {
    path: String,
    #[serde(default)]
    diff: String,
    lines_added: Option<usize>,
    lines_removed: Option<usize>,
    category: Option<ChangeCategory>,
}

impl FileChange {
    /// Build a change and infer its category
    pub fn new(path: impl Into<String>, diff: impl Into<String>) -> Self {
        let path = path.into();
        let diff = diff.into();
        let lines_added = added_lines(&diff).count();
        let lines_removed = removed_lines(&diff).count();
        let category = infer_category(&path, &diff);
        Self {
            path,
            lines_added,
            lines_removed,
            diff,
            category,
        }
    }

    /// Override the inferred category
    pub fn with_category(mut self, category: ChangeCategory) -> Self {
        self.category = category;
        self
    }

    /// Lines this change adds (without the leading `+`)
    pub fn added(&self) -> impl Iterator<Item = &str> {
        added_lines(&self.diff)
    }

    /// Lines this change removes (without the leading `-`)
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        removed_lines(&self.diff)
    }

    pub fn changed_lines(&self) -> usize {
        self.lines_added + self.lines_removed
    }

    /// Number of added lines that are comments or doc comments
    pub fn added_comment_lines(&self) -> usize {
        self.added().filter(|l| is_comment_line(l)).count()
    }

    /// Number of added lines that carry code (non-blank, non-comment)
    pub fn added_code_lines(&self) -> usize {
        self.added()
            .filter(|l| !l.trim().is_empty() && !is_comment_line(l))
            .count()
    }

    pub fn is_test_path(&self) -> bool {
        is_test_path(&self.path)
    }
}

/// Ordered, immutable sequence of file changes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<FileChange>,
}

impl ChangeSet {
    pub fn new(changes: Vec<FileChange>) -> Self {
        Self { changes }
    }

    /// Parse the JSON wire format
    pub fn from_json(input: &str) -> Result<Self, InputError> {
        let value: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| InputError::MalformedChangeSet(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse from an already-decoded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, InputError> {
        let raw: Vec<RawFileChange> = serde_json::from_value(value)
            .map_err(|e| InputError::MalformedChangeSet(e.to_string()))?;

        let mut changes = Vec::with_capacity(raw.len());
        for (index, entry) in raw.into_iter().enumerate() {
            if entry.path.trim().is_empty() {
                return Err(InputError::EmptyPath { index });
            }
            let lines_added = entry
                .lines_added
                .unwrap_or_else(|| added_lines(&entry.diff).count());
            let lines_removed = entry
                .lines_removed
                .unwrap_or_else(|| removed_lines(&entry.diff).count());
            let category = entry
                .category
                .unwrap_or_else(|| infer_category(&entry.path, &entry.diff));
            changes.push(FileChange {
                path: entry.path,
                lines_added,
                lines_removed,
                diff: entry.diff,
                category,
            });
        }

        Ok(Self { changes })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn total_changed_lines(&self) -> usize {
        self.changes.iter().map(FileChange::changed_lines).sum()
    }

    /// Changed lines grouped by category
    pub fn lines_in(&self, category: ChangeCategory) -> usize {
        self.changes
            .iter()
            .filter(|c| c.category == category)
            .map(FileChange::changed_lines)
            .sum()
    }

    /// Share of changed lines in cosmetic, documentation or config files
    pub fn superficial_share(&self) -> f64 {
        let total = self.total_changed_lines();
        if total == 0 {
            return 0.0;
        }
        let superficial: usize = self
            .changes
            .iter()
            .filter(|c| c.category.is_superficial())
            .map(FileChange::changed_lines)
            .sum();
        superficial as f64 / total as f64
    }

    /// Paths touched, in input order
    pub fn paths(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.path.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a FileChange;
    type IntoIter = std::slice::Iter<'a, FileChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Lines of a diff body: file headers and `@@` hunk markers removed
///
/// `+++ `/`--- ` lines are headers only before the first hunk and only when
/// followed by a path, so an added `++i;` or a removed `--i;` is kept.
fn body_lines(diff: &str) -> impl Iterator<Item = &str> {
    diff.lines()
        .scan(false, |in_hunk, line| {
            if line.starts_with("@@") {
                *in_hunk = true;
                return Some(None);
            }
            if !*in_hunk && is_file_header(line) {
                return Some(None);
            }
            Some(Some(line))
        })
        .flatten()
}

fn is_file_header(line: &str) -> bool {
    let Some(rest) = line
        .strip_prefix("+++ ")
        .or_else(|| line.strip_prefix("--- "))
    else {
        return false;
    };
    // `--- a/src/x.rs\t2024-01-01 10:00:00` carries an optional timestamp
    let path = rest.split('\t').next().unwrap_or_default().trim();
    !path.is_empty()
        && !path
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '(' | ')' | '{' | '}' | '='))
}

/// Added lines of a unified diff (without the leading `+`)
pub fn added_lines(diff: &str) -> impl Iterator<Item = &str> {
    body_lines(diff).filter_map(|l| l.strip_prefix('+'))
}

/// Removed lines of a unified diff (without the leading `-`)
pub fn removed_lines(diff: &str) -> impl Iterator<Item = &str> {
    body_lines(diff).filter_map(|l| l.strip_prefix('-'))
}

/// Whether a source line is a comment in any of the common syntaxes
pub fn is_comment_line(line: &str) -> bool {
    let t = line.trim_start();
    if t.is_empty() {
        return false;
    }
    if t.starts_with("#[") || t.starts_with("#!") || t.starts_with("#include") {
        return false;
    }
    t.starts_with("//")
        || t.starts_with('#')
        || t.starts_with("/*")
        || t.starts_with("* ")
        || t.starts_with("*/")
        || t == "*"
        || t.starts_with("\"\"\"")
        || t.starts_with("'''")
        || t == "--"
        || t.starts_with("-- ")
        || t.starts_with("<!--")
}

pub fn is_test_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let file = lower.rsplit('/').next().unwrap_or(&lower);
    lower.starts_with("tests/")
        || lower.contains("/tests/")
        || lower.contains("/test/")
        || lower.contains("__tests__")
        || file.starts_with("test_")
        || file.ends_with("_test.rs")
        || file.ends_with("_test.go")
        || file.ends_with("_test.py")
        || file.contains(".test.")
        || file.contains(".spec.")
        || file.ends_with("_tests.rs")
}

const DEPENDENCY_FILES: &[&str] = &[
    "cargo.toml",
    "cargo.lock",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "requirements.txt",
    "pyproject.toml",
    "poetry.lock",
    "go.mod",
    "go.sum",
    "gemfile",
    "gemfile.lock",
    "pom.xml",
    "build.gradle",
];

const CONFIG_EXTENSIONS: &[&str] = &[".toml", ".yaml", ".yml", ".json", ".ini", ".cfg", ".env", ".conf"];
const DOC_EXTENSIONS: &[&str] = &[".md", ".rst", ".txt", ".adoc"];

/// Infer a category from path conventions first, then diff content
pub fn infer_category(path: &str, diff: &str) -> ChangeCategory {
    let lower = path.to_ascii_lowercase();
    let file = lower.rsplit('/').next().unwrap_or(&lower);

    if DEPENDENCY_FILES.contains(&file) {
        return ChangeCategory::Dependency;
    }
    if is_test_path(path) {
        return ChangeCategory::Test;
    }
    if lower.starts_with("docs/") || DOC_EXTENSIONS.iter().any(|ext| file.ends_with(ext)) {
        return ChangeCategory::Documentation;
    }
    if CONFIG_EXTENSIONS.iter().any(|ext| file.ends_with(ext)) {
        return ChangeCategory::Config;
    }

    let changed: Vec<&str> = added_lines(diff).chain(removed_lines(diff)).collect();
    if changed.is_empty() {
        return ChangeCategory::Structural;
    }
    if changed.iter().all(|l| l.trim().is_empty()) {
        return ChangeCategory::Cosmetic;
    }
    let non_blank: Vec<&&str> = changed.iter().filter(|l| !l.trim().is_empty()).collect();
    if non_blank.iter().all(|l| is_comment_line(l)) {
        return ChangeCategory::Documentation;
    }
    if is_whitespace_only_diff(diff) {
        return ChangeCategory::Cosmetic;
    }
    ChangeCategory::Structural
}

/// True when every removed line reappears in the added lines modulo whitespace
pub fn is_whitespace_only_diff(diff: &str) -> bool {
    let squash = |l: &str| l.split_whitespace().collect::<String>();
    let mut added: Vec<String> = added_lines(diff)
        .map(squash)
        .filter(|l| !l.is_empty())
        .collect();
    let mut removed: Vec<String> = removed_lines(diff)
        .map(squash)
        .filter(|l| !l.is_empty())
        .collect();
    if added.is_empty() && removed.is_empty() {
        return false;
    }
    added.sort();
    removed.sort();
    added == removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_change_set_json() {
        let json = r#"[
            {"path": "src/lib.rs", "diff": "+fn a() {}\n-fn b() {}", "lines_added": 1, "lines_removed": 1},
            {"path": "README.md", "diff": "+more docs"}
        ]"#;
        let set = ChangeSet::from_json(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap().category, ChangeCategory::Structural);
        let readme = set.iter().nth(1).unwrap();
        assert_eq!(readme.category, ChangeCategory::Documentation);
        assert_eq!(readme.lines_added, 1);
    }

    #[test]
    fn test_malformed_json_fails_fast() {
        assert!(matches!(
            ChangeSet::from_json("{not json"),
            Err(InputError::MalformedChangeSet(_))
        ));
        assert!(matches!(
            ChangeSet::from_json(r#"[{"diff": "+x"}]"#),
            Err(InputError::MalformedChangeSet(_))
        ));
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = ChangeSet::from_json(r#"[{"path": "  ", "diff": "+x"}]"#).unwrap_err();
        assert!(matches!(err, InputError::EmptyPath { index: 0 }));
    }

    #[test]
    fn test_explicit_category_wins() {
        let set =
            ChangeSet::from_json(r#"[{"path": "src/a.rs", "diff": "+x", "category": "cosmetic"}]"#)
                .unwrap();
        assert_eq!(set.iter().next().unwrap().category, ChangeCategory::Cosmetic);
    }

    #[test]
    fn test_infer_categories() {
        assert_eq!(infer_category("Cargo.toml", "+x = 1"), ChangeCategory::Dependency);
        assert_eq!(infer_category("tests/foo.rs", "+x"), ChangeCategory::Test);
        assert_eq!(infer_category("src/foo_test.go", "+x"), ChangeCategory::Test);
        assert_eq!(infer_category("config/app.yaml", "+a: 1"), ChangeCategory::Config);
        assert_eq!(
            infer_category("src/a.rs", "+// note\n+/// doc"),
            ChangeCategory::Documentation
        );
        assert_eq!(
            infer_category("src/a.rs", "-let x=1;\n+let x = 1;"),
            ChangeCategory::Cosmetic
        );
        assert_eq!(
            infer_category("src/a.rs", "+let y = compute(x);"),
            ChangeCategory::Structural
        );
    }

    #[test]
    fn test_comment_detection() {
        assert!(is_comment_line("   // hello"));
        assert!(is_comment_line("# python comment"));
        assert!(is_comment_line(" * block continuation"));
        assert!(!is_comment_line("#[derive(Debug)]"));
        assert!(!is_comment_line("let x = 1; // trailing"));
        assert!(!is_comment_line("   "));
    }

    #[test]
    fn test_diff_headers_skipped() {
        let diff = "--- a/src/x.rs\n+++ b/src/x.rs\n+added\n-removed";
        let change = FileChange::new("src/x.rs", diff);
        assert_eq!(change.lines_added, 1);
        assert_eq!(change.lines_removed, 1);
    }

    #[test]
    fn test_increment_and_decrement_lines_are_not_headers() {
        let change = FileChange::new("src/loop.c", "+++i;\n+x = 1;\n---j;");
        assert_eq!(change.lines_added, 2);
        assert_eq!(change.lines_removed, 1);
        assert_eq!(change.added().next(), Some("++i;"));
        assert_eq!(change.removed().next(), Some("--j;"));
        assert_eq!(change.added_code_lines(), 2);
    }

    #[test]
    fn test_header_like_lines_inside_hunk_are_content() {
        let diff = "--- a/src/x.c\n+++ b/src/x.c\n@@ -1,2 +1,2 @@\n--- a/old\n+++ b/new";
        let change = FileChange::new("src/x.c", diff);
        assert_eq!(change.lines_added, 1);
        assert_eq!(change.lines_removed, 1);
        assert_eq!(change.added().next(), Some("++ b/new"));
    }

    #[test]
    fn test_decrement_is_not_a_comment() {
        assert!(!is_comment_line("--i;"));
        assert!(!is_comment_line("  --count;"));
        assert!(is_comment_line("-- sql comment"));
        assert!(is_comment_line("--"));
    }

    #[test]
    fn test_superficial_share() {
        let set = ChangeSet::new(vec![
            FileChange::new("README.md", "+a\n+b\n+c"),
            FileChange::new("src/lib.rs", "+let x = f();"),
        ]);
        assert!((set.superficial_share() - 0.75).abs() < 1e-9);
        assert_eq!(ChangeSet::default().superficial_share(), 0.0);
    }
}
