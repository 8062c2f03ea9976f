// End-to-end tests for the reality validation engine
//
// Scenarios mirror the two canonical cases: a config toggle reported as a
// sweeping quality win, and a real algorithm replacement with new tests.

use super::*;
use crate::change_set::FileChange;

fn gaming_inputs() -> (MetricSnapshot, MetricSnapshot, ChangeSet, Vec<String>) {
    let before = MetricSnapshot::new()
        .with("complexity", 20.0)
        .with("coverage", 0.6)
        .with("maintainability", 60.0);
    let after = MetricSnapshot::new()
        .with("complexity", 8.0)
        .with("coverage", 0.95)
        .with("maintainability", 95.0);
    let changes = ChangeSet::new(vec![FileChange::new(
        "config/features.toml",
        "-legacy_path = true\n+legacy_path = false",
    )]);
    let claims = vec![
        "Reduced complexity".to_string(),
        "Improved coverage".to_string(),
        "Better maintainability".to_string(),
    ];
    (before, after, changes, claims)
}

fn algorithm_inputs() -> (MetricSnapshot, MetricSnapshot, ChangeSet, Vec<String>) {
    let before = MetricSnapshot::new()
        .with("complexity", 12.0)
        .with("coverage", 0.6)
        .with("test_count", 40.0);
    let after = MetricSnapshot::new()
        .with("complexity", 12.0)
        .with("coverage", 0.8)
        .with("test_count", 48.0);

    let source = "\
-    for i in 0..items.len() {
-        for j in (i + 1)..items.len() {
-            if items[i] == items[j] { return true; }
-        }
-    }
-    false
+    if items.len() < 2 {
+        return false;
+    }
+    let mut sorted: Vec<u64> = items.to_vec();
+    sorted.sort_unstable();
+    let duplicate = sorted
+        .windows(2)
+        .any(|pair| pair[0] == pair[1]);
+    if duplicate {
+        tracing::debug!(\"duplicate found\");
+    }
+    duplicate";

    let tests = (0..8)
        .map(|i| {
            format!(
                "+#[test]\n+fn test_detects_duplicate_{i}() {{\n+    let items = vec![{i}, 7, 3, {i}];\n+    let found = has_duplicate(&items);\n+    assert!(found);\n+    assert_eq!(items.len(), 4);\n+}}"
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let changes = ChangeSet::new(vec![
        FileChange::new("src/dedup.rs", source),
        FileChange::new("tests/dedup_tests.rs", tests),
    ]);
    let claims = vec!["Increased test coverage".to_string()];
    (before, after, changes, claims)
}

#[test]
fn test_config_toggle_with_sweeping_gains_is_not_genuine() {
    let (before, after, changes, claims) = gaming_inputs();
    let validator = RealityValidator::default();
    let result = validator
        .validate(&before, &after, &changes, &claims, "Refactor to improve maintainability")
        .unwrap();

    assert!(!result.is_genuine);
    let d = &result.validation_details;
    assert!(d.evidence_quality.score < 0.6);
    assert_eq!(d.genuineness.base_score, 0.2);
    assert!(!result.recommendations.is_empty());
}

#[test]
fn test_algorithm_replacement_is_genuine() {
    let (before, after, changes, claims) = algorithm_inputs();
    let validator = RealityValidator::default();
    let result = validator
        .validate(
            &before,
            &after,
            &changes,
            &claims,
            "Replace nested duplicate scan with sort and windows, add regression tests",
        )
        .unwrap();

    let d = &result.validation_details;
    assert!(d.statistical.significant, "{:?}", d.statistical);
    assert!(d.evidence_quality.score >= 0.6, "{:?}", d.evidence_quality);
    assert_eq!(d.genuineness.score, 1.0);
    assert_eq!(d.behavioral.score, 1.0);
    assert!(result.is_genuine, "weighted {}", d.weighted_score);
}

#[test]
fn test_evidence_score_is_the_gated_quality_score() {
    for (before, after, changes, claims) in [gaming_inputs(), algorithm_inputs()] {
        let result = RealityValidator::default()
            .validate(&before, &after, &changes, &claims, "rework")
            .unwrap();
        let d = &result.validation_details;
        assert_eq!(result.evidence_score, d.evidence_quality.score);
        if result.is_genuine {
            assert!(result.evidence_score >= ValidationConfig::default().min_evidence_score);
        }
    }
}

#[test]
fn test_repeat_validation_hits_cache() {
    let (before, after, changes, claims) = algorithm_inputs();
    let validator = RealityValidator::default();
    let first = validator
        .validate(&before, &after, &changes, &claims, "desc")
        .unwrap();
    let second = validator
        .validate(&before, &after, &changes, &claims, "desc")
        .unwrap();
    assert_eq!(first, second);
    // Cache hits do not grow the history
    assert_eq!(validator.history().len(), 1);
}

#[test]
fn test_cache_key_covers_description() {
    let (before, after, changes, claims) = algorithm_inputs();
    let a = input_hash(&before, &after, &changes, &claims, "one").unwrap();
    let b = input_hash(&before, &after, &changes, &claims, "two").unwrap();
    assert_ne!(a, b);
    assert_eq!(a.len(), 64);
}

#[test]
fn test_cache_is_bounded() {
    let config = ValidationConfig {
        cache_capacity: 2,
        ..Default::default()
    };
    let validator = RealityValidator::new(config);
    let (before, after, changes, claims) = gaming_inputs();
    for desc in ["a", "b", "c"] {
        validator
            .validate(&before, &after, &changes, &claims, desc)
            .unwrap();
    }
    assert_eq!(validator.lock_cache().entries.len(), 2);
    assert_eq!(validator.history().len(), 3);
}

#[test]
fn test_history_boost_after_similar_genuine_cases() {
    let (before, after, changes, claims) = algorithm_inputs();
    let validator = RealityValidator::default();
    let mut last = None;
    for desc in ["r1", "r2", "r3", "r4"] {
        last = Some(
            validator
                .validate(&before, &after, &changes, &claims, desc)
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert_eq!(last.validation_details.historical.similar_cases, 3);
    assert_eq!(last.validation_details.historical.confidence_boost, 0.1);
    assert!(last.confidence > last.validation_details.weighted_score);
}

#[test]
fn test_non_finite_metric_is_rejected() {
    let before = MetricSnapshot::new().with("coverage", f64::NAN);
    let after = MetricSnapshot::new().with("coverage", 0.5);
    let err = RealityValidator::default()
        .validate(&before, &after, &ChangeSet::default(), &[], "")
        .unwrap_err();
    assert!(matches!(err, InputError::NonFiniteMetric { .. }));
}

#[test]
fn test_report_string_mentions_verdict() {
    let (before, after, changes, claims) = gaming_inputs();
    let result = RealityValidator::default()
        .validate(&before, &after, &changes, &claims, "")
        .unwrap();
    let report = result.to_report_string();
    assert!(report.contains("NOT VALIDATED"));
    assert!(report.contains("Genuineness"));
}
