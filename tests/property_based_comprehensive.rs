//! Comprehensive property-based tests for pre-commit hook
//!
//! Covers the core guarantees of veracity with proptest. Designed to run under
//! 30 seconds as a pre-commit quality gate.
//!
//! Core features tested:
//! 1. Honest code changes never trigger detectors
//! 2. Comment floods trigger comment inflation
//! 3. Reality validation is idempotent
//! 4. Test padding confidence is monotonic in the trivial-test ratio
//! 5. Evidence signatures survive collection and break on tampering
//! 6. Audit packages over valid evidence have full chain integrity
//! 7. Detection ranking and indicator bounds
//! 8. Change-set parsing never panics

use proptest::prelude::*;
use serde_json::json;
use veracity::analyzer::{AnalysisRequest, TheaterPatternAnalyzer, TheaterStatus};
use veracity::change_set::{ChangeSet, FileChange};
use veracity::detectors::{
    mean_indicator, CommentInflationDetector, DetectionResult, Detector, DetectorThresholds,
    Severity, TestPaddingDetector,
};
use veracity::evidence::{
    EvidenceCollector, EvidenceConfig, EvidenceStore, Ed25519Signer, TestRunSummary,
};
use veracity::metrics::{MetricDelta, MetricSnapshot};
use veracity::orchestrator::DetectorOrchestrator;
use veracity::validation::RealityValidator;

fn collector(seed: u8) -> EvidenceCollector {
    EvidenceCollector::with_ed25519(
        Ed25519Signer::from_seed(&[seed; 32]),
        EvidenceStore::in_memory().unwrap(),
        EvidenceConfig::default(),
    )
}

fn code_diff(lines: usize, salt: u32) -> String {
    (0..lines)
        .map(|i| format!("+let value_{i} = source.read({}).map(convert)?;", salt + i as u32))
        .collect::<Vec<_>>()
        .join("\n")
}

fn padded_tests(total: usize, trivial: usize) -> ChangeSet {
    let diff = (0..total)
        .map(|i| {
            if i < trivial {
                format!("+#[test]\n+fn test_trivial_{i}() {{\n+    assert!(true);\n+}}")
            } else {
                format!(
                    "+#[test]\n+fn test_parses_record_{i}() {{\n+    let input = sample({i});\n+    let parsed = parse(&input).unwrap();\n+    assert_eq!(parsed.id, {i});\n+    assert!(parsed.fields.len() > 2);\n+}}"
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    ChangeSet::new(vec![FileChange::new("tests/parser_tests.rs", diff)])
}

/// Everyday structural code: loops, counters, emptiness checks, presized
/// buffers and renames that come with a logic change
fn honest_snippet(kind: usize, n: usize) -> String {
    match kind % 6 {
        0 => format!(
            "+for item in batch_{n}.iter() {{\n+    total_{n} += item.weight;\n+}}"
        ),
        1 => format!(
            "+let mut handled_{n} = 0;\n+while let Some(job) = jobs_{n}.pop_front() {{\n+    job.run()?;\n+    handled_{n} += 1;\n+}}"
        ),
        2 => format!("+if queue_{n}.is_empty() {{\n+    return Ok(None);\n+}}"),
        3 => format!(
            "+let mut rows_{n} = Vec::with_capacity(input_{n}.len());\n+rows_{n}.extend(input_{n}.iter().map(parse_row));"
        ),
        4 => format!(
            "-let tmp_{n} = fetch(id_{n});\n+let record_{n} = fetch(id_{n}).map_err(Error::from)?;\n\
             -if tmp_{n}.valid {{\n+if record_{n}.is_valid() && !record_{n}.expired(now) {{"
        ),
        _ => format!(
            "-    retries_{n} = retries_{n} + 1;\n+    let backoff_{n} = policy.delay_for(attempt_{n});\n+    sleep(backoff_{n});"
        ),
    }
}

// Property 1: honest code with small metric movement is never flagged
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_honest_code_change_not_detected(
        files in prop::collection::vec(prop::collection::vec(0usize..6, 1..12), 1..4),
        salt in 0usize..1000,
        coverage_gain in 0.0f64..0.02,
    ) {
        let changes = ChangeSet::new(
            files
                .iter()
                .enumerate()
                .map(|(f, kinds)| {
                    let diff = kinds
                        .iter()
                        .enumerate()
                        .map(|(i, kind)| honest_snippet(*kind, salt + i))
                        .collect::<Vec<_>>()
                        .join("\n");
                    FileChange::new(format!("src/module_{f}.rs"), diff)
                })
                .collect(),
        );
        let before = MetricSnapshot::new().with("coverage", 0.7).with("complexity", 10.0);
        let after = MetricSnapshot::new()
            .with("coverage", 0.7 + coverage_gain)
            .with("complexity", 10.0);

        let orchestrator = DetectorOrchestrator::with_defaults(&DetectorThresholds::default());
        let report = orchestrator.run(&changes, &MetricDelta::between(&before, &after));
        prop_assert!(!report.theater_detected, "{:?}", report.evidence);

        let request = AnalysisRequest::new(changes, before, after);
        let analysis = TheaterPatternAnalyzer::default().analyze(&request).unwrap();
        prop_assert_eq!(analysis.report.status, TheaterStatus::Clean);
    }
}

// Property 2: >90% added comments fires comment inflation with confidence >= 0.7,
// whether the comments sit in one file or several and however small the change
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_comment_flood_fires_with_high_confidence(
        comments in 1usize..80,
        comment_files in 1usize..4,
        code_files in 0usize..10,
        style in prop::sample::select(vec!["//", "#", "///"]),
    ) {
        // Strictly fewer than one code line per nine comment lines
        let code = code_files.min((comments - 1) / 9);
        let mut changes: Vec<FileChange> = (0..comment_files)
            .map(|f| {
                let diff = (0..comments)
                    .filter(|i| i % comment_files == f)
                    .map(|i| format!("+{style} note {i} describing the surrounding logic"))
                    .collect::<Vec<_>>()
                    .join("\n");
                FileChange::new(format!("src/engine_{f}.rs"), diff)
            })
            .collect();
        changes.extend(
            (0..code).map(|i| FileChange::new(format!("src/part_{i}.rs"), format!("+let x{i} = y{i};"))),
        );

        let detector = CommentInflationDetector::new(DetectorThresholds::default());
        let result = detector.detect(&ChangeSet::new(changes), &MetricDelta::default()).unwrap();
        prop_assert!(result.theater_detected);
        prop_assert!(result.confidence >= 0.7, "confidence {}", result.confidence);
    }
}

// Property 3: identical inputs yield identical validation results
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_validation_idempotent(
        coverage_before in 0.1f64..0.9,
        coverage_gain in -0.1f64..0.1,
        complexity in 1.0f64..40.0,
        lines in 1usize..20,
    ) {
        let before = MetricSnapshot::new()
            .with("coverage", coverage_before)
            .with("complexity", complexity);
        let after = MetricSnapshot::new()
            .with("coverage", coverage_before + coverage_gain)
            .with("complexity", complexity * 0.9);
        let changes = ChangeSet::new(vec![FileChange::new("src/lib.rs", code_diff(lines, 7))]);
        let claims = vec!["Improved coverage".to_string()];

        let validator = RealityValidator::default();
        let first = validator.validate(&before, &after, &changes, &claims, "rework").unwrap();
        let second = validator.validate(&before, &after, &changes, &claims, "rework").unwrap();
        prop_assert_eq!(first, second);
    }
}

// Property 4: converting a real test into a trivial one never lowers confidence
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_test_padding_monotonic(
        total in 2usize..16,
        trivial_seed in 0usize..16,
        coverage_gain in 0.0f64..0.3,
    ) {
        let trivial = trivial_seed % total;
        let delta = MetricDelta::between(
            &MetricSnapshot::new().with("coverage", 0.5),
            &MetricSnapshot::new().with("coverage", 0.5 + coverage_gain),
        );
        let detector = TestPaddingDetector::new(DetectorThresholds::default());

        let lower = detector.detect(&padded_tests(total, trivial), &delta).unwrap();
        let higher = detector.detect(&padded_tests(total, trivial + 1), &delta).unwrap();
        prop_assert!(
            higher.confidence >= lower.confidence,
            "{} trivial: {}, {} trivial: {}",
            trivial, lower.confidence, trivial + 1, higher.confidence
        );
    }
}

// Property 5: signatures hold after collection and break on altered content
proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    #[test]
    fn prop_evidence_signature_round_trip(
        passed in 0usize..500,
        failed in 0usize..50,
        failure in "[a-z_:]{1,24}",
        seed in any::<u8>(),
    ) {
        let collector = collector(seed);
        let run = TestRunSummary {
            total: passed + failed,
            passed,
            failed,
            failures: vec![failure.clone()],
            ..Default::default()
        };
        let item = collector.collect_test_result_evidence(&run, "ci/run").unwrap();
        prop_assert!(collector.verify_evidence_signature(&item));

        let mut altered = item.clone();
        altered.content["failures"] = json!([format!("{failure}x")]);
        prop_assert!(!collector.verify_evidence_signature(&altered));

        let mut recounted = item;
        recounted.content["passed"] = json!(passed + 1);
        prop_assert!(!collector.verify_evidence_signature(&recounted));
    }
}

// Property 6: packages over untouched evidence have integrity 1.0
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_audit_package_full_integrity(
        n in 1usize..8,
        coverage in 0.1f64..0.9,
    ) {
        let collector = collector(3);
        let before = MetricSnapshot::new().with("coverage", coverage);
        let after = MetricSnapshot::new().with("coverage", coverage + 0.05);

        let items: Vec<_> = (0..n)
            .map(|i| {
                collector
                    .collect_metric_improvement_evidence(&before, &after, &format!("module_{i}"))
                    .unwrap()
            })
            .collect();
        let package = collector
            .create_audit_package(&items, "property", &after, None)
            .unwrap();

        prop_assert_eq!(package.chain_verification.total_items, n);
        prop_assert_eq!(package.chain_verification.integrity_score, 1.0);
        prop_assert!(collector.verify_package_signature(&package));
    }
}

// Property 7: ranking is monotonic and indicators stay in [0, 1]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_rank_monotonic_in_confidence(
        low in 0.0f64..=1.0,
        bump in 0.0f64..=1.0,
        severity in prop::sample::select(vec![
            Severity::Low, Severity::Medium, Severity::High, Severity::Critical,
        ]),
    ) {
        let high = (low + bump).min(1.0);
        let mut a = DetectionResult::clean("a");
        a.confidence = low;
        a.severity = severity;
        let mut b = a.clone();
        b.confidence = high;
        prop_assert!(b.rank() >= a.rank());
    }

    #[test]
    fn prop_mean_indicator_bounded(values in prop::collection::vec(any::<f64>(), 0..12)) {
        let mean = mean_indicator(&values);
        prop_assert!((0.0..=1.0).contains(&mean));
    }
}

// Property 8: arbitrary input never panics the parsers
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_change_set_parsing_never_panics(input in ".{0,200}") {
        let _ = ChangeSet::from_json(&input);
        let _ = MetricSnapshot::from_json(&input);
        let _ = AnalysisRequest::from_json(&input);
    }

    #[test]
    fn prop_change_set_counts_match_diff(
        added in 0usize..40,
        removed in 0usize..40,
    ) {
        // Every third line is a pre-increment or pre-decrement, never a header
        let step = |i: usize, op: &str| if i % 3 == 0 { op.to_string() } else { String::new() };
        let diff = (0..removed)
            .map(|i| format!("-{}old_{i};", step(i, "--")))
            .chain((0..added).map(|i| format!("+{}new_{i};", step(i, "++"))))
            .collect::<Vec<_>>()
            .join("\n");
        let value = json!([{ "path": "src/lib.rs", "diff": diff }]);
        let changes = ChangeSet::from_json(&value.to_string()).unwrap();
        let change = changes.iter().next().unwrap();
        prop_assert_eq!(change.lines_added, added);
        prop_assert_eq!(change.lines_removed, removed);
    }
}
