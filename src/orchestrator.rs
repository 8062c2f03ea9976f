//! Detector orchestrator
//!
//! Runs every registered detector against the same inputs on a bounded worker
//! pool and folds the results into one verdict. One failing (or panicking)
//! detector is logged and excluded; it never aborts the batch. With a deadline
//! the orchestrator returns whatever finished in time and marks the report
//! incomplete.
//!
//! # Example
//!
//! ```
//! use veracity::change_set::{ChangeSet, FileChange};
//! use veracity::detectors::DetectorThresholds;
//! use veracity::metrics::MetricDelta;
//! use veracity::orchestrator::DetectorOrchestrator;
//!
//! let orchestrator = DetectorOrchestrator::with_defaults(&DetectorThresholds::default());
//! let changes = ChangeSet::new(vec![FileChange::new("src/lib.rs", "+let x = f();")]);
//! let report = orchestrator.run(&changes, &MetricDelta::default());
//! assert!(report.complete);
//! assert!(!report.theater_detected);
//! ```

use crate::change_set::ChangeSet;
use crate::detectors::{default_detectors, DetectionResult, Detector, DetectorError, DetectorThresholds, Severity};
use crate::metrics::MetricDelta;
use crossbeam::channel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A detector that did not produce a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorFailure {
    pub detector: String,
    pub error: String,
}

/// Aggregated output of all detectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorReport {
    /// Results in registry order (completed detectors only)
    pub results: Vec<DetectionResult>,
    pub failures: Vec<DetectorFailure>,
    /// Detectors still running when the deadline expired
    pub timed_out: Vec<String>,
    /// False when the deadline cut the run short
    pub complete: bool,
    pub theater_detected: bool,
    pub confidence: f64,
    pub severity: Severity,
    pub evidence: Vec<String>,
    pub recommendations: Vec<String>,
}

impl OrchestratorReport {
    fn aggregate(
        results: Vec<DetectionResult>,
        failures: Vec<DetectorFailure>,
        timed_out: Vec<String>,
    ) -> Self {
        let triggered: Vec<&DetectionResult> =
            results.iter().filter(|r| r.theater_detected).collect();
        let theater_detected = !triggered.is_empty();

        let pool: Vec<f64> = if theater_detected {
            triggered.iter().map(|r| r.confidence).collect()
        } else {
            results.iter().map(|r| r.confidence).collect()
        };
        let confidence = if pool.is_empty() {
            0.0
        } else {
            pool.iter().sum::<f64>() / pool.len() as f64
        };

        let severity = results
            .iter()
            .map(|r| r.severity)
            .max()
            .unwrap_or(Severity::Low);

        let mut seen = HashSet::new();
        let evidence = results
            .iter()
            .flat_map(|r| r.evidence.iter())
            .filter(|e| seen.insert(e.as_str()))
            .cloned()
            .collect();

        let mut seen = HashSet::new();
        let recommendations = results
            .iter()
            .flat_map(|r| r.recommendations.iter())
            .filter(|e| seen.insert(e.as_str()))
            .cloned()
            .collect();

        let complete = timed_out.is_empty();

        Self {
            results,
            failures,
            timed_out,
            complete,
            theater_detected,
            confidence,
            severity,
            evidence,
            recommendations,
        }
    }

    /// Triggered results, highest `severity × confidence` first
    pub fn ranked_triggered(&self) -> Vec<&DetectionResult> {
        let mut triggered: Vec<&DetectionResult> =
            self.results.iter().filter(|r| r.theater_detected).collect();
        triggered.sort_by(|a, b| {
            b.rank()
                .partial_cmp(&a.rank())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        triggered
    }

    pub fn result(&self, detector: &str) -> Option<&DetectionResult> {
        self.results.iter().find(|r| r.detector == detector)
    }
}

type Job = (usize, Arc<dyn Detector>);
type JobOutcome = (usize, String, Result<DetectionResult, DetectorError>);

/// Runs the detector registry
pub struct DetectorOrchestrator {
    detectors: Vec<Arc<dyn Detector>>,
    workers: usize,
    deadline: Option<Duration>,
}

impl DetectorOrchestrator {
    /// Orchestrator over an explicit detector set; pool size = detector count
    pub fn new(detectors: Vec<Arc<dyn Detector>>) -> Self {
        let workers = detectors.len().max(1);
        Self {
            detectors,
            workers,
            deadline: None,
        }
    }

    /// Orchestrator over the five built-in detectors
    pub fn with_defaults(thresholds: &DetectorThresholds) -> Self {
        Self::new(default_detectors(thresholds))
    }

    /// Bound the worker pool
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Return partial results once `deadline` has elapsed
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Run all detectors and aggregate
    pub fn run(&self, changes: &ChangeSet, delta: &MetricDelta) -> OrchestratorReport {
        let started = Instant::now();
        let changes = Arc::new(changes.clone());
        let delta = Arc::new(delta.clone());

        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (out_tx, out_rx) = channel::unbounded::<JobOutcome>();

        for (index, detector) in self.detectors.iter().enumerate() {
            // Receiver is alive in this scope, send cannot fail
            let _ = job_tx.send((index, Arc::clone(detector)));
        }
        drop(job_tx);

        let pool_size = self.workers.min(self.detectors.len()).max(1);
        for _ in 0..pool_size {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            let changes = Arc::clone(&changes);
            let delta = Arc::clone(&delta);
            thread::spawn(move || {
                for (index, detector) in job_rx.iter() {
                    let name = detector.name().to_string();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        detector.detect(&changes, &delta)
                    }))
                    .unwrap_or_else(|payload| {
                        Err(DetectorError::Panicked {
                            detector: name.clone(),
                            message: panic_message(payload.as_ref()),
                        })
                    });
                    if out_tx.send((index, name, outcome)).is_err() {
                        // Orchestrator stopped listening after its deadline
                        break;
                    }
                }
            });
        }
        drop(out_tx);

        let mut slots: Vec<Option<DetectionResult>> = vec![None; self.detectors.len()];
        let mut finished = vec![false; self.detectors.len()];
        let mut failures = Vec::new();
        let deadline_at = self.deadline.map(|d| started + d);

        loop {
            let received = match deadline_at {
                Some(at) => match out_rx.recv_deadline(at) {
                    Ok(outcome) => Some(outcome),
                    Err(channel::RecvTimeoutError::Timeout) => {
                        tracing::warn!(
                            "Detector deadline of {:?} expired; returning partial results",
                            self.deadline.unwrap_or_default()
                        );
                        None
                    }
                    Err(channel::RecvTimeoutError::Disconnected) => None,
                },
                None => out_rx.recv().ok(),
            };

            let Some((index, name, outcome)) = received else {
                break;
            };
            finished[index] = true;
            match outcome {
                Ok(result) => {
                    tracing::debug!(
                        detector = %name,
                        detected = result.theater_detected,
                        confidence = result.confidence,
                        "detector finished"
                    );
                    slots[index] = Some(result);
                }
                Err(e) => {
                    tracing::warn!("Detector {} failed and is excluded: {}", name, e);
                    failures.push(DetectorFailure {
                        detector: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        let timed_out = self
            .detectors
            .iter()
            .zip(finished.iter())
            .filter(|(_, done)| !**done)
            .map(|(d, _)| d.name().to_string())
            .collect();

        let results = slots.into_iter().flatten().collect();
        OrchestratorReport::aggregate(results, failures, timed_out)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::FileChange;

    struct Fixed {
        name: &'static str,
        detected: bool,
        confidence: f64,
        severity: Severity,
        evidence: &'static str,
    }

    impl Detector for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn detect(&self, _: &ChangeSet, _: &MetricDelta) -> Result<DetectionResult, DetectorError> {
            let mut r = DetectionResult::clean(self.name)
                .detected(self.detected)
                .with_evidence(self.evidence)
                .with_recommendation("shared recommendation");
            r.confidence = self.confidence;
            r.severity = self.severity;
            Ok(r)
        }
    }

    struct Failing;

    impl Detector for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&self, _: &ChangeSet, _: &MetricDelta) -> Result<DetectionResult, DetectorError> {
            Err(DetectorError::Computation {
                detector: "failing",
                reason: "boom".to_string(),
            })
        }
    }

    struct Panicking;

    impl Detector for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn detect(&self, _: &ChangeSet, _: &MetricDelta) -> Result<DetectionResult, DetectorError> {
            panic!("detector bug")
        }
    }

    struct Slow;

    impl Detector for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn detect(&self, _: &ChangeSet, _: &MetricDelta) -> Result<DetectionResult, DetectorError> {
            thread::sleep(Duration::from_millis(500));
            Ok(DetectionResult::clean("slow"))
        }
    }

    fn fixed(name: &'static str, detected: bool, confidence: f64, severity: Severity) -> Arc<dyn Detector> {
        Arc::new(Fixed {
            name,
            detected,
            confidence,
            severity,
            evidence: "same evidence",
        })
    }

    #[test]
    fn test_aggregation_rules() {
        let orchestrator = DetectorOrchestrator::new(vec![
            fixed("a", true, 0.8, Severity::High),
            fixed("b", true, 0.6, Severity::Medium),
            fixed("c", false, 0.1, Severity::Critical),
        ]);
        let report = orchestrator.run(&ChangeSet::default(), &MetricDelta::default());

        assert!(report.complete);
        assert!(report.theater_detected);
        assert!((report.confidence - 0.7).abs() < 1e-9);
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.evidence, vec!["same evidence".to_string()]);
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].detector, "a");
    }

    #[test]
    fn test_confidence_falls_back_to_all_when_none_triggered() {
        let orchestrator = DetectorOrchestrator::new(vec![
            fixed("a", false, 0.2, Severity::Low),
            fixed("b", false, 0.4, Severity::Low),
        ]);
        let report = orchestrator.run(&ChangeSet::default(), &MetricDelta::default());
        assert!(!report.theater_detected);
        assert!((report.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_failures_are_excluded_not_fatal() {
        let orchestrator = DetectorOrchestrator::new(vec![
            fixed("a", true, 0.9, Severity::High),
            Arc::new(Failing),
            Arc::new(Panicking),
        ]);
        let report = orchestrator.run(&ChangeSet::default(), &MetricDelta::default());
        assert!(report.complete);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.theater_detected);
        assert!((report.confidence - 0.9).abs() < 1e-9);
        let panicked = report
            .failures
            .iter()
            .find(|f| f.detector == "panicking")
            .unwrap();
        assert!(panicked.error.contains("detector bug"));
    }

    #[test]
    fn test_deadline_returns_partial_results() {
        let orchestrator = DetectorOrchestrator::new(vec![
            fixed("fast", true, 0.9, Severity::High),
            Arc::new(Slow),
        ])
        .with_deadline(Duration::from_millis(100));
        let report = orchestrator.run(&ChangeSet::default(), &MetricDelta::default());
        assert!(!report.complete);
        assert_eq!(report.timed_out, vec!["slow".to_string()]);
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn test_single_worker_still_runs_everything() {
        let orchestrator = DetectorOrchestrator::with_defaults(&DetectorThresholds::default())
            .with_workers(1);
        let changes = ChangeSet::new(vec![FileChange::new("src/a.rs", "+let x = f();")]);
        let report = orchestrator.run(&changes, &MetricDelta::default());
        assert_eq!(report.results.len(), 5);
        assert!(report.failures.is_empty());
    }
}
