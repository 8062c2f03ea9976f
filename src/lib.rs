//! Veracity - theater detection and reality validation for code-quality claims
//!
//! This library judges whether a change's reported metric improvements are
//! backed by the change itself. It runs a registry of theater detectors over a
//! pre-computed diff, tests the metric delta statistically, correlates both
//! into one verdict, and packages supporting evidence with signed,
//! hash-chained custody records for audit.

pub mod analyzer;
pub mod change_set;
pub mod cli;
pub mod config;
pub mod detectors;
pub mod evidence;
pub mod isolation_forest;
pub mod metrics;
pub mod orchestrator;
pub mod validation;
