// Check 4: behavioural validation
//
// Claimed behaviour categories are extracted from the description and the
// claim list, then each is checked against the metrics that would show it.

use crate::metrics::MetricDelta;
use crate::validation::evidence_quality::ClaimType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of check 4
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralCheck {
    pub score: f64,
    pub claimed: Vec<ClaimType>,
    pub supported: Vec<ClaimType>,
    pub unsupported: Vec<ClaimType>,
}

/// Claim types mentioned anywhere in the description or claims
pub fn claimed_types(description: &str, claims: &[String]) -> BTreeSet<ClaimType> {
    std::iter::once(description)
        .chain(claims.iter().map(String::as_str))
        .flat_map(ClaimType::extract)
        .collect()
}

/// Metric name fragments that evidence each claim type
fn metric_fragments(claim: ClaimType) -> &'static [&'static str] {
    match claim {
        ClaimType::Performance => &["perf", "latency", "throughput"],
        ClaimType::Reliability => &["coverage", "test", "reliab", "error_rate", "failure"],
        ClaimType::Maintainability => &["maintainab", "complexity", "duplication", "debt"],
        ClaimType::Security => &["secur", "vulnerab"],
    }
}

/// Whether any metric for `claim` improved
pub fn claim_supported(claim: ClaimType, delta: &MetricDelta) -> bool {
    let fragments = metric_fragments(claim);
    delta.changes.iter().any(|(name, change)| {
        let lower = name.to_ascii_lowercase();
        fragments.iter().any(|f| lower.contains(f)) && change.improvement > 0.0
    })
}

pub fn assess_behavior(description: &str, claims: &[String], delta: &MetricDelta) -> BehavioralCheck {
    let claimed = claimed_types(description, claims);
    let (supported, unsupported): (Vec<ClaimType>, Vec<ClaimType>) =
        claimed.iter().copied().partition(|c| claim_supported(*c, delta));

    let score = if claimed.is_empty() {
        0.5
    } else {
        supported.len() as f64 / claimed.len() as f64
    };

    BehavioralCheck {
        score,
        claimed: claimed.into_iter().collect(),
        supported,
        unsupported,
    }
}
