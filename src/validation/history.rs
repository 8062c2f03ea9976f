// Check 5: historical cross-validation
//
// A bounded store of prior verdicts. Readers never block each other; appends
// take the write lock and evict the oldest record once capacity is reached.

use crate::validation::evidence_quality::ClaimType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::RwLock;

/// A prior validation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    /// Directional improvement per metric
    pub improvements: BTreeMap<String, f64>,
    pub claims: BTreeSet<ClaimType>,
    pub is_genuine: bool,
}

impl VerdictRecord {
    /// 0.6 × metric-vector similarity + 0.4 × claim Jaccard
    pub fn similarity(&self, other: &VerdictRecord) -> f64 {
        0.6 * metric_similarity(&self.improvements, &other.improvements)
            + 0.4 * jaccard(&self.claims, &other.claims)
    }
}

/// `1 - mean |a - b| / 2` over the union of metric names (missing = 0)
pub fn metric_similarity(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    let names: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    if names.is_empty() {
        return 1.0;
    }
    let distance: f64 = names
        .iter()
        .map(|name| {
            let x = a.get(*name).copied().unwrap_or(0.0);
            let y = b.get(*name).copied().unwrap_or(0.0);
            (x - y).abs().min(2.0) / 2.0
        })
        .sum::<f64>()
        / names.len() as f64;
    1.0 - distance
}

pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Outcome of check 5
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalCheck {
    pub history_size: usize,
    pub similar_cases: usize,
    /// Genuine share among similar cases, when there are any
    pub genuine_share: Option<f64>,
    pub confidence_boost: f64,
}

/// Bounded prior-verdict store
#[derive(Debug)]
pub struct VerdictHistory {
    records: RwLock<VecDeque<VerdictRecord>>,
    capacity: usize,
}

impl VerdictHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append, evicting the oldest record when full
    pub fn record(&self, record: VerdictRecord) {
        // A poisoned lock still holds valid records
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Records with similarity above `threshold`
    pub fn similar(&self, query: &VerdictRecord, threshold: f64) -> Vec<VerdictRecord> {
        let records = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records
            .iter()
            .filter(|r| r.similarity(query) > threshold)
            .cloned()
            .collect()
    }

    /// Evaluate check 5 for `query`
    pub fn cross_validate(
        &self,
        query: &VerdictRecord,
        similarity_threshold: f64,
        min_cases: usize,
        genuine_share_threshold: f64,
        boost: f64,
    ) -> HistoricalCheck {
        let similar = self.similar(query, similarity_threshold);
        let genuine_share = if similar.is_empty() {
            None
        } else {
            Some(similar.iter().filter(|r| r.is_genuine).count() as f64 / similar.len() as f64)
        };
        let confidence_boost = match genuine_share {
            Some(share) if similar.len() >= min_cases && share > genuine_share_threshold => boost,
            _ => 0.0,
        };
        HistoricalCheck {
            history_size: self.len(),
            similar_cases: similar.len(),
            genuine_share,
            confidence_boost,
        }
    }
}
