// Check 2: evidence quality
//
// Each file change is placed in one of eight evidence categories. The category
// weights express how much a line of that kind can plausibly move quality
// metrics. Claims are then matched against the categories actually present.

use crate::change_set::{ChangeCategory, ChangeSet, FileChange};
use crate::detectors::{classify_line, OptimizationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Eight-way evidence categorisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    Structural,
    Algorithmic,
    Cosmetic,
    Configuration,
    Documentation,
    Test,
    Dependency,
    Refactoring,
}

impl EvidenceCategory {
    pub fn weight(&self) -> f64 {
        match self {
            EvidenceCategory::Structural => 0.9,
            EvidenceCategory::Algorithmic => 1.0,
            EvidenceCategory::Cosmetic => 0.05,
            EvidenceCategory::Configuration => 0.3,
            EvidenceCategory::Documentation => 0.2,
            EvidenceCategory::Test => 0.7,
            EvidenceCategory::Dependency => 0.4,
            EvidenceCategory::Refactoring => 0.7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceCategory::Structural => "structural",
            EvidenceCategory::Algorithmic => "algorithmic",
            EvidenceCategory::Cosmetic => "cosmetic",
            EvidenceCategory::Configuration => "configuration",
            EvidenceCategory::Documentation => "documentation",
            EvidenceCategory::Test => "test",
            EvidenceCategory::Dependency => "dependency",
            EvidenceCategory::Refactoring => "refactoring",
        }
    }

    /// Categories whose lines count as substantive work
    pub fn is_substantive(&self) -> bool {
        matches!(
            self,
            EvidenceCategory::Structural
                | EvidenceCategory::Algorithmic
                | EvidenceCategory::Refactoring
                | EvidenceCategory::Test
                | EvidenceCategory::Dependency
        )
    }
}

/// Behavioural claim categories recognised in claims and descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Performance,
    Reliability,
    Maintainability,
    Security,
}

const CLAIM_KEYWORDS: &[(ClaimType, &[&str])] = &[
    (
        ClaimType::Performance,
        &["perf", "fast", "speed", "latency", "throughput", "optimi", "efficien"],
    ),
    (
        ClaimType::Reliability,
        &["reliab", "coverage", "test", "robust", "stabil", "bug", "crash"],
    ),
    (
        ClaimType::Maintainability,
        &["maintainab", "readab", "complexity", "refactor", "clean", "simplif", "debt"],
    ),
    (
        ClaimType::Security,
        &["secur", "vulnerab", "cve", "auth", "sanitiz", "injection"],
    ),
];

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Performance => "performance",
            ClaimType::Reliability => "reliability",
            ClaimType::Maintainability => "maintainability",
            ClaimType::Security => "security",
        }
    }

    /// Claim types mentioned in free text
    pub fn extract(text: &str) -> Vec<ClaimType> {
        let lower = text.to_lowercase();
        CLAIM_KEYWORDS
            .iter()
            .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(claim, _)| *claim)
            .collect()
    }

    /// Evidence categories able to back this claim
    pub fn supporting_categories(&self) -> &'static [EvidenceCategory] {
        match self {
            ClaimType::Performance => &[EvidenceCategory::Algorithmic, EvidenceCategory::Structural],
            ClaimType::Reliability => &[EvidenceCategory::Test, EvidenceCategory::Structural],
            ClaimType::Maintainability => &[
                EvidenceCategory::Refactoring,
                EvidenceCategory::Structural,
                EvidenceCategory::Algorithmic,
            ],
            ClaimType::Security => &[
                EvidenceCategory::Dependency,
                EvidenceCategory::Structural,
                EvidenceCategory::Configuration,
            ],
        }
    }
}

/// Evidence category of one file change
pub fn categorize(change: &FileChange) -> EvidenceCategory {
    match change.category {
        ChangeCategory::Cosmetic => EvidenceCategory::Cosmetic,
        ChangeCategory::Test => EvidenceCategory::Test,
        ChangeCategory::Documentation => EvidenceCategory::Documentation,
        ChangeCategory::Config => EvidenceCategory::Configuration,
        ChangeCategory::Dependency => EvidenceCategory::Dependency,
        ChangeCategory::Structural => {
            let algorithmic = change
                .added()
                .any(|l| classify_line(l) == Some(OptimizationKind::Algorithmic));
            if algorithmic {
                EvidenceCategory::Algorithmic
            } else if change.lines_removed > 0 && change.lines_added <= change.lines_removed {
                EvidenceCategory::Refactoring
            } else {
                EvidenceCategory::Structural
            }
        }
    }
}

/// Changed lines per evidence category
pub fn category_lines(changes: &ChangeSet) -> BTreeMap<EvidenceCategory, usize> {
    let mut lines = BTreeMap::new();
    for change in changes {
        *lines.entry(categorize(change)).or_insert(0) += change.changed_lines();
    }
    lines
}

/// Outcome of check 2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceQuality {
    pub score: f64,
    /// Line-weighted mean category weight
    pub meaningful_ratio: f64,
    /// Share of typed claims backed by a present category
    pub claim_alignment: f64,
    pub category_lines: BTreeMap<String, usize>,
    pub unsupported_claims: Vec<String>,
}

pub fn assess_evidence_quality(changes: &ChangeSet, claims: &[String]) -> EvidenceQuality {
    let lines = category_lines(changes);
    let total: usize = lines.values().sum();

    let meaningful_ratio = if total == 0 {
        0.0
    } else {
        lines
            .iter()
            .map(|(cat, n)| cat.weight() * *n as f64)
            .sum::<f64>()
            / total as f64
    };

    let present: Vec<EvidenceCategory> = lines
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(c, _)| *c)
        .collect();

    let mut typed = 0usize;
    let mut supported = 0usize;
    let mut unsupported_claims = Vec::new();
    for claim in claims {
        let types = ClaimType::extract(claim);
        if types.is_empty() {
            continue;
        }
        typed += 1;
        let backed = types.iter().any(|t| {
            t.supporting_categories()
                .iter()
                .any(|c| present.contains(c))
        });
        if backed {
            supported += 1;
        } else {
            unsupported_claims.push(claim.clone());
        }
    }
    let claim_alignment = if typed == 0 {
        0.5
    } else {
        supported as f64 / typed as f64
    };

    let score = (0.6 * meaningful_ratio + 0.4 * claim_alignment).clamp(0.0, 1.0);

    EvidenceQuality {
        score,
        meaningful_ratio,
        claim_alignment,
        category_lines: lines
            .into_iter()
            .map(|(c, n)| (c.as_str().to_string(), n))
            .collect(),
        unsupported_claims,
    }
}
