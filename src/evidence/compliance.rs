// Rule-based compliance scoring
//
// Each standard is a fixed table of requirements. A requirement is a rule over
// the package contents (verified evidence, chain integrity, quality metrics,
// validation verdict). Score = met / total; the status follows the table's
// pass threshold.

use crate::evidence::types::{
    ChainVerification, ComplianceCertification, ComplianceStatus, EvidenceItem, EvidenceType,
    SecurityScanSummary, ValidationSummary, VerificationStatus,
};
use crate::metrics::MetricSnapshot;
use serde::{Deserialize, Serialize};

/// Score at or above which a standard is partially compliant
const PARTIAL_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequirementRule {
    /// At least one verified item of this type
    EvidencePresent { evidence_type: EvidenceType },
    /// Chain integrity score at or above `min`
    IntegrityAtLeast { min: f64 },
    /// Every item carries at least one custody event
    CustodyRecorded,
    /// Reality validation ran and found the change genuine
    ValidationGenuine,
    MetricAtLeast { metric: String, min: f64 },
    MetricAtMost { metric: String, max: f64 },
    /// Verified security scans exist and none reports high/critical findings
    SecurityScanClean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub description: String,
    pub rule: RequirementRule,
}

impl Requirement {
    fn new(id: &str, description: &str, rule: RequirementRule) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            rule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceTable {
    pub standard: String,
    /// Score needed for `compliant`
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    pub requirements: Vec<Requirement>,
}

fn default_pass_threshold() -> f64 {
    1.0
}

/// What the rules are evaluated against
pub struct ComplianceContext<'a> {
    pub items: &'a [EvidenceItem],
    pub chain: &'a ChainVerification,
    pub metrics: &'a MetricSnapshot,
    pub validation: Option<&'a ValidationSummary>,
}

impl ComplianceContext<'_> {
    fn verified(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items
            .iter()
            .filter(|i| i.verification_status == VerificationStatus::Verified)
    }

    fn satisfies(&self, rule: &RequirementRule) -> bool {
        match rule {
            RequirementRule::EvidencePresent { evidence_type } => {
                self.verified().any(|i| i.evidence_type == *evidence_type)
            }
            RequirementRule::IntegrityAtLeast { min } => {
                self.chain.total_items > 0 && self.chain.integrity_score >= *min
            }
            RequirementRule::CustodyRecorded => {
                !self.items.is_empty() && self.items.iter().all(|i| !i.chain_of_custody.is_empty())
            }
            RequirementRule::ValidationGenuine => self.validation.is_some_and(|v| v.is_genuine),
            RequirementRule::MetricAtLeast { metric, min } => {
                self.metrics.get(metric).is_some_and(|v| v >= *min)
            }
            RequirementRule::MetricAtMost { metric, max } => {
                self.metrics.get(metric).is_some_and(|v| v <= *max)
            }
            RequirementRule::SecurityScanClean => {
                let scans: Vec<&EvidenceItem> = self
                    .verified()
                    .filter(|i| i.evidence_type == EvidenceType::SecurityScan)
                    .collect();
                !scans.is_empty()
                    && scans.iter().all(|item| {
                        serde_json::from_value::<SecurityScanSummary>(item.content.clone())
                            .map(|scan| scan.is_clean())
                            .unwrap_or(false)
                    })
            }
        }
    }
}

impl ComplianceTable {
    pub fn certify(&self, ctx: &ComplianceContext<'_>) -> ComplianceCertification {
        let (met, missed): (Vec<&Requirement>, Vec<&Requirement>) =
            self.requirements.iter().partition(|r| ctx.satisfies(&r.rule));

        let score = if self.requirements.is_empty() {
            0.0
        } else {
            met.len() as f64 / self.requirements.len() as f64
        };
        let status = if !self.requirements.is_empty() && score >= self.pass_threshold {
            ComplianceStatus::Compliant
        } else if score >= PARTIAL_THRESHOLD {
            ComplianceStatus::PartiallyCompliant
        } else {
            ComplianceStatus::NonCompliant
        };

        ComplianceCertification {
            standard: self.standard.clone(),
            status,
            score,
            requirements_met: met.iter().map(|r| r.id.clone()).collect(),
            requirements_missed: missed.iter().map(|r| r.id.clone()).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.standard.trim().is_empty() {
            return Err("compliance table needs a standard name".to_string());
        }
        if self.requirements.is_empty() {
            return Err(format!("{} has no requirements", self.standard));
        }
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(format!(
                "{} pass_threshold must be in [0, 1], got {}",
                self.standard, self.pass_threshold
            ));
        }
        Ok(())
    }
}

pub fn certify_all(tables: &[ComplianceTable], ctx: &ComplianceContext<'_>) -> Vec<ComplianceCertification> {
    tables.iter().map(|t| t.certify(ctx)).collect()
}

/// SOC2, ISO27001, NIST-SSDF and NASA-POT10 tables
pub fn default_tables() -> Vec<ComplianceTable> {
    use RequirementRule as R;

    vec![
        ComplianceTable {
            standard: "SOC2".to_string(),
            pass_threshold: 1.0,
            requirements: vec![
                Requirement::new(
                    "CC8.1",
                    "Changes are documented before deployment",
                    R::EvidencePresent {
                        evidence_type: EvidenceType::CodeChange,
                    },
                ),
                Requirement::new(
                    "CC8.1-T",
                    "Changes are tested before deployment",
                    R::EvidencePresent {
                        evidence_type: EvidenceType::TestResult,
                    },
                ),
                Requirement::new("CC7.1", "Vulnerabilities are monitored", R::SecurityScanClean),
                Requirement::new(
                    "CC6.1",
                    "Evidence integrity is protected",
                    R::IntegrityAtLeast { min: 1.0 },
                ),
                Requirement::new("CC4.1", "Control activities are traceable", R::CustodyRecorded),
            ],
        },
        ComplianceTable {
            standard: "ISO27001".to_string(),
            pass_threshold: 1.0,
            requirements: vec![
                Requirement::new(
                    "A.8.32",
                    "Change management",
                    R::EvidencePresent {
                        evidence_type: EvidenceType::CodeChange,
                    },
                ),
                Requirement::new("A.8.29", "Security testing in development", R::SecurityScanClean),
                Requirement::new("A.8.28", "Secure coding", R::ValidationGenuine),
                Requirement::new(
                    "A.5.33",
                    "Protection of records",
                    R::IntegrityAtLeast { min: 1.0 },
                ),
            ],
        },
        ComplianceTable {
            standard: "NIST-SSDF".to_string(),
            pass_threshold: 1.0,
            requirements: vec![
                Requirement::new("PW.7", "Review code for quality claims", R::ValidationGenuine),
                Requirement::new(
                    "PW.8",
                    "Test executable code",
                    R::EvidencePresent {
                        evidence_type: EvidenceType::TestResult,
                    },
                ),
                Requirement::new(
                    "PS.2",
                    "Provide a mechanism to verify integrity",
                    R::IntegrityAtLeast { min: 1.0 },
                ),
                Requirement::new("RV.1", "Identify vulnerabilities", R::SecurityScanClean),
            ],
        },
        ComplianceTable {
            standard: "NASA-POT10".to_string(),
            pass_threshold: 1.0,
            requirements: vec![
                Requirement::new(
                    "POT-4",
                    "Functions stay small and simple",
                    R::MetricAtMost {
                        metric: "complexity".to_string(),
                        max: 10.0,
                    },
                ),
                Requirement::new(
                    "POT-5",
                    "Assertion density backed by tests",
                    R::MetricAtLeast {
                        metric: "coverage".to_string(),
                        min: 0.8,
                    },
                ),
                Requirement::new(
                    "POT-10",
                    "Code compiles and tests pass with all checks on",
                    R::EvidencePresent {
                        evidence_type: EvidenceType::TestResult,
                    },
                ),
                Requirement::new("POT-R", "Improvement is real", R::ValidationGenuine),
            ],
        },
    ]
}
