//! Evidence data model

use crate::detectors::Severity;
use crate::metrics::MetricSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    CodeChange,
    MetricImprovement,
    TestResult,
    SecurityScan,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::CodeChange => "code_change",
            EvidenceType::MetricImprovement => "metric_improvement",
            EvidenceType::TestResult => "test_result",
            EvidenceType::SecurityScan => "security_scan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code_change" => Some(EvidenceType::CodeChange),
            "metric_improvement" => Some(EvidenceType::MetricImprovement),
            "test_result" => Some(EvidenceType::TestResult),
            "security_scan" => Some(EvidenceType::SecurityScan),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VerificationStatus::Pending),
            "verified" => Some(VerificationStatus::Verified),
            "rejected" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }
}

/// One hash-chained entry of an item's chain of custody
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyEvent {
    pub sequence: u64,
    pub action: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub evidence_id: Uuid,
    pub evidence_type: EvidenceType,
    pub timestamp: DateTime<Utc>,
    pub source_location: String,
    /// SHA-256 hex of the canonical JSON of `content`
    pub content_hash: String,
    pub content: serde_json::Value,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub chain_of_custody: Vec<CustodyEvent>,
    pub verification_status: VerificationStatus,
    /// Hex Ed25519 signature; empty when signing failed
    pub digital_signature: String,
}

impl EvidenceItem {
    /// Bytes covered by the item signature
    pub fn signing_message(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}",
            self.evidence_id,
            self.content_hash,
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            self.evidence_type.as_str()
        )
        .into_bytes()
    }

    /// True when `content` still hashes to `content_hash`
    pub fn content_intact(&self) -> bool {
        content_hash(&self.content) == self.content_hash
    }
}

/// SHA-256 hex over canonical (key-sorted) JSON
pub fn content_hash(content: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(content).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Summary of one test run, as handed over by the CI runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub coverage: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub failures: Vec<String>,
}

impl TestRunSummary {
    pub fn pass_rate(&self) -> f64 {
        let executed = self.passed + self.failed;
        if executed == 0 {
            0.0
        } else {
            self.passed as f64 / executed as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub id: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Output of one security scanner run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityScanSummary {
    pub tool: String,
    #[serde(default)]
    pub findings: Vec<SecurityFinding>,
}

impl SecurityScanSummary {
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// No high or critical findings
    pub fn is_clean(&self) -> bool {
        self.findings.iter().all(|f| f.severity < Severity::High)
    }
}

/// Why an item failed verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedItem {
    pub evidence_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub total_items: usize,
    pub verified_items: usize,
    pub rejected: Vec<RejectedItem>,
    /// `verified / total`, 0 for an empty package
    pub integrity_score: f64,
    pub verified_at: DateTime<Utc>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.total_items > 0 && self.rejected.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::PartiallyCompliant => "partially_compliant",
            ComplianceStatus::NonCompliant => "non_compliant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceCertification {
    pub standard: String,
    pub status: ComplianceStatus,
    pub score: f64,
    pub requirements_met: Vec<String>,
    pub requirements_missed: Vec<String>,
}

/// Verdict fields of a validation carried into a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub is_genuine: bool,
    pub confidence: f64,
    pub evidence_score: f64,
    pub statistical_significance: f64,
    pub input_hash: String,
}

impl From<&crate::validation::ValidationResult> for ValidationSummary {
    fn from(result: &crate::validation::ValidationResult) -> Self {
        Self {
            is_genuine: result.is_genuine,
            confidence: result.confidence,
            evidence_score: result.evidence_score,
            statistical_significance: result.statistical_significance,
            input_hash: result.input_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPackage {
    pub package_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scope: String,
    pub evidence: Vec<EvidenceItem>,
    pub quality_metrics: MetricSnapshot,
    pub validation: Option<ValidationSummary>,
    pub certifications: Vec<ComplianceCertification>,
    pub chain_verification: ChainVerification,
    pub package_hash: String,
    pub digital_signature: String,
    pub retention_until: DateTime<Utc>,
}

impl AuditPackage {
    /// SHA-256 hex over every field except the hash and signature
    pub fn compute_hash(&self) -> String {
        #[derive(Serialize)]
        struct PackagePreimage<'a> {
            package_id: &'a Uuid,
            created_at: &'a DateTime<Utc>,
            scope: &'a str,
            evidence: &'a [EvidenceItem],
            quality_metrics: &'a MetricSnapshot,
            validation: &'a Option<ValidationSummary>,
            certifications: &'a [ComplianceCertification],
            chain_verification: &'a ChainVerification,
            retention_until: &'a DateTime<Utc>,
        }

        let bytes = serde_json::to_vec(&PackagePreimage {
            package_id: &self.package_id,
            created_at: &self.created_at,
            scope: &self.scope,
            evidence: &self.evidence,
            quality_metrics: &self.quality_metrics,
            validation: &self.validation,
            certifications: &self.certifications,
            chain_verification: &self.chain_verification,
            retention_until: &self.retention_until,
        })
        .unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    pub fn certification(&self, standard: &str) -> Option<&ComplianceCertification> {
        self.certifications.iter().find(|c| c.standard == standard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_hash_ignores_key_order() {
        let a = json!({"a": 1, "b": [1, 2]});
        let b: serde_json::Value = serde_json::from_str(r#"{"b": [1, 2], "a": 1}"#).unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&json!({"a": 2, "b": [1, 2]})));
    }

    #[test]
    fn test_evidence_type_round_trip() {
        for t in [
            EvidenceType::CodeChange,
            EvidenceType::MetricImprovement,
            EvidenceType::TestResult,
            EvidenceType::SecurityScan,
        ] {
            assert_eq!(EvidenceType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EvidenceType::parse("screenshot"), None);
    }

    #[test]
    fn test_security_scan_clean() {
        let mut scan = SecurityScanSummary {
            tool: "cargo-audit".to_string(),
            findings: vec![SecurityFinding {
                id: "RUSTSEC-0000-0001".to_string(),
                severity: Severity::Medium,
                description: "unmaintained".to_string(),
                location: None,
            }],
        };
        assert!(scan.is_clean());
        scan.findings[0].severity = Severity::Critical;
        assert!(!scan.is_clean());
        assert_eq!(scan.count(Severity::Critical), 1);
    }

    #[test]
    fn test_pass_rate_ignores_skipped() {
        let run = TestRunSummary {
            total: 12,
            passed: 9,
            failed: 1,
            skipped: 2,
            ..Default::default()
        };
        assert!((run.pass_rate() - 0.9).abs() < 1e-12);
        assert_eq!(TestRunSummary::default().pass_rate(), 0.0);
    }
}
