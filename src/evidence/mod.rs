//! Evidence collection and signed audit packages
//!
//! Independent of detection and validation: callers hand the collector the
//! same inputs (and optionally the verdict) to get a signed, hash-chained
//! audit trail.
//!
//! - Every `collect_*` call builds an [`EvidenceItem`], appends a `collected`
//!   custody event, signs `id|content_hash|timestamp|type` and persists it.
//! - [`EvidenceCollector::create_audit_package`] verifies each item on its
//!   own. A failing item is marked `rejected` and lowers the integrity score;
//!   it never fails the package.
//! - [`verify_evidence_signature`], [`verify_chain_integrity`] and
//!   [`verify_package_signature`] are pure reads that need only the public key.
//!
//! # Example
//!
//! ```
//! use veracity::evidence::{EvidenceCollector, EvidenceConfig, EvidenceStore, Ed25519Signer};
//! use veracity::metrics::MetricSnapshot;
//!
//! let collector = EvidenceCollector::with_ed25519(
//!     Ed25519Signer::from_seed(&[42u8; 32]),
//!     EvidenceStore::in_memory().unwrap(),
//!     EvidenceConfig::default(),
//! );
//! let before = MetricSnapshot::new().with("coverage", 0.6);
//! let after = MetricSnapshot::new().with("coverage", 0.8);
//! let item = collector
//!     .collect_metric_improvement_evidence(&before, &after, "ci/metrics.json")
//!     .unwrap();
//! assert!(collector.verify_evidence_signature(&item));
//!
//! let package = collector
//!     .create_audit_package(&[item], "release-1.4", &after, None)
//!     .unwrap();
//! assert_eq!(package.chain_verification.integrity_score, 1.0);
//! ```

mod archive;
mod compliance;
mod config;
mod custody;
mod signing;
mod store;
mod types;

pub use archive::{export_package, verify_archive, ArchiveVerification};
pub use compliance::{certify_all, default_tables, ComplianceContext, ComplianceTable, Requirement, RequirementRule};
pub use config::EvidenceConfig;
pub use custody::{append_event, verify_chain_integrity, verify_custody_chain, verify_item, CustodyError};
pub use signing::{verify_hex, Ed25519Signer, Ed25519Verifier, SignatureVerifier, Signer, SigningError};
pub use store::{EvidenceStore, PurgeStats, StoreStats};
pub use types::{
    content_hash, AuditPackage, ChainVerification, ComplianceCertification, ComplianceStatus,
    CustodyEvent, EvidenceItem, EvidenceType, RejectedItem, SecurityFinding, SecurityScanSummary,
    TestRunSummary, ValidationSummary, VerificationStatus,
};

use crate::change_set::{ChangeSet, InputError};
use crate::detectors::Severity;
use crate::metrics::{MetricDelta, MetricSnapshot};
use crate::validation::ValidationResult;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EvidenceError {
    /// Store write failed twice, or a stored row is unreadable
    #[error("Evidence store failure: {0}")]
    Storage(String),

    #[error("Evidence serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Invalid audit archive: {0}")]
    Archive(String),

    #[error("Invalid evidence configuration: {0}")]
    Config(String),
}

/// Content hash intact and signature valid
pub fn verify_evidence_signature(item: &EvidenceItem, verifier: &dyn SignatureVerifier) -> bool {
    item.content_intact() && verify_hex(verifier, &item.signing_message(), &item.digital_signature)
}

/// Package hash recomputes and its signature verifies
pub fn verify_package_signature(package: &AuditPackage, verifier: &dyn SignatureVerifier) -> bool {
    package.compute_hash() == package.package_hash
        && verify_hex(verifier, package.package_hash.as_bytes(), &package.digital_signature)
}

pub struct EvidenceCollector {
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn SignatureVerifier>,
    store: EvidenceStore,
    config: EvidenceConfig,
    /// One lock per evidence id; writes to different items never contend
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl EvidenceCollector {
    pub fn new(
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn SignatureVerifier>,
        store: EvidenceStore,
        config: EvidenceConfig,
    ) -> Self {
        Self {
            signer,
            verifier,
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ed25519(signer: Ed25519Signer, store: EvidenceStore, config: EvidenceConfig) -> Self {
        let verifier = signer.verifier();
        Self::new(Arc::new(signer), Arc::new(verifier), store, config)
    }

    /// Build from configuration: key file (or an ephemeral key) and database
    pub fn open(config: EvidenceConfig) -> Result<Self, EvidenceError> {
        config.validate().map_err(EvidenceError::Config)?;

        let signer = match &config.signing_key_path {
            Some(path) => Ed25519Signer::from_hex_file(path)?,
            None => {
                tracing::warn!("no signing key configured, using an ephemeral key");
                Ed25519Signer::generate()
            }
        };
        let store = match &config.database_path {
            Some(path) => EvidenceStore::open(path)?,
            None => EvidenceStore::in_memory()?,
        }
        .with_retry_backoff(Duration::from_millis(config.retry_backoff_ms));

        Ok(Self::with_ed25519(signer, store, config))
    }

    pub fn config(&self) -> &EvidenceConfig {
        &self.config
    }

    pub fn store(&self) -> &EvidenceStore {
        &self.store
    }

    pub fn verifier(&self) -> &dyn SignatureVerifier {
        self.verifier.as_ref()
    }

    fn item_lock(&self, evidence_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(evidence_id).or_default().clone()
    }

    fn collect(
        &self,
        evidence_type: EvidenceType,
        source_location: &str,
        content: serde_json::Value,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<EvidenceItem, EvidenceError> {
        let mut item = EvidenceItem {
            evidence_id: Uuid::new_v4(),
            evidence_type,
            timestamp: Utc::now(),
            source_location: source_location.to_string(),
            content_hash: content_hash(&content),
            content,
            metadata,
            chain_of_custody: Vec::new(),
            verification_status: VerificationStatus::Pending,
            digital_signature: String::new(),
        };

        match self.signer.sign(&item.signing_message()) {
            Ok(signature) => item.digital_signature = hex::encode(signature),
            Err(e) => {
                tracing::warn!(evidence_id = %item.evidence_id, error = %e, "signing failed, item rejected");
                item.verification_status = VerificationStatus::Rejected;
            }
        }
        append_event(&mut item, "collected", &self.config.actor, source_location);

        let lock = self.item_lock(item.evidence_id);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        self.store.insert_item(&item)?;

        tracing::debug!(
            evidence_id = %item.evidence_id,
            evidence_type = evidence_type.as_str(),
            "collected evidence"
        );
        Ok(item)
    }

    pub fn collect_code_change_evidence(
        &self,
        changes: &ChangeSet,
        source_location: &str,
    ) -> Result<EvidenceItem, EvidenceError> {
        let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
        for change in changes {
            *categories.entry(change.category.as_str()).or_default() += 1;
        }
        let content = json!({
            "changes": changes,
            "total_changed_lines": changes.total_changed_lines(),
        });
        let metadata = BTreeMap::from([
            ("file_count".to_string(), json!(changes.len())),
            ("categories".to_string(), json!(categories)),
        ]);
        self.collect(EvidenceType::CodeChange, source_location, content, metadata)
    }

    pub fn collect_metric_improvement_evidence(
        &self,
        before: &MetricSnapshot,
        after: &MetricSnapshot,
        source_location: &str,
    ) -> Result<EvidenceItem, EvidenceError> {
        before.validate()?;
        after.validate()?;

        let delta = MetricDelta::between(before, after);
        let content = json!({
            "before": before,
            "after": after,
            "delta": delta,
        });
        let metadata = BTreeMap::from([
            ("changed_metrics".to_string(), json!(delta.changed_count())),
            ("mean_improvement".to_string(), json!(delta.mean_changed_improvement())),
            ("has_regression".to_string(), json!(delta.has_regression())),
        ]);
        self.collect(EvidenceType::MetricImprovement, source_location, content, metadata)
    }

    pub fn collect_test_result_evidence(
        &self,
        run: &TestRunSummary,
        source_location: &str,
    ) -> Result<EvidenceItem, EvidenceError> {
        let content = serde_json::to_value(run)?;
        let metadata = BTreeMap::from([
            ("pass_rate".to_string(), json!(run.pass_rate())),
            ("failed".to_string(), json!(run.failed)),
        ]);
        self.collect(EvidenceType::TestResult, source_location, content, metadata)
    }

    pub fn collect_security_scan_evidence(
        &self,
        scan: &SecurityScanSummary,
        source_location: &str,
    ) -> Result<EvidenceItem, EvidenceError> {
        let content = serde_json::to_value(scan)?;
        let metadata = BTreeMap::from([
            ("tool".to_string(), json!(scan.tool)),
            ("critical".to_string(), json!(scan.count(Severity::Critical))),
            ("high".to_string(), json!(scan.count(Severity::High))),
            ("clean".to_string(), json!(scan.is_clean())),
        ]);
        self.collect(EvidenceType::SecurityScan, source_location, content, metadata)
    }

    pub fn verify_evidence_signature(&self, item: &EvidenceItem) -> bool {
        verify_evidence_signature(item, self.verifier.as_ref())
    }

    pub fn verify_chain_integrity(&self, items: &[EvidenceItem]) -> ChainVerification {
        verify_chain_integrity(items, self.verifier.as_ref())
    }

    pub fn verify_package_signature(&self, package: &AuditPackage) -> bool {
        verify_package_signature(package, self.verifier.as_ref())
    }

    /// Verify, certify, hash, sign and persist a package over `items`
    pub fn create_audit_package(
        &self,
        items: &[EvidenceItem],
        scope: &str,
        metrics: &MetricSnapshot,
        validation: Option<&ValidationResult>,
    ) -> Result<AuditPackage, EvidenceError> {
        let package_id = Uuid::new_v4();
        let chain = self.verify_chain_integrity(items);
        let reasons: HashMap<Uuid, &str> = chain
            .rejected
            .iter()
            .map(|r| (r.evidence_id, r.reason.as_str()))
            .collect();

        let mut evidence = Vec::with_capacity(items.len());
        for original in items {
            let lock = self.item_lock(original.evidence_id);
            let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

            self.store.insert_item(original)?;
            let mut item = original.clone();
            // Extend the stored custody log, which may already hold events
            // from earlier packages that this copy never saw
            if let Some(stored) = self.store.load_item(item.evidence_id)? {
                item.chain_of_custody = stored.chain_of_custody;
            }
            let (status, action, details) = match reasons.get(&item.evidence_id) {
                Some(reason) => {
                    tracing::warn!(evidence_id = %item.evidence_id, reason, "evidence rejected");
                    (VerificationStatus::Rejected, "rejected", reason.to_string())
                }
                None => (
                    VerificationStatus::Verified,
                    "verified",
                    format!("audit package {}", package_id),
                ),
            };
            item.verification_status = status;
            let event = append_event(&mut item, action, &self.config.actor, &details);
            self.store.record_verification(item.evidence_id, status, &event)?;
            evidence.push(item);
        }

        let validation = validation.map(ValidationSummary::from);
        let certifications = certify_all(
            &self.config.compliance,
            &ComplianceContext {
                items: &evidence,
                chain: &chain,
                metrics,
                validation: validation.as_ref(),
            },
        );

        let created_at = Utc::now();
        let mut package = AuditPackage {
            package_id,
            created_at,
            scope: scope.to_string(),
            evidence,
            quality_metrics: metrics.clone(),
            validation,
            certifications,
            chain_verification: chain,
            package_hash: String::new(),
            digital_signature: String::new(),
            retention_until: created_at + ChronoDuration::days(self.config.retention_days),
        };
        package.package_hash = package.compute_hash();
        match self.signer.sign(package.package_hash.as_bytes()) {
            Ok(signature) => package.digital_signature = hex::encode(signature),
            Err(e) => tracing::warn!(package_id = %package_id, error = %e, "package left unsigned"),
        }

        self.store.insert_package(&package)?;
        tracing::info!(
            package_id = %package_id,
            items = package.chain_verification.total_items,
            integrity = package.chain_verification.integrity_score,
            "created audit package"
        );
        Ok(package)
    }

    pub fn export_package(&self, package: &AuditPackage, path: &Path) -> Result<(), EvidenceError> {
        export_package(package, self.verifier.as_ref(), path)
    }

    /// Apply the configured retention period
    pub fn purge_expired(&self) -> Result<PurgeStats, EvidenceError> {
        self.store.purge_expired(Utc::now(), self.config.retention_days)
    }
}
