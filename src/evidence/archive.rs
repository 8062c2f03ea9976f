//! `.tar.gz` export of a signed audit package
//!
//! Layout:
//!
//! ```text
//! evidence/<evidence_id>.json   one file per item
//! package.json                  the full signed package
//! public_key.hex                verifier key
//! VERIFICATION.txt              verification summary at export time
//! ```
//!
//! [`verify_archive`] needs nothing but the archive itself.

use crate::evidence::custody::verify_chain_integrity;
use crate::evidence::signing::{Ed25519Verifier, SignatureVerifier};
use crate::evidence::types::{AuditPackage, EvidenceItem, VerificationStatus};
use crate::evidence::{verify_package_signature, EvidenceError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Result of re-verifying an exported archive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveVerification {
    pub package_id: String,
    pub package_signature_valid: bool,
    pub items_total: usize,
    pub items_verified: usize,
    pub integrity_score: f64,
    pub problems: Vec<String>,
}

impl ArchiveVerification {
    pub fn is_valid(&self) -> bool {
        self.package_signature_valid && self.problems.is_empty()
    }

    pub fn to_report_string(&self) -> String {
        let mut report = String::new();
        if self.is_valid() {
            report.push_str("✅ Archive verified\n\n");
        } else {
            report.push_str("❌ Archive verification FAILED\n\n");
        }
        report.push_str(&format!("Package: {}\n", self.package_id));
        report.push_str(&format!(
            "Package signature: {}\n",
            if self.package_signature_valid { "valid" } else { "INVALID" }
        ));
        report.push_str(&format!(
            "Evidence: {}/{} verified (integrity {:.2})\n",
            self.items_verified, self.items_total, self.integrity_score
        ));
        for problem in &self.problems {
            report.push_str(&format!("  - {}\n", problem));
        }
        report
    }
}

fn verification_text(package: &AuditPackage, public_key: &str) -> String {
    let mut text = String::new();
    text.push_str(&format!("Audit package {}\n", package.package_id));
    text.push_str(&format!("Scope: {}\n", package.scope));
    text.push_str(&format!("Created: {}\n", package.created_at.to_rfc3339()));
    text.push_str(&format!("Retained until: {}\n", package.retention_until.to_rfc3339()));
    text.push_str(&format!("Package hash (SHA-256): {}\n", package.package_hash));
    text.push_str(&format!("Public key (Ed25519): {}\n", public_key));
    text.push_str(&format!(
        "Chain integrity: {}/{} ({:.2})\n",
        package.chain_verification.verified_items,
        package.chain_verification.total_items,
        package.chain_verification.integrity_score
    ));
    for cert in &package.certifications {
        text.push_str(&format!(
            "{}: {} (score {:.2})\n",
            cert.standard,
            cert.status.as_str(),
            cert.score
        ));
    }
    text.push_str("\nTo verify: veracity verify-archive <this archive>\n");
    text
}

fn append_file<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    bytes: &[u8],
    mtime: u64,
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_cksum();
    builder.append_data(&mut header, path, bytes)
}

/// Write the package as a gzip-compressed tarball
pub fn export_package(
    package: &AuditPackage,
    verifier: &dyn SignatureVerifier,
    path: &Path,
) -> Result<(), EvidenceError> {
    let file = File::create(path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let mtime = package.created_at.timestamp().max(0) as u64;

    for item in &package.evidence {
        let body = serde_json::to_vec_pretty(item)?;
        append_file(
            &mut builder,
            &format!("evidence/{}.json", item.evidence_id),
            &body,
            mtime,
        )?;
    }
    append_file(&mut builder, "package.json", &serde_json::to_vec_pretty(package)?, mtime)?;

    let public_key = verifier.public_key_hex();
    append_file(&mut builder, "public_key.hex", public_key.as_bytes(), mtime)?;
    append_file(
        &mut builder,
        "VERIFICATION.txt",
        verification_text(package, &public_key).as_bytes(),
        mtime,
    )?;

    builder.into_inner()?.finish()?;
    tracing::info!(
        package_id = %package.package_id,
        path = %path.display(),
        items = package.evidence.len(),
        "exported audit package"
    );
    Ok(())
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, EvidenceError> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
    let mut files = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut body = Vec::new();
        entry.read_to_end(&mut body)?;
        files.insert(name, body);
    }
    Ok(files)
}

/// Re-verify an exported archive using only its bundled public key
pub fn verify_archive(path: &Path) -> Result<ArchiveVerification, EvidenceError> {
    let files = read_entries(path)?;

    let package_bytes = files
        .get("package.json")
        .ok_or_else(|| EvidenceError::Archive("missing package.json".to_string()))?;
    let package: AuditPackage = serde_json::from_slice(package_bytes)?;

    let key_bytes = files
        .get("public_key.hex")
        .ok_or_else(|| EvidenceError::Archive("missing public_key.hex".to_string()))?;
    let verifier = Ed25519Verifier::from_hex(&String::from_utf8_lossy(key_bytes))?;

    let mut problems = Vec::new();
    let package_signature_valid = verify_package_signature(&package, &verifier);
    if !package_signature_valid {
        problems.push("package hash or signature does not verify".to_string());
    }

    for item in &package.evidence {
        let name = format!("evidence/{}.json", item.evidence_id);
        match files.get(&name) {
            None => problems.push(format!("{} missing from archive", name)),
            Some(bytes) => {
                let matches = serde_json::from_slice::<EvidenceItem>(bytes)
                    .map(|archived| archived == *item)
                    .unwrap_or(false);
                if !matches {
                    problems.push(format!("{} differs from package.json", name));
                }
            }
        }
    }

    // Items the package already marked rejected are expected to fail
    let chain = verify_chain_integrity(&package.evidence, &verifier);
    for rejected in &chain.rejected {
        let claimed_verified = package.evidence.iter().any(|i| {
            i.evidence_id == rejected.evidence_id
                && i.verification_status == VerificationStatus::Verified
        });
        if claimed_verified {
            problems.push(format!("evidence {}: {}", rejected.evidence_id, rejected.reason));
        }
    }

    Ok(ArchiveVerification {
        package_id: package.package_id.to_string(),
        package_signature_valid,
        items_total: chain.total_items,
        items_verified: chain.verified_items,
        integrity_score: chain.integrity_score,
        problems,
    })
}
