//! Hash-chained chain of custody
//!
//! Every event hashes its own fields together with the previous event's hash,
//! so removing, reordering or editing any event breaks every hash after it.

use crate::evidence::signing::{verify_hex, SignatureVerifier};
use crate::evidence::types::{ChainVerification, CustodyEvent, EvidenceItem, RejectedItem};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("chain of custody is empty")]
    Empty,

    #[error("custody sequence gap at position {position}: found {found}")]
    SequenceGap { position: usize, found: u64 },

    #[error("hash chain mismatch at sequence {sequence}")]
    HashChainMismatch { sequence: u64 },

    #[error("entry hash mismatch at sequence {sequence}")]
    EntryHashMismatch { sequence: u64 },

    #[error("custody timestamp goes backwards at sequence {sequence}")]
    TimestampRegression { sequence: u64 },
}

fn entry_hash(
    evidence_id: &Uuid,
    sequence: u64,
    action: &str,
    actor: &str,
    timestamp: &DateTime<Utc>,
    details: &str,
    previous_hash: Option<&str>,
) -> String {
    #[derive(Serialize)]
    struct EntryPreimage<'a> {
        evidence_id: &'a Uuid,
        sequence: u64,
        action: &'a str,
        actor: &'a str,
        timestamp: &'a DateTime<Utc>,
        details: &'a str,
        previous_hash: Option<&'a str>,
    }

    let bytes = serde_json::to_vec(&EntryPreimage {
        evidence_id,
        sequence,
        action,
        actor,
        timestamp,
        details,
        previous_hash,
    })
    .unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Append an event to the item's chain; timestamps never go backwards
pub fn append_event(item: &mut EvidenceItem, action: &str, actor: &str, details: &str) -> CustodyEvent {
    let last = item.chain_of_custody.last();
    let floor = last.map_or(item.timestamp, |e| e.timestamp);
    let timestamp = Utc::now().max(floor);
    let sequence = last.map_or(0, |e| e.sequence + 1);
    let previous_hash = last.map(|e| e.entry_hash.clone());

    let event = CustodyEvent {
        sequence,
        action: action.to_string(),
        actor: actor.to_string(),
        timestamp,
        details: details.to_string(),
        entry_hash: entry_hash(
            &item.evidence_id,
            sequence,
            action,
            actor,
            &timestamp,
            details,
            previous_hash.as_deref(),
        ),
        previous_hash,
    };
    item.chain_of_custody.push(event.clone());
    event
}

/// Check links, hashes and timestamp order of an item's custody chain
pub fn verify_custody_chain(item: &EvidenceItem) -> Result<(), CustodyError> {
    if item.chain_of_custody.is_empty() {
        return Err(CustodyError::Empty);
    }

    let mut previous: Option<&CustodyEvent> = None;
    for (position, event) in item.chain_of_custody.iter().enumerate() {
        if event.sequence != position as u64 {
            return Err(CustodyError::SequenceGap {
                position,
                found: event.sequence,
            });
        }

        let expected_prev = previous.map(|e| e.entry_hash.as_str());
        if event.previous_hash.as_deref() != expected_prev {
            return Err(CustodyError::HashChainMismatch {
                sequence: event.sequence,
            });
        }

        let recomputed = entry_hash(
            &item.evidence_id,
            event.sequence,
            &event.action,
            &event.actor,
            &event.timestamp,
            &event.details,
            event.previous_hash.as_deref(),
        );
        if recomputed != event.entry_hash {
            return Err(CustodyError::EntryHashMismatch {
                sequence: event.sequence,
            });
        }

        let floor = previous.map_or(item.timestamp, |e| e.timestamp);
        if event.timestamp < floor {
            return Err(CustodyError::TimestampRegression {
                sequence: event.sequence,
            });
        }
        previous = Some(event);
    }
    Ok(())
}

/// Content hash, signature, then custody chain; first failure wins
pub fn verify_item(item: &EvidenceItem, verifier: &dyn SignatureVerifier) -> Result<(), String> {
    if !item.content_intact() {
        return Err("content does not match content hash".to_string());
    }
    if !verify_hex(verifier, &item.signing_message(), &item.digital_signature) {
        return Err("invalid digital signature".to_string());
    }
    verify_custody_chain(item).map_err(|e| e.to_string())
}

/// Verify every item independently and score the share that passed
pub fn verify_chain_integrity(
    items: &[EvidenceItem],
    verifier: &dyn SignatureVerifier,
) -> ChainVerification {
    let rejected: Vec<RejectedItem> = items
        .iter()
        .filter_map(|item| {
            verify_item(item, verifier).err().map(|reason| RejectedItem {
                evidence_id: item.evidence_id,
                reason,
            })
        })
        .collect();

    let total_items = items.len();
    let verified_items = total_items - rejected.len();
    let integrity_score = if total_items == 0 {
        0.0
    } else {
        verified_items as f64 / total_items as f64
    };

    ChainVerification {
        total_items,
        verified_items,
        rejected,
        integrity_score,
        verified_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::signing::{Ed25519Signer, Signer};
    use crate::evidence::types::{content_hash, EvidenceType, VerificationStatus};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn signed_item(signer: &Ed25519Signer) -> EvidenceItem {
        let content = json!({"files": 1});
        let mut item = EvidenceItem {
            evidence_id: Uuid::new_v4(),
            evidence_type: EvidenceType::CodeChange,
            timestamp: Utc::now(),
            source_location: "src/lib.rs".to_string(),
            content_hash: content_hash(&content),
            content,
            metadata: BTreeMap::new(),
            chain_of_custody: Vec::new(),
            verification_status: VerificationStatus::Pending,
            digital_signature: String::new(),
        };
        item.digital_signature = hex::encode(signer.sign(&item.signing_message()).unwrap());
        append_event(&mut item, "collected", "ci", "");
        item
    }

    #[test]
    fn test_chain_links() {
        let signer = Ed25519Signer::from_seed(&[3u8; 32]);
        let mut item = signed_item(&signer);
        append_event(&mut item, "verified", "auditor", "package review");
        append_event(&mut item, "exported", "auditor", "");

        let chain = &item.chain_of_custody;
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].previous_hash, None);
        assert_eq!(chain[2].previous_hash.as_deref(), Some(chain[1].entry_hash.as_str()));
        assert!(verify_custody_chain(&item).is_ok());
    }

    #[test]
    fn test_edited_event_breaks_chain() {
        let signer = Ed25519Signer::from_seed(&[3u8; 32]);
        let mut item = signed_item(&signer);
        append_event(&mut item, "verified", "auditor", "");
        item.chain_of_custody[0].actor = "someone-else".to_string();
        assert_eq!(
            verify_custody_chain(&item),
            Err(CustodyError::EntryHashMismatch { sequence: 0 })
        );
    }

    #[test]
    fn test_removed_event_breaks_chain() {
        let signer = Ed25519Signer::from_seed(&[3u8; 32]);
        let mut item = signed_item(&signer);
        append_event(&mut item, "verified", "auditor", "");
        append_event(&mut item, "exported", "auditor", "");
        item.chain_of_custody.remove(1);
        assert!(matches!(
            verify_custody_chain(&item),
            Err(CustodyError::SequenceGap { position: 1, found: 2 })
        ));
    }

    #[test]
    fn test_empty_chain_rejected() {
        let signer = Ed25519Signer::from_seed(&[3u8; 32]);
        let mut item = signed_item(&signer);
        item.chain_of_custody.clear();
        assert_eq!(verify_custody_chain(&item), Err(CustodyError::Empty));
    }

    #[test]
    fn test_integrity_degrades_per_item() {
        let signer = Ed25519Signer::from_seed(&[5u8; 32]);
        let verifier = signer.verifier();
        let mut items: Vec<EvidenceItem> = (0..4).map(|_| signed_item(&signer)).collect();
        items[2].content = json!({"files": 99});

        let verification = verify_chain_integrity(&items, &verifier);
        assert_eq!(verification.verified_items, 3);
        assert_eq!(verification.rejected.len(), 1);
        assert_eq!(verification.rejected[0].evidence_id, items[2].evidence_id);
        assert!((verification.integrity_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let signer = Ed25519Signer::from_seed(&[5u8; 32]);
        let other = Ed25519Signer::from_seed(&[6u8; 32]);
        let item = signed_item(&other);
        let reason = verify_item(&item, &signer.verifier()).unwrap_err();
        assert!(reason.contains("signature"));
    }
}
