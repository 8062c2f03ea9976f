//! Signing capability consumed by the evidence collector
//!
//! The collector never manages key material itself; callers hand it a
//! [`Signer`] and the matching [`SignatureVerifier`]. Auditors only need the
//! verifier, rebuilt from the hex public key shipped with every package.

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use ed25519_dalek::{Signer as _, Verifier as _};
use rand::RngCore;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signing failed: {0}")]
    Failed(String),
}

pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError>;
}

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;

    /// Hex public key exported alongside packages
    fn public_key_hex(&self) -> String;
}

pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// Fresh key from the OS RNG, for ephemeral use
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// 64 hex chars of secret seed
    pub fn from_hex(secret: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(secret.trim()).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SigningError::InvalidKey(format!("expected 32-byte seed, got {} bytes", bytes.len()))
        })?;
        Ok(Self::from_seed(&seed))
    }

    pub fn from_hex_file(path: &Path) -> Result<Self, SigningError> {
        let secret = std::fs::read_to_string(path).map_err(|source| SigningError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_hex(&secret)
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier {
            key: self.key.verifying_key(),
        }
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn from_hex(public: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(public.trim()).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let raw: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SigningError::InvalidKey(format!("expected 32-byte public key, got {} bytes", bytes.len()))
        })?;
        let key = VerifyingKey::from_bytes(&raw).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match Signature::from_slice(signature) {
            Ok(sig) => self.key.verify(message, &sig).is_ok(),
            Err(_) => false,
        }
    }

    fn public_key_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }
}

/// Check a hex signature over `message`; malformed hex never verifies
pub fn verify_hex(verifier: &dyn SignatureVerifier, message: &[u8], signature_hex: &str) -> bool {
    match hex::decode(signature_hex) {
        Ok(signature) => verifier.verify(message, &signature),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = Ed25519Signer::from_seed(&[7u8; 32]);
        let verifier = signer.verifier();
        let signature = signer.sign(b"evidence").unwrap();
        assert!(verifier.verify(b"evidence", &signature));
        assert!(!verifier.verify(b"evidencf", &signature));
        assert!(!verifier.verify(b"evidence", &signature[..10]));
    }

    #[test]
    fn test_hex_round_trip() {
        let signer = Ed25519Signer::generate();
        let restored = Ed25519Signer::from_hex(&signer.secret_hex()).unwrap();
        let public = Ed25519Verifier::from_hex(&signer.verifier().public_key_hex()).unwrap();

        let signature = restored.sign(b"package").unwrap();
        assert!(public.verify(b"package", &signature));
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(matches!(
            Ed25519Signer::from_hex("abcd"),
            Err(SigningError::InvalidKey(_))
        ));
        assert!(Ed25519Verifier::from_hex("zz").is_err());
    }

    #[test]
    fn test_verify_hex_rejects_garbage() {
        let signer = Ed25519Signer::from_seed(&[1u8; 32]);
        assert!(!verify_hex(&signer.verifier(), b"m", "not-hex"));
        let good = hex::encode(signer.sign(b"m").unwrap());
        assert!(verify_hex(&signer.verifier(), b"m", &good));
    }
}
