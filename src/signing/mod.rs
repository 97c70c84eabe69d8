// src/signing/mod.rs
//! Index signing and verification
//!
//! Indexes travel inside a signed container: a zip archive carrying the
//! payload, the signer's certificate and an Ed25519 signature over the
//! SHA-256 digest of the payload. See [`container`] for the layout.

pub mod container;
pub mod keys;

pub use container::{
    CERTIFICATE_ENTRY, SIGNATURE_ENTRY, signed_container_bytes, verify_signed_container,
    write_signed_container,
};
pub use keys::{SigningKeyPair, load_certificate};

use crate::error::{Error, Result};
use crate::hash::{fingerprint, normalize_fingerprint};
use ed25519_dalek::{Signature, VerifyingKey};
use std::fmt;

/// Ed25519 public key length
pub const CERTIFICATE_LEN: usize = 32;

/// A signing certificate discovered in, or pinned for, a repository
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Validate raw certificate bytes
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != CERTIFICATE_LEN {
            return Err(Error::SecurityError(format!(
                "Certificate must be {CERTIFICATE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Parse the hex form stored with a repository
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| Error::SecurityError(format!("Certificate is not valid hex: {e}")))?;
        Self::parse(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }

    /// Verify an Ed25519 signature over a payload digest
    pub fn verify_digest(&self, digest: &[u8; 32], signature: &[u8]) -> Result<()> {
        let key_bytes: [u8; CERTIFICATE_LEN] = self
            .0
            .as_slice()
            .try_into()
            .map_err(|_| Error::SecurityError("Malformed certificate".to_string()))?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| Error::SecurityError(format!("Invalid certificate: {e}")))?;
        let signature = Signature::from_slice(signature)
            .map_err(|e| Error::SecurityError(format!("Malformed signature: {e}")))?;
        key.verify_strict(digest, &signature)
            .map_err(|_| Error::SecurityError("Signature verification failed".to_string()))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({})", self.fingerprint())
    }
}

/// What a discovered certificate must match
#[derive(Debug, Clone, Copy)]
pub enum ExpectedSigner<'a> {
    /// Stored certificate; must match byte for byte
    Pinned(&'a Certificate),
    /// Caller-supplied fingerprint for a repository not yet trusted
    Fingerprint(&'a str),
    /// Trust on first use
    FirstUse,
}

impl ExpectedSigner<'_> {
    /// Check a certificate discovered after full payload verification
    pub fn check(&self, discovered: &Certificate) -> Result<()> {
        match self {
            ExpectedSigner::Pinned(stored) => {
                if stored.as_bytes() != discovered.as_bytes() {
                    return Err(Error::SecurityError(format!(
                        "Signer changed: expected {}, got {}",
                        stored.fingerprint(),
                        discovered.fingerprint()
                    )));
                }
            }
            ExpectedSigner::Fingerprint(expected) => {
                if normalize_fingerprint(expected) != discovered.fingerprint() {
                    return Err(Error::SecurityError(format!(
                        "Fingerprint mismatch: expected {}, got {}",
                        normalize_fingerprint(expected),
                        discovered.fingerprint()
                    )));
                }
            }
            ExpectedSigner::FirstUse => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_hex_roundtrip() {
        let cert = SigningKeyPair::from_seed([3u8; 32]).certificate();
        assert_eq!(Certificate::from_hex(&cert.to_hex()).unwrap(), cert);
    }

    #[test]
    fn test_certificate_length_enforced() {
        assert!(matches!(
            Certificate::parse(vec![0u8; 31]),
            Err(Error::SecurityError(_))
        ));
        assert!(Certificate::from_hex("zz").is_err());
    }

    #[test]
    fn test_pinned_check() {
        let a = SigningKeyPair::from_seed([1u8; 32]).certificate();
        let b = SigningKeyPair::from_seed([2u8; 32]).certificate();
        assert!(ExpectedSigner::Pinned(&a).check(&a).is_ok());
        assert!(matches!(
            ExpectedSigner::Pinned(&a).check(&b),
            Err(Error::SecurityError(_))
        ));
    }

    #[test]
    fn test_fingerprint_check_is_format_tolerant() {
        let cert = SigningKeyPair::from_seed([1u8; 32]).certificate();
        let fp = cert.fingerprint().to_uppercase();
        let colons = fp
            .as_bytes()
            .chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join(":");
        assert!(ExpectedSigner::Fingerprint(&colons).check(&cert).is_ok());
        assert!(ExpectedSigner::Fingerprint("00").check(&cert).is_err());
    }

    #[test]
    fn test_first_use_accepts_anything() {
        let cert = SigningKeyPair::generate().certificate();
        assert!(ExpectedSigner::FirstUse.check(&cert).is_ok());
    }
}
