// src/signing/keys.rs
//! Repository signing keys
//!
//! Ed25519 key pairs for publishers. Keys can be generated, stored, and
//! loaded; the public half is the certificate embedded in signed containers.

use super::Certificate;
use crate::error::{Error, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const ALGORITHM: &str = "ed25519";

/// A signing key pair for repository indexes
pub struct SigningKeyPair {
    signing_key: SigningKey,
    key_id: Option<String>,
}

impl SigningKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            key_id: None,
        }
    }

    /// Deterministic key pair from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
            key_id: None,
        }
    }

    /// Set a human-readable key identifier
    pub fn with_key_id(mut self, id: &str) -> Self {
        self.key_id = Some(id.to_string());
        self
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// The certificate verifiers will discover in containers signed by this key
    pub fn certificate(&self) -> Certificate {
        Certificate::from_bytes(self.signing_key.verifying_key().as_bytes().to_vec())
    }

    /// Sign a payload digest
    pub fn sign_digest(&self, digest: &[u8; 32]) -> [u8; 64] {
        self.signing_key.sign(digest).to_bytes()
    }

    /// Save the key pair to files (private and public)
    pub fn save_to_files(&self, private_path: &Path, public_path: &Path) -> Result<()> {
        let private_data = KeyFile {
            algorithm: ALGORITHM.to_string(),
            key: BASE64.encode(self.signing_key.to_bytes()),
            key_id: self.key_id.clone(),
        };
        write_key_file(private_path, &private_data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(private_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(private_path, perms)?;
        }

        let public_data = KeyFile {
            algorithm: ALGORITHM.to_string(),
            key: BASE64.encode(self.certificate().as_bytes()),
            key_id: self.key_id.clone(),
        };
        write_key_file(public_path, &public_data)
    }

    /// Load a key pair from a private key file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let key_file = read_key_file(path)?;
        let key_array: [u8; 32] = decode_key(&key_file.key)?
            .try_into()
            .map_err(|_| Error::ParseError("Invalid private key length".to_string()))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&key_array),
            key_id: key_file.key_id,
        })
    }
}

/// Key file format
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    algorithm: String,
    key: String,
    #[serde(default)]
    key_id: Option<String>,
}

fn write_key_file(path: &Path, data: &KeyFile) -> Result<()> {
    let content = toml::to_string_pretty(data)
        .map_err(|e| Error::ParseError(format!("Failed to encode key file: {e}")))?;
    fs::write(path, content)
        .map_err(|e| Error::IoError(format!("Failed to write key {}: {e}", path.display())))
}

fn read_key_file(path: &Path) -> Result<KeyFile> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read key file {}: {e}", path.display())))?;
    let key_file: KeyFile = toml::from_str(&content)
        .map_err(|e| Error::ParseError(format!("Failed to parse key file {}: {e}", path.display())))?;
    if key_file.algorithm != ALGORITHM {
        return Err(Error::ParseError(format!(
            "Unsupported key algorithm: {}",
            key_file.algorithm
        )));
    }
    Ok(key_file)
}

fn decode_key(encoded: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(encoded)
        .map_err(|e| Error::ParseError(format!("Invalid base64 in key file: {e}")))
}

/// Load a certificate from a public key file
pub fn load_certificate(path: &Path) -> Result<Certificate> {
    let key_file = read_key_file(path)?;
    Certificate::parse(decode_key(&key_file.key)?)
}
