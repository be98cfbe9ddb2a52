//! Detached module signatures
//!
//! A signature is the hex-encoded HMAC-SHA256 of the module file, stored next
//! to it as `<file>.sig`. The key is either configured explicitly or derived
//! from the machine identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::module::security::permissions::{restrict_mode, OWNER_READ_WRITE};
use crate::module::traits::{signature_path_for, ModuleError};

/// Domain separation label for the machine-derived key
const MACHINE_KEY_LABEL: &[u8] = b"modgate-module-signing-v1";

/// Outcome of checking a module's detached signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStatus {
    /// Signature present and matching
    Valid,
    /// Signature present but not matching (or unreadable)
    Invalid,
    /// No signature file
    Missing,
    /// Verification disabled
    NotChecked,
}

/// HMAC key used to sign and verify modules
pub struct SigningKey {
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Use an explicit key
    pub fn from_bytes(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Zeroizing::new(key.into()),
        }
    }

    /// Derive a key from hostname and user name
    ///
    /// Only as strong as the secrecy of those values; configure an explicit
    /// key where other local accounts are a concern.
    pub fn machine_derived() -> Self {
        let hostname = machine_hostname();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        debug!("Deriving module signing key from machine identity");

        let mut hasher = Sha256::new();
        hasher.update(MACHINE_KEY_LABEL);
        hasher.update([0u8]);
        hasher.update(hostname.as_bytes());
        hasher.update([0u8]);
        hasher.update(user.as_bytes());
        Self {
            key: Zeroizing::new(hasher.finalize().to_vec()),
        }
    }

    /// Explicit key if given, machine-derived otherwise
    pub fn from_config(explicit: Option<&str>) -> Self {
        match explicit {
            Some(key) if !key.is_empty() => Self::from_bytes(key.as_bytes()),
            _ => Self::machine_derived(),
        }
    }

    /// Hex signature of `bytes`
    pub fn sign(&self, bytes: &[u8]) -> String {
        hex::encode(hmac_sha256(&self.key, bytes))
    }

    /// Whether `signature_hex` is the signature of `bytes`
    pub fn verify(&self, bytes: &[u8], signature_hex: &str) -> bool {
        let Ok(expected) = hex::decode(signature_hex.trim()) else {
            return false;
        };
        let actual = hmac_sha256(&self.key, bytes);
        constant_time_eq(&actual, &expected)
    }

    /// Sign a module file, writing `<file>.sig` with owner-only mode
    pub fn sign_file(&self, path: &Path) -> Result<String, ModuleError> {
        let bytes = std::fs::read(path).map_err(|e| {
            ModuleError::OperationError(format!("Failed to read module {:?}: {}", path, e))
        })?;
        let signature = self.sign(&bytes);
        let sig_path = signature_path_for(path);
        std::fs::write(&sig_path, format!("{}\n", signature)).map_err(|e| {
            ModuleError::OperationError(format!("Failed to write signature {:?}: {}", sig_path, e))
        })?;
        restrict_mode(&sig_path, OWNER_READ_WRITE)?;
        Ok(signature)
    }

    /// Check the detached signature of a module file
    pub fn check_file(&self, path: &Path, bytes: &[u8]) -> SignatureStatus {
        let sig_path = signature_path_for(path);
        match std::fs::read_to_string(&sig_path) {
            Ok(stored) if self.verify(bytes, &stored) => SignatureStatus::Valid,
            Ok(_) => SignatureStatus::Invalid,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SignatureStatus::Missing,
            Err(e) => {
                warn!("Failed to read signature {:?}: {}", sig_path, e);
                SignatureStatus::Invalid
            }
        }
    }
}

fn machine_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// HMAC-SHA256 as defined in RFC 2104
fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    const BLOCK_SIZE: usize = 64;

    let mut key_block = Zeroizing::new([0u8; BLOCK_SIZE]);
    if key.len() > BLOCK_SIZE {
        let hashed = Sha256::digest(key);
        key_block[..hashed.len()].copy_from_slice(&hashed);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0u8; BLOCK_SIZE];
    let mut opad = [0u8; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        ipad[i] = key_block[i] ^ 0x36;
        opad[i] = key_block[i] ^ 0x5c;
    }

    let mut inner = Sha256::new();
    inner.update(ipad);
    inner.update(message);
    let inner = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(opad);
    outer.update(inner);
    outer.finalize().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
