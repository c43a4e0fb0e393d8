//! Content hashing and signing for consent artifacts.
//!
//! # Security Invariants
//!
//! 1. An artifact's `content_hash` MUST NOT include itself in the hash input.
//! 2. Hash inputs use JCS (RFC 8785) canonical JSON.
//! 3. All hashes are SHA-256 with "sha256:" prefix.
//! 4. The signature token is a placeholder for a real asymmetric signature:
//!    it is produced behind the [`Signer`] port so a deployment can swap in
//!    HSM-backed or Ed25519 signing without touching sealing logic.

use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash a canonical byte serialization of `value` to `sha256:<hex>`.
pub fn hash_canonical<T: Serialize>(value: &T) -> Result<String> {
    let canonical = super::jcs::to_vec(value)?;
    let digest = Sha256::digest(&canonical);
    Ok(format!("sha256:{}", hex::encode(digest)))
}

/// Chain root over a sequence of content hashes.
///
/// Order-sensitive: reordering artifacts changes the root. Third parties can
/// recompute the root from the artifact sequence alone, which makes any
/// prefix of a user's chain independently verifiable.
pub fn chain_root(content_hashes: &[String]) -> String {
    let mut hasher = Sha256::new();
    for hash in content_hashes {
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Signature port for sealed artifacts.
///
/// The consent regulation requires a provable token over the sealed content
/// but does not mandate a scheme. Production deployments implement this with
/// an asymmetric signer; the default [`HmacSigner`] is an HMAC-SHA256 token
/// suitable for single-operator deployments and tests.
pub trait Signer: Send + Sync {
    /// Produce a signature token over the content hash.
    fn sign(&self, content_hash: &str) -> String;

    /// Check a signature token against a content hash.
    fn verify(&self, content_hash: &str, token: &str) -> bool;

    /// Stable identifier of the signing key (for audit trails).
    fn key_id(&self) -> String;
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer over a shared secret.
pub struct HmacSigner {
    key: Vec<u8>,
}

impl HmacSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }
}

impl Signer for HmacSigner {
    fn sign(&self, content_hash: &str) -> String {
        // HMAC accepts keys of any length; new_from_slice on Hmac never fails.
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(content_hash.as_bytes());
        format!("hmac-sha256:{}", hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, content_hash: &str, token: &str) -> bool {
        self.sign(content_hash) == token
    }

    fn key_id(&self) -> String {
        let digest = Sha256::digest(&self.key);
        format!("sha256:{}", hex::encode(&digest[..8]))
    }
}
