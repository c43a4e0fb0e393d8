//! Sealed consent artifacts.
//!
//! A [`ConsentArtifact`] is the immutable record of one validated decision
//! submission. It is content-addressed (JCS + SHA-256) and hash-linked to
//! the previous artifact in the same user's chain. Superseding decisions
//! create a new artifact; a sealed artifact is never mutated.
//!
//! The [`ArtifactContent`] / [`ConsentArtifact`] split mirrors the hash-input
//! discipline used for content addressing: the hash is computed over the
//! content struct, which cannot contain the hash, the signature, or the
//! chain linkage.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::id::{hash_canonical, Signer};

/// Per-purpose boolean decisions for one submission.
///
/// BTreeMap keeps serialization order deterministic, which the content hash
/// depends on.
pub type DecisionMap = BTreeMap<String, bool>;

/// Interaction metadata captured at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionMetadata {
    /// Client IP address as reported by the collection surface.
    pub ip_address: String,
    /// User agent string.
    pub user_agent: String,
    /// Session identifier binding the submission to an interactive session.
    pub session_id: String,
    /// When the user interacted with the notice.
    pub captured_at: DateTime<Utc>,
}

/// The hashable content of an artifact.
///
/// CRITICAL: this struct defines EXACTLY what goes into the content hash.
/// It deliberately EXCLUDES `artifact_id`, `content_hash`, `signature`,
/// `block_index` and `previous_hash` (chain linkage is verified separately,
/// against the previous artifact's content hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactContent {
    /// The requirement this submission answers.
    pub requirement_id: String,
    /// The data principal who decided.
    pub user_id: String,
    /// Validated per-purpose decisions.
    pub decisions: DecisionMap,
    /// Interaction metadata from the collection surface.
    pub metadata: InteractionMetadata,
    /// Sealing timestamp.
    pub sealed_at: DateTime<Utc>,
}

impl ArtifactContent {
    /// Compute the content hash over the canonical serialization.
    pub fn content_hash(&self) -> Result<String> {
        hash_canonical(self)
    }
}

/// An immutable, hash-chained consent artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentArtifact {
    /// Unique artifact identifier.
    pub artifact_id: String,
    /// The requirement this submission answers.
    pub requirement_id: String,
    /// The data principal who decided.
    pub user_id: String,
    /// Validated per-purpose decisions.
    pub decisions: DecisionMap,
    /// Interaction metadata from the collection surface.
    pub metadata: InteractionMetadata,
    /// Sealing timestamp.
    pub sealed_at: DateTime<Utc>,
    /// SHA-256 over the canonical [`ArtifactContent`].
    pub content_hash: String,
    /// Signature token over the content hash (see [`Signer`]).
    pub signature: String,
    /// Purpose ids the principal granted.
    pub purpose_tags: Vec<String>,
    /// Position in the per-user chain (0 = genesis).
    pub block_index: u64,
    /// Content hash of the previous artifact in the chain, or
    /// [`crate::chain::GENESIS_HASH`] for the first.
    pub previous_hash: String,
    /// True only after the hash recomputation matched at seal time.
    pub integrity_verified: bool,
}

impl ConsentArtifact {
    /// Project the hashable content back out of a sealed artifact.
    pub fn content(&self) -> ArtifactContent {
        ArtifactContent {
            requirement_id: self.requirement_id.clone(),
            user_id: self.user_id.clone(),
            decisions: self.decisions.clone(),
            metadata: self.metadata.clone(),
            sealed_at: self.sealed_at,
        }
    }

    /// Whether the principal granted the given purpose in this artifact.
    pub fn granted(&self, purpose_id: &str) -> bool {
        self.decisions.get(purpose_id).copied().unwrap_or(false)
    }
}

/// Seal validated content into an immutable artifact.
///
/// Computes the content hash, recomputes it to confirm the serialization is
/// stable, signs it, and attaches chain linkage. `integrity_verified` is set
/// only after the recomputation matched.
pub fn seal_artifact(
    content: ArtifactContent,
    block_index: u64,
    previous_hash: String,
    signer: &dyn Signer,
) -> Result<ConsentArtifact> {
    let content_hash = content.content_hash()?;
    let recomputed = content.content_hash()?;
    let integrity_verified = content_hash == recomputed;
    let signature = signer.sign(&content_hash);

    let purpose_tags = content
        .decisions
        .iter()
        .filter(|(_, granted)| **granted)
        .map(|(purpose_id, _)| purpose_id.clone())
        .collect();

    Ok(ConsentArtifact {
        artifact_id: format!("art_{}", Uuid::new_v4()),
        requirement_id: content.requirement_id,
        user_id: content.user_id,
        decisions: content.decisions,
        metadata: content.metadata,
        sealed_at: content.sealed_at,
        content_hash,
        signature,
        purpose_tags,
        block_index,
        previous_hash,
        integrity_verified,
    })
}

/// Recompute and check an artifact's content hash and signature.
///
/// Returns `Ok(true)` only when both the hash and the signature token match.
/// Callers treat a failed check as a missing record (fail-closed), never as
/// a soft warning.
pub fn verify_artifact(artifact: &ConsentArtifact, signer: &dyn Signer) -> Result<bool> {
    let recomputed = artifact.content().content_hash()?;
    if recomputed != artifact.content_hash {
        return Ok(false);
    }
    Ok(signer.verify(&artifact.content_hash, &artifact.signature))
}

/// What kind of principal saw the notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Adult,
    Minor,
}

/// Immutable record of exactly what notice content was shown.
///
/// Paired 1:1 with a [`ConsentArtifact`] so a later dispute can reconstruct
/// the notice the principal actually saw. Write-once in the notice store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeArtifact {
    /// Unique notice artifact identifier.
    pub notice_id: String,
    /// The consent artifact this notice accompanied.
    pub artifact_id: String,
    /// Notice template identifier.
    pub template_id: String,
    /// Notice template version.
    pub template_version: u32,
    /// Language the notice was rendered in.
    pub language: String,
    /// Purpose ids shown in the notice.
    pub purpose_ids: Vec<String>,
    /// Adult or minor presentation.
    pub user_type: UserType,
    /// The exact rendered content (plain text or HTML).
    pub content: String,
    /// SHA-256 over the canonical notice content fields.
    pub content_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Hash input for a notice artifact: everything except ids and the hash.
#[derive(Serialize)]
struct NoticeHashInput<'a> {
    template_id: &'a str,
    template_version: u32,
    language: &'a str,
    purpose_ids: &'a [String],
    user_type: UserType,
    content: &'a str,
}

impl NoticeArtifact {
    /// Build a notice artifact, computing its integrity hash.
    #[allow(clippy::too_many_arguments)]
    pub fn seal(
        artifact_id: impl Into<String>,
        template_id: impl Into<String>,
        template_version: u32,
        language: impl Into<String>,
        purpose_ids: Vec<String>,
        user_type: UserType,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let template_id = template_id.into();
        let language = language.into();
        let content = content.into();
        let content_hash = hash_canonical(&NoticeHashInput {
            template_id: &template_id,
            template_version,
            language: &language,
            purpose_ids: &purpose_ids,
            user_type,
            content: &content,
        })?;
        Ok(Self {
            notice_id: format!("ntc_{}", Uuid::new_v4()),
            artifact_id: artifact_id.into(),
            template_id,
            template_version,
            language,
            purpose_ids,
            user_type,
            content,
            content_hash,
            created_at,
        })
    }

    /// Recompute and check the integrity hash.
    pub fn verify(&self) -> Result<bool> {
        let recomputed = hash_canonical(&NoticeHashInput {
            template_id: &self.template_id,
            template_version: self.template_version,
            language: &self.language,
            purpose_ids: &self.purpose_ids,
            user_type: self.user_type,
            content: &self.content,
        })?;
        Ok(recomputed == self.content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::GENESIS_HASH;
    use crate::crypto::id::HmacSigner;
    use chrono::TimeZone;

    fn test_metadata() -> InteractionMetadata {
        InteractionMetadata {
            ip_address: "203.0.113.7".into(),
            user_agent: "test-agent/1.0".into(),
            session_id: "sess-1".into(),
            captured_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn test_content() -> ArtifactContent {
        let mut decisions = DecisionMap::new();
        decisions.insert("P-001".into(), true);
        decisions.insert("P-002".into(), false);
        ArtifactContent {
            requirement_id: "req-1".into(),
            user_id: "user-1".into(),
            decisions,
            metadata: test_metadata(),
            sealed_at: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
        }
    }

    #[test]
    fn test_seal_sets_integrity_and_tags() {
        let signer = HmacSigner::new(b"k".to_vec());
        let artifact = seal_artifact(test_content(), 0, GENESIS_HASH.to_string(), &signer).unwrap();

        assert!(artifact.integrity_verified);
        assert!(artifact.content_hash.starts_with("sha256:"));
        assert_eq!(artifact.purpose_tags, vec!["P-001".to_string()]);
        assert_eq!(artifact.block_index, 0);
        assert_eq!(artifact.previous_hash, GENESIS_HASH);
    }

    #[test]
    fn test_verify_detects_tamper() {
        let signer = HmacSigner::new(b"k".to_vec());
        let mut artifact =
            seal_artifact(test_content(), 0, GENESIS_HASH.to_string(), &signer).unwrap();
        assert!(verify_artifact(&artifact, &signer).unwrap());

        // Flip a decision after sealing
        artifact.decisions.insert("P-002".into(), true);
        assert!(!verify_artifact(&artifact, &signer).unwrap());
    }

    #[test]
    fn test_verify_detects_wrong_signer() {
        let signer = HmacSigner::new(b"k".to_vec());
        let other = HmacSigner::new(b"other".to_vec());
        let artifact = seal_artifact(test_content(), 0, GENESIS_HASH.to_string(), &signer).unwrap();
        assert!(!verify_artifact(&artifact, &other).unwrap());
    }

    #[test]
    fn test_content_hash_excludes_chain_linkage() {
        let signer = HmacSigner::new(b"k".to_vec());
        let a = seal_artifact(test_content(), 0, GENESIS_HASH.to_string(), &signer).unwrap();
        let b = seal_artifact(test_content(), 7, "sha256:somewhere".to_string(), &signer).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_notice_artifact_roundtrip() {
        let notice = NoticeArtifact::seal(
            "art-1",
            "tpl-consent-v2",
            3,
            "en",
            vec!["P-001".into()],
            UserType::Adult,
            "You are being asked to consent to...",
            Utc.timestamp_opt(1_700_000_200, 0).unwrap(),
        )
        .unwrap();

        assert!(notice.verify().unwrap());

        let mut tampered = notice.clone();
        tampered.content = "Something else entirely".into();
        assert!(!tampered.verify().unwrap());
    }
}
