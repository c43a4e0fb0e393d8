//! Artifact sealing.
//!
//! Converts a validated decision map plus interaction metadata into an
//! immutable, hash-chained [`ConsentArtifact`], optionally paired with a
//! [`NoticeArtifact`] capturing exactly what was shown. On success the
//! (user, purpose) consent records are re-derived from the new artifact,
//! each newly granted purpose is audited, and one entry records the seal.
//!
//! Concurrency: the artifact is built against the chain head read at entry;
//! if another submission wins the race the store rejects the append and the
//! caller receives a conflict to resubmit against the new head.

use std::sync::Arc;

use assent_evidence::artifact::{
    seal_artifact, ArtifactContent, ConsentArtifact, InteractionMetadata, NoticeArtifact, UserType,
};
use assent_evidence::chain::GENESIS_HASH;
use assent_evidence::crypto::id::Signer;
use assent_evidence::ledger::{AuditAction, AuditLedger, NewAuditEntry};
use assent_evidence::store::{ArtifactStore, NoticeStore};
use chrono::Utc;

use crate::decision::ValidatedDecisions;
use crate::errors::ConsentResult;
use crate::notice::NoticeRenderingData;
use crate::record::RecordStore;
use crate::types::{ConsentMethod, ConsentRecord, ConsentRequirement, ConsentStatus};

/// Result of a successful seal.
#[derive(Debug, Clone)]
pub struct SealOutcome {
    pub artifact: ConsentArtifact,
    pub notice: Option<NoticeArtifact>,
}

/// Seals validated decisions into the per-user chain.
pub struct ArtifactSealer {
    artifacts: Arc<dyn ArtifactStore>,
    notices: Arc<dyn NoticeStore>,
    records: Arc<dyn RecordStore>,
    ledger: Arc<dyn AuditLedger>,
    signer: Arc<dyn Signer>,
    validity_days: i64,
}

impl ArtifactSealer {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        notices: Arc<dyn NoticeStore>,
        records: Arc<dyn RecordStore>,
        ledger: Arc<dyn AuditLedger>,
        signer: Arc<dyn Signer>,
        validity_days: i64,
    ) -> Self {
        Self {
            artifacts,
            notices,
            records,
            ledger,
            signer,
            validity_days,
        }
    }

    /// Seal a validated submission.
    ///
    /// Returns [`crate::errors::ConsentError::Conflict`] when a concurrent
    /// submission moved the chain head first; the caller must resubmit.
    pub async fn seal(
        &self,
        requirement: &ConsentRequirement,
        validated: ValidatedDecisions,
        metadata: InteractionMetadata,
        shown_notice: Option<(NoticeRenderingData, UserType)>,
    ) -> ConsentResult<SealOutcome> {
        let now = Utc::now();
        let head = self.artifacts.head(&requirement.user_id).await?;
        let (block_index, previous_hash) = match head {
            Some(head) => (head.block_index + 1, head.head_hash),
            None => (0, GENESIS_HASH.to_string()),
        };

        let content = ArtifactContent {
            requirement_id: requirement.requirement_id.clone(),
            user_id: requirement.user_id.clone(),
            decisions: validated.decisions().clone(),
            metadata,
            sealed_at: now,
        };
        let artifact = seal_artifact(content, block_index, previous_hash, self.signer.as_ref())?;

        // The append is the serialization point: a stale head surfaces here
        // as a conflict and nothing else has been written yet.
        self.artifacts.append(artifact.clone()).await?;

        let notice = match shown_notice {
            Some((rendering, user_type)) => {
                let notice = NoticeArtifact::seal(
                    artifact.artifact_id.clone(),
                    rendering.template_id.clone(),
                    rendering.template_version,
                    rendering.language.clone(),
                    rendering.purpose_ids(),
                    user_type,
                    rendering.to_plain_text(),
                    now,
                )?;
                self.notices.put(notice.clone()).await?;
                Some(notice)
            }
            None => None,
        };

        self.project_records(&artifact, now).await?;

        self.ledger
            .append(NewAuditEntry {
                actor: requirement.user_id.clone(),
                action: AuditAction::ArtifactSealed,
                resource: artifact.artifact_id.clone(),
                old_status: None,
                new_status: Some(ConsentStatus::Granted.label().to_string()),
                reason: "decisions_sealed".into(),
                details: serde_json::json!({
                    "requirement_id": requirement.requirement_id,
                    "block_index": artifact.block_index,
                    "content_hash": artifact.content_hash,
                    "granted_purposes": artifact.purpose_tags,
                }),
                at: now,
            })
            .await?;

        Ok(SealOutcome { artifact, notice })
    }

    /// Re-derive the (user, purpose) records from the sealed artifact.
    ///
    /// Granted purposes get an active record with a fresh validity window
    /// and a `ConsentGranted` audit entry; declined purposes drop to
    /// `Pending` (no live consent), which the gate reports as missing.
    async fn project_records(
        &self,
        artifact: &ConsentArtifact,
        now: chrono::DateTime<Utc>,
    ) -> ConsentResult<()> {
        for (purpose_id, granted) in &artifact.decisions {
            let prior = self.records.get(&artifact.user_id, purpose_id).await?;
            let old_status = prior
                .as_ref()
                .map(|record| record.status.label().to_string());
            let version = prior.as_ref().map(|record| record.version + 1).unwrap_or(1);

            let record = if *granted {
                ConsentRecord {
                    user_id: artifact.user_id.clone(),
                    purpose_id: purpose_id.clone(),
                    status: ConsentStatus::Granted,
                    granted_at: Some(now),
                    expires_at: Some(now + chrono::Duration::days(self.validity_days)),
                    withdrawn_at: None,
                    method: ConsentMethod::Explicit,
                    version,
                    artifact_id: artifact.artifact_id.clone(),
                }
            } else {
                ConsentRecord {
                    user_id: artifact.user_id.clone(),
                    purpose_id: purpose_id.clone(),
                    status: ConsentStatus::Pending,
                    granted_at: None,
                    expires_at: None,
                    withdrawn_at: None,
                    method: ConsentMethod::Explicit,
                    version,
                    artifact_id: artifact.artifact_id.clone(),
                }
            };
            let expires_at = record.expires_at;
            self.records.put(record).await?;

            if *granted {
                self.ledger
                    .append(NewAuditEntry {
                        actor: artifact.user_id.clone(),
                        action: AuditAction::ConsentGranted,
                        resource: format!("{}/{}", artifact.user_id, purpose_id),
                        old_status,
                        new_status: Some(ConsentStatus::Granted.label().to_string()),
                        reason: "decision_sealed".into(),
                        details: serde_json::json!({
                            "artifact_id": artifact.artifact_id,
                            "version": version,
                            "expires_at": expires_at,
                        }),
                        at: now,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}
