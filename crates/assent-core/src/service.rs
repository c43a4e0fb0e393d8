//! Engine facade.
//!
//! [`ConsentService`] wires the detector, renderer, sealer, gate and
//! lifecycle manager over a shared set of backends. Everything is
//! dependency-injected through [`ServiceBackends`]; [`ConsentService::in_memory`]
//! assembles the whole engine on in-memory backends for tests and
//! single-process use.

use std::sync::Arc;
use std::time::Duration;

use assent_evidence::artifact::{ConsentArtifact, NoticeArtifact, UserType};
use assent_evidence::chain::verify_chain;
use assent_evidence::crypto::id::{HmacSigner, Signer};
use assent_evidence::ledger::{AuditAction, AuditEntry, AuditLedger, NewAuditEntry};
use assent_evidence::store::{
    ArtifactStore, MemoryArtifactStore, MemoryAuditLedger, MemoryNoticeStore, NoticeStore,
};
use chrono::{DateTime, Utc};

use crate::api::{
    CheckRequirementsRequest, GenerateNoticeRequest, RenewConsentRequest, SubmitDecisionsRequest,
    SubmitDecisionsResponse, UpdateRequirementStatusRequest, ValidateProcessingRequest,
    WithdrawConsentRequest,
};
use crate::catalog::{MemoryCatalog, PurposeCatalog};
use crate::config::ConsentConfig;
use crate::decision::validate_decisions;
use crate::detector::{ConsentCheckResponse, RequirementDetector};
use crate::directory::{MemoryUserDirectory, UserDirectory};
use crate::errors::{ConsentError, ConsentResult};
use crate::gate::{ConsentValidationResponse, GateCache, ValidationGate};
use crate::lifecycle::{
    HaltCoordinator, LifecycleManager, MemoryProcessorNotifier, ProcessorNotifier, RenewalOutcome,
    WithdrawalOutcome,
};
use crate::notice::{NoticeRenderer, NoticeRenderingData};
use crate::record::{MemoryRecordStore, RecordStore};
use crate::requirements::{MemoryRequirementSource, RequirementSource};
use crate::sealer::ArtifactSealer;
use crate::types::{ConsentRecord, RequirementStatus};

/// The backends a service instance runs on.
#[derive(Clone)]
pub struct ServiceBackends {
    pub source: Arc<dyn RequirementSource>,
    pub catalog: Arc<dyn PurposeCatalog>,
    pub directory: Arc<dyn UserDirectory>,
    pub records: Arc<dyn RecordStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub notices: Arc<dyn NoticeStore>,
    pub ledger: Arc<dyn AuditLedger>,
    pub notifier: Arc<dyn ProcessorNotifier>,
    pub signer: Arc<dyn Signer>,
}

/// Concrete in-memory backends, kept around so tests can seed and inspect
/// them after handing clones to the service.
pub struct InMemoryBackends {
    pub source: Arc<MemoryRequirementSource>,
    pub catalog: Arc<MemoryCatalog>,
    pub directory: Arc<MemoryUserDirectory>,
    pub records: Arc<MemoryRecordStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub notices: Arc<MemoryNoticeStore>,
    pub ledger: Arc<MemoryAuditLedger>,
    pub notifier: Arc<MemoryProcessorNotifier>,
}

/// The consent engine facade.
pub struct ConsentService {
    config: ConsentConfig,
    source: Arc<dyn RequirementSource>,
    catalog: Arc<dyn PurposeCatalog>,
    directory: Arc<dyn UserDirectory>,
    records: Arc<dyn RecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    notices: Arc<dyn NoticeStore>,
    ledger: Arc<dyn AuditLedger>,
    detector: RequirementDetector,
    renderer: NoticeRenderer,
    sealer: ArtifactSealer,
    gate: ValidationGate,
    lifecycle: LifecycleManager,
}

impl ConsentService {
    pub fn new(config: ConsentConfig, backends: ServiceBackends) -> Self {
        let cache = Arc::new(GateCache::new(Duration::from_secs(
            config.gate_cache_staleness_secs,
        )));
        let halt = Arc::new(HaltCoordinator::new(
            backends.notifier.clone(),
            backends.ledger.clone(),
            config.max_notify_attempts,
        ));

        let detector = RequirementDetector::new(backends.source.clone());
        let renderer = NoticeRenderer::new(
            backends.source.clone(),
            backends.catalog.clone(),
            config.default_language.clone(),
        );
        let sealer = ArtifactSealer::new(
            backends.artifacts.clone(),
            backends.notices.clone(),
            backends.records.clone(),
            backends.ledger.clone(),
            backends.signer.clone(),
            config.default_validity_days,
        );
        let gate = ValidationGate::new(
            backends.records.clone(),
            cache.clone(),
            halt.clone(),
            backends.ledger.clone(),
            config.renewal_horizon_days,
        );
        let lifecycle = LifecycleManager::new(
            backends.records.clone(),
            backends.ledger.clone(),
            backends.directory.clone(),
            backends.notifier.clone(),
            cache,
            halt,
            config.default_validity_days,
        );

        Self {
            config,
            source: backends.source,
            catalog: backends.catalog,
            directory: backends.directory,
            records: backends.records,
            artifacts: backends.artifacts,
            notices: backends.notices,
            ledger: backends.ledger,
            detector,
            renderer,
            sealer,
            gate,
            lifecycle,
        }
    }

    /// Fully in-memory engine. `signing_key` seeds the artifact signer.
    pub fn in_memory(config: ConsentConfig, signing_key: &[u8]) -> (Self, InMemoryBackends) {
        let backends = InMemoryBackends {
            source: Arc::new(MemoryRequirementSource::new()),
            catalog: Arc::new(MemoryCatalog::new()),
            directory: Arc::new(MemoryUserDirectory::new()),
            records: Arc::new(MemoryRecordStore::new()),
            artifacts: Arc::new(MemoryArtifactStore::new()),
            notices: Arc::new(MemoryNoticeStore::new()),
            ledger: Arc::new(MemoryAuditLedger::new()),
            notifier: Arc::new(MemoryProcessorNotifier::new(vec![
                "proc-analytics".into(),
                "proc-marketing".into(),
            ])),
        };
        let service = Self::new(
            config,
            ServiceBackends {
                source: backends.source.clone(),
                catalog: backends.catalog.clone(),
                directory: backends.directory.clone(),
                records: backends.records.clone(),
                artifacts: backends.artifacts.clone(),
                notices: backends.notices.clone(),
                ledger: backends.ledger.clone(),
                notifier: backends.notifier.clone(),
                signer: Arc::new(HmacSigner::new(signing_key.to_vec())),
            },
        );
        (service, backends)
    }

    /// Outstanding requirements for a user. Never fails; lookup errors
    /// degrade to "no pending consents" for this presentation surface.
    pub async fn check_requirements(
        &self,
        request: CheckRequirementsRequest,
    ) -> ConsentCheckResponse {
        let response = self.detector.check(&request.user_id).await;
        if response.immediate_action_required {
            if let Err(err) = self
                .ledger
                .append(NewAuditEntry {
                    actor: request.user_id.clone(),
                    action: AuditAction::RequirementDetected,
                    resource: response
                        .active_requirement_id
                        .clone()
                        .unwrap_or_default(),
                    old_status: None,
                    new_status: None,
                    reason: "blocking_requirement_surfaced".into(),
                    details: serde_json::json!({ "summary": response.summary }),
                    at: Utc::now(),
                })
                .await
            {
                tracing::warn!(error = %err, "failed to record requirement detection");
            }
        }
        response
    }

    /// Render the notice for a requirement.
    pub async fn generate_notice(
        &self,
        request: GenerateNoticeRequest,
    ) -> ConsentResult<NoticeRenderingData> {
        let language = request
            .language
            .as_deref()
            .unwrap_or(&self.config.default_language);
        self.renderer.render(&request.requirement_id, language).await
    }

    /// Validate and seal a decision submission.
    ///
    /// Rejections (essential purpose missing or declined) are audited and
    /// returned; nothing is sealed. A lost chain-head race surfaces as
    /// [`ConsentError::Conflict`] and the caller resubmits.
    pub async fn submit_decisions(
        &self,
        request: SubmitDecisionsRequest,
    ) -> ConsentResult<SubmitDecisionsResponse> {
        let requirement = self.source.get(&request.requirement_id).await?;
        if requirement.status.is_terminal() {
            return Err(ConsentError::conflict(format!(
                "requirement {} is already {}",
                requirement.requirement_id,
                requirement.status.label()
            )));
        }

        let purposes = self.catalog.purposes(&requirement.purpose_ids).await?;
        let validated = match validate_decisions(&requirement, &purposes, &request.decisions) {
            Ok(validated) => validated,
            Err(err) => {
                if let Err(ledger_err) = self
                    .ledger
                    .append(NewAuditEntry {
                        actor: requirement.user_id.clone(),
                        action: AuditAction::DecisionsRejected,
                        resource: requirement.requirement_id.clone(),
                        old_status: None,
                        new_status: None,
                        reason: "essential_purposes_not_granted".into(),
                        details: serde_json::json!({ "error": err.to_string() }),
                        at: Utc::now(),
                    })
                    .await
                {
                    tracing::warn!(error = %ledger_err, "failed to record rejected submission");
                }
                return Err(err);
            }
        };

        // Pair the exact rendered notice when the caller names a language.
        let shown_notice = match &request.notice_language {
            Some(language) => {
                match self.renderer.render(&requirement.requirement_id, language).await {
                    Ok(rendering) => {
                        let user_type = match self.directory.is_minor(&requirement.user_id).await {
                            Ok(true) => UserType::Minor,
                            Ok(false) => UserType::Adult,
                            Err(err) => {
                                tracing::warn!(
                                    user_id = %requirement.user_id,
                                    error = %err,
                                    "directory lookup failed, recording adult presentation"
                                );
                                UserType::Adult
                            }
                        };
                        Some((rendering, user_type))
                    }
                    Err(err) => {
                        tracing::warn!(
                            requirement_id = %requirement.requirement_id,
                            error = %err,
                            "notice rendering failed, sealing without notice artifact"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let outcome = self
            .sealer
            .seal(&requirement, validated, request.metadata, shown_notice)
            .await?;

        // Workflow status is advisory next to the sealed artifact: a
        // failure here is logged, not propagated.
        if let Err(err) = self
            .source
            .update_status(&requirement.requirement_id, RequirementStatus::Completed)
            .await
        {
            tracing::warn!(
                requirement_id = %requirement.requirement_id,
                error = %err,
                "artifact sealed but requirement status update failed"
            );
        }

        Ok(SubmitDecisionsResponse {
            notice_id: outcome.notice.map(|notice| notice.notice_id),
            artifact: outcome.artifact,
        })
    }

    /// Advance a requirement's workflow status, with an audit entry.
    pub async fn update_requirement_status(
        &self,
        request: UpdateRequirementStatusRequest,
    ) -> ConsentResult<()> {
        let requirement = self.source.get(&request.requirement_id).await?;
        self.source
            .update_status(&request.requirement_id, request.status)
            .await?;
        self.ledger
            .append(NewAuditEntry {
                actor: "consent-engine".into(),
                action: AuditAction::RequirementStatusChanged,
                resource: request.requirement_id.clone(),
                old_status: Some(requirement.status.label().to_string()),
                new_status: Some(request.status.label().to_string()),
                reason: request.reason.unwrap_or_else(|| "status_update".into()),
                details: serde_json::Value::Null,
                at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Gate one processing operation. Never fails; internal errors deny.
    pub async fn validate_processing(
        &self,
        request: ValidateProcessingRequest,
    ) -> ConsentValidationResponse {
        self.gate
            .validate(
                &request.user_id,
                &request.purpose_id,
                request.timestamp,
                &request.context,
            )
            .await
    }

    /// Renew consent, or prompt for renewal when unconfirmed.
    pub async fn renew_consent(&self, request: RenewConsentRequest) -> ConsentResult<RenewalOutcome> {
        self.lifecycle
            .renew(&request.user_id, &request.purpose_ids, request.user_confirmed)
            .await
    }

    /// Withdraw consent: record, invalidate, notify — in that order.
    pub async fn withdraw_consent(
        &self,
        request: WithdrawConsentRequest,
    ) -> ConsentResult<WithdrawalOutcome> {
        self.lifecycle
            .withdraw(
                &request.user_id,
                &request.purpose_ids,
                request.reason.as_deref(),
                request.effective_at,
            )
            .await
    }

    /// Expire every record whose validity window has passed.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> ConsentResult<Vec<ConsentRecord>> {
        self.lifecycle.expire_due(now).await
    }

    /// Current record for one (user, purpose) pair.
    pub async fn consent_status(
        &self,
        user_id: &str,
        purpose_id: &str,
    ) -> ConsentResult<Option<ConsentRecord>> {
        Ok(self.records.get(user_id, purpose_id).await?)
    }

    /// A user's full artifact chain, integrity-verified before return.
    pub async fn consent_history(&self, user_id: &str) -> ConsentResult<Vec<ConsentArtifact>> {
        let chain = self.artifacts.chain(user_id).await?;
        verify_chain(&chain).map_err(|err| ConsentError::integrity(err.to_string()))?;
        Ok(chain)
    }

    /// Store a notice artifact sealed outside the submission path (e.g. a
    /// collection surface that rendered its own notice). Write-once.
    pub async fn put_notice_artifact(&self, notice: NoticeArtifact) -> ConsentResult<()> {
        if !notice.verify()? {
            return Err(ConsentError::integrity(format!(
                "notice {} failed its integrity check",
                notice.notice_id
            )));
        }
        Ok(self.notices.put(notice).await?)
    }

    /// Fetch a notice artifact by id.
    pub async fn get_notice_artifact(&self, notice_id: &str) -> ConsentResult<NoticeArtifact> {
        Ok(self.notices.get(notice_id).await?)
    }

    /// The notice artifact paired with a consent artifact, if any.
    pub async fn notice_for_artifact(
        &self,
        artifact_id: &str,
    ) -> ConsentResult<Option<NoticeArtifact>> {
        Ok(self.notices.get_for_artifact(artifact_id).await?)
    }

    /// The full audit trail, in append order.
    pub async fn audit_trail(&self) -> ConsentResult<Vec<AuditEntry>> {
        Ok(self.ledger.entries().await?)
    }
}
