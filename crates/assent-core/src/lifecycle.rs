//! Consent lifecycle management.
//!
//! Renewal, withdrawal and the expiry sweep. Ordering on withdrawal is
//! load-bearing: the status change is durably recorded first, then the
//! gate cache is invalidated, then downstream processors are told to halt.
//! A notification failure never rolls back a recorded withdrawal.
//!
//! # State Machine
//!
//! `PENDING → GRANTED → {RENEWED ⇄ GRANTED} → WITHDRAWN`, with
//! `GRANTED/RENEWED → EXPIRED`. Withdrawn and expired are terminal; only a
//! fresh consent collection revives the (user, purpose) pair.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use assent_evidence::ledger::{AuditAction, AuditLedger, NewAuditEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::directory::{NotificationChannel, UserDirectory};
use crate::errors::{ConsentError, ConsentResult};
use crate::gate::GateCache;
use crate::record::RecordStore;
use crate::types::{ConsentMethod, ConsentRecord, ConsentStatus};

/// Downstream processor notification port.
#[async_trait]
pub trait ProcessorNotifier: Send + Sync {
    /// Tell processors to stop processing for (user, purpose). Returns the
    /// processor ids that acknowledged the halt.
    async fn halt_processing(
        &self,
        user_id: &str,
        purpose_id: &str,
        reason: &str,
    ) -> ConsentResult<Vec<String>>;

    /// Propagate an extended validity window after a renewal.
    async fn sync_expiry(
        &self,
        user_id: &str,
        purpose_id: &str,
        expires_at: DateTime<Utc>,
    ) -> ConsentResult<()>;

    /// Prompt the principal to renew an expiring consent.
    async fn renewal_prompt(
        &self,
        user_id: &str,
        purpose_id: &str,
        channel: NotificationChannel,
        expires_at: Option<DateTime<Utc>>,
    ) -> ConsentResult<()>;
}

/// One recorded halt call, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltCall {
    pub user_id: String,
    pub purpose_id: String,
    pub reason: String,
}

/// In-memory notifier with injectable failures.
pub struct MemoryProcessorNotifier {
    processors: Vec<String>,
    halts: RwLock<Vec<HaltCall>>,
    prompts: RwLock<Vec<(String, String)>>,
    syncs: RwLock<Vec<(String, String, DateTime<Utc>)>>,
    fail_halts_remaining: AtomicU32,
}

impl MemoryProcessorNotifier {
    pub fn new(processors: Vec<String>) -> Self {
        Self {
            processors,
            halts: RwLock::new(Vec::new()),
            prompts: RwLock::new(Vec::new()),
            syncs: RwLock::new(Vec::new()),
            fail_halts_remaining: AtomicU32::new(0),
        }
    }

    /// Make the next `n` halt calls fail.
    pub fn fail_next_halts(&self, n: u32) {
        self.fail_halts_remaining.store(n, Ordering::SeqCst);
    }

    pub async fn halt_calls(&self) -> Vec<HaltCall> {
        self.halts.read().await.clone()
    }

    pub async fn prompt_calls(&self) -> Vec<(String, String)> {
        self.prompts.read().await.clone()
    }

    pub async fn sync_calls(&self) -> Vec<(String, String, DateTime<Utc>)> {
        self.syncs.read().await.clone()
    }
}

#[async_trait]
impl ProcessorNotifier for MemoryProcessorNotifier {
    async fn halt_processing(
        &self,
        user_id: &str,
        purpose_id: &str,
        reason: &str,
    ) -> ConsentResult<Vec<String>> {
        if self
            .fail_halts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ConsentError::network("processor endpoint unavailable"));
        }
        self.halts.write().await.push(HaltCall {
            user_id: user_id.to_string(),
            purpose_id: purpose_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(self.processors.clone())
    }

    async fn sync_expiry(
        &self,
        user_id: &str,
        purpose_id: &str,
        expires_at: DateTime<Utc>,
    ) -> ConsentResult<()> {
        self.syncs
            .write()
            .await
            .push((user_id.to_string(), purpose_id.to_string(), expires_at));
        Ok(())
    }

    async fn renewal_prompt(
        &self,
        user_id: &str,
        purpose_id: &str,
        _channel: NotificationChannel,
        _expires_at: Option<DateTime<Utc>>,
    ) -> ConsentResult<()> {
        self.prompts
            .write()
            .await
            .push((user_id.to_string(), purpose_id.to_string()));
        Ok(())
    }
}

/// Idempotent halt propagation shared by the gate and the lifecycle
/// manager.
///
/// A (user, purpose) pair is halted at most once; subsequent requests are
/// no-ops. Each performed halt writes one ledger entry recording which
/// processors acknowledged.
pub struct HaltCoordinator {
    notifier: Arc<dyn ProcessorNotifier>,
    ledger: Arc<dyn AuditLedger>,
    halted: RwLock<HashSet<(String, String)>>,
    max_attempts: u32,
}

impl HaltCoordinator {
    pub fn new(
        notifier: Arc<dyn ProcessorNotifier>,
        ledger: Arc<dyn AuditLedger>,
        max_attempts: u32,
    ) -> Self {
        Self {
            notifier,
            ledger,
            halted: RwLock::new(HashSet::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Halt processing for (user, purpose). Returns `Ok(true)` when this
    /// call performed the halt, `Ok(false)` when it was already done.
    pub async fn halt(&self, user_id: &str, purpose_id: &str, reason: &str) -> ConsentResult<bool> {
        let key = (user_id.to_string(), purpose_id.to_string());
        if !self.halted.write().await.insert(key.clone()) {
            return Ok(false);
        }

        let processors = match self.notify_with_retry(user_id, purpose_id, reason).await {
            Ok(processors) => processors,
            Err(err) => {
                // Not halted: leave the pair eligible for a later attempt.
                self.halted.write().await.remove(&key);
                return Err(err);
            }
        };

        self.ledger
            .append(NewAuditEntry {
                actor: "consent-engine".into(),
                action: AuditAction::ProcessorsNotified,
                resource: format!("{user_id}/{purpose_id}"),
                old_status: None,
                new_status: None,
                reason: reason.to_string(),
                details: serde_json::json!({ "processors": processors }),
                at: Utc::now(),
            })
            .await?;
        Ok(true)
    }

    async fn notify_with_retry(
        &self,
        user_id: &str,
        purpose_id: &str,
        reason: &str,
    ) -> ConsentResult<Vec<String>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .notifier
                .halt_processing(user_id, purpose_id, reason)
                .await
            {
                Ok(processors) => return Ok(processors),
                Err(err) if attempt < self.max_attempts => {
                    tracing::warn!(
                        user_id,
                        purpose_id,
                        attempt,
                        error = %err,
                        "processor halt notification failed, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(25 * attempt as u64)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// A purpose skipped by a lifecycle operation, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPurpose {
    pub purpose_id: String,
    pub reason: String,
}

/// Outcome of a withdrawal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WithdrawalOutcome {
    /// Purposes withdrawn by this request.
    pub withdrawn: Vec<String>,
    /// Purposes that were already withdrawn (idempotent no-op).
    pub already_withdrawn: Vec<String>,
    /// Purposes the state machine refused to withdraw.
    pub skipped: Vec<SkippedPurpose>,
    /// Purposes whose withdrawal is recorded but whose processor
    /// notification failed and needs replay.
    pub notification_failures: Vec<String>,
}

/// One renewed purpose and its new expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewedPurpose {
    pub purpose_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a renewal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RenewalOutcome {
    /// Purposes renewed with their new expiry.
    pub renewed: Vec<RenewedPurpose>,
    /// Purposes for which a renewal prompt was sent (unconfirmed request).
    pub prompted: Vec<String>,
    /// Purposes the state machine refused to renew.
    pub skipped: Vec<SkippedPurpose>,
}

/// Drives renewal, withdrawal and expiry of consent records.
pub struct LifecycleManager {
    records: Arc<dyn RecordStore>,
    ledger: Arc<dyn AuditLedger>,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn ProcessorNotifier>,
    cache: Arc<GateCache>,
    halt: Arc<HaltCoordinator>,
    renewal_period_days: i64,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        records: Arc<dyn RecordStore>,
        ledger: Arc<dyn AuditLedger>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn ProcessorNotifier>,
        cache: Arc<GateCache>,
        halt: Arc<HaltCoordinator>,
        renewal_period_days: i64,
    ) -> Self {
        Self {
            records,
            ledger,
            directory,
            notifier,
            cache,
            halt,
            renewal_period_days,
        }
    }

    /// Withdraw consent for the given purposes.
    ///
    /// Per purpose: record the withdrawal durably, invalidate the gate
    /// cache, then notify processors. Already-withdrawn purposes are
    /// no-ops; purposes without an active grant are skipped with a reason.
    pub async fn withdraw(
        &self,
        user_id: &str,
        purpose_ids: &[String],
        reason: Option<&str>,
        effective_at: Option<DateTime<Utc>>,
    ) -> ConsentResult<WithdrawalOutcome> {
        let effective = effective_at.unwrap_or_else(Utc::now);
        let reason_code = reason.unwrap_or("user_withdrawal");
        let mut outcome = WithdrawalOutcome::default();

        for purpose_id in purpose_ids {
            let Some(mut record) = self.records.get(user_id, purpose_id).await? else {
                outcome.skipped.push(SkippedPurpose {
                    purpose_id: purpose_id.clone(),
                    reason: "no consent record".into(),
                });
                continue;
            };

            if record.status == ConsentStatus::Withdrawn {
                outcome.already_withdrawn.push(purpose_id.clone());
                continue;
            }
            if !record.status.can_transition_to(ConsentStatus::Withdrawn) {
                outcome.skipped.push(SkippedPurpose {
                    purpose_id: purpose_id.clone(),
                    reason: format!("cannot withdraw from status {}", record.status.label()),
                });
                continue;
            }

            let old_status = record.status;
            record.status = ConsentStatus::Withdrawn;
            record.withdrawn_at = Some(effective);
            record.version += 1;
            self.records.put(record).await?;
            self.cache.invalidate(user_id, purpose_id).await;

            self.ledger
                .append(NewAuditEntry {
                    actor: user_id.to_string(),
                    action: AuditAction::ConsentWithdrawn,
                    resource: format!("{user_id}/{purpose_id}"),
                    old_status: Some(old_status.label().to_string()),
                    new_status: Some(ConsentStatus::Withdrawn.label().to_string()),
                    reason: reason_code.to_string(),
                    details: serde_json::json!({ "effective_at": effective }),
                    at: Utc::now(),
                })
                .await?;

            match self.halt.halt(user_id, purpose_id, "consent_withdrawn").await {
                Ok(_) => outcome.withdrawn.push(purpose_id.clone()),
                Err(err) => {
                    tracing::warn!(
                        user_id,
                        purpose_id,
                        error = %err,
                        "withdrawal recorded but processor notification failed"
                    );
                    outcome.withdrawn.push(purpose_id.clone());
                    outcome.notification_failures.push(purpose_id.clone());
                }
            }
        }

        Ok(outcome)
    }

    /// Renew consent for the given purposes.
    ///
    /// Without confirmation this only sends a renewal prompt. With
    /// confirmation the expiry extends by the configured period from the
    /// later of now and the current expiry, so a renewal never shortens
    /// the window.
    pub async fn renew(
        &self,
        user_id: &str,
        purpose_ids: &[String],
        user_confirmed: bool,
    ) -> ConsentResult<RenewalOutcome> {
        let now = Utc::now();
        let mut outcome = RenewalOutcome::default();

        for purpose_id in purpose_ids {
            let Some(mut record) = self.records.get(user_id, purpose_id).await? else {
                outcome.skipped.push(SkippedPurpose {
                    purpose_id: purpose_id.clone(),
                    reason: "no consent record".into(),
                });
                continue;
            };

            if !record.status.is_active() {
                outcome.skipped.push(SkippedPurpose {
                    purpose_id: purpose_id.clone(),
                    reason: format!("cannot renew from status {}", record.status.label()),
                });
                continue;
            }

            if !user_confirmed {
                let channel = self
                    .directory
                    .notification_channel(user_id)
                    .await
                    .unwrap_or_default();
                self.notifier
                    .renewal_prompt(user_id, purpose_id, channel, record.expires_at)
                    .await?;
                outcome.prompted.push(purpose_id.clone());
                continue;
            }

            let base = record.expires_at.map(|e| e.max(now)).unwrap_or(now);
            let new_expiry = base + chrono::Duration::days(self.renewal_period_days);

            let old_status = record.status;
            record.status = ConsentStatus::Renewed;
            record.method = ConsentMethod::Renewal;
            record.expires_at = Some(new_expiry);
            record.version += 1;
            self.records.put(record).await?;
            self.cache.invalidate(user_id, purpose_id).await;

            self.ledger
                .append(NewAuditEntry {
                    actor: user_id.to_string(),
                    action: AuditAction::ConsentRenewed,
                    resource: format!("{user_id}/{purpose_id}"),
                    old_status: Some(old_status.label().to_string()),
                    new_status: Some(ConsentStatus::Renewed.label().to_string()),
                    reason: "renewal_confirmed".into(),
                    details: serde_json::json!({ "expires_at": new_expiry }),
                    at: now,
                })
                .await?;

            if let Err(err) = self.notifier.sync_expiry(user_id, purpose_id, new_expiry).await {
                tracing::warn!(
                    user_id,
                    purpose_id,
                    error = %err,
                    "renewal recorded but expiry sync failed"
                );
            }

            outcome.renewed.push(RenewedPurpose {
                purpose_id: purpose_id.clone(),
                expires_at: new_expiry,
            });
        }

        Ok(outcome)
    }

    /// Expire every active record whose validity window has passed.
    ///
    /// Returns the expired records. Denials and processor halts are left
    /// to the gate on next validation.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> ConsentResult<Vec<ConsentRecord>> {
        let mut expired = Vec::new();
        for mut record in self.records.all().await? {
            let due = record.status.is_active()
                && record.expires_at.map(|e| e <= now).unwrap_or(false);
            if !due {
                continue;
            }

            let old_status = record.status;
            record.status = ConsentStatus::Expired;
            record.version += 1;
            self.records.put(record.clone()).await?;
            self.cache.invalidate(&record.user_id, &record.purpose_id).await;

            self.ledger
                .append(NewAuditEntry {
                    actor: "consent-engine".into(),
                    action: AuditAction::ConsentExpired,
                    resource: format!("{}/{}", record.user_id, record.purpose_id),
                    old_status: Some(old_status.label().to_string()),
                    new_status: Some(ConsentStatus::Expired.label().to_string()),
                    reason: "validity_window_elapsed".into(),
                    details: serde_json::json!({ "expired_at": record.expires_at }),
                    at: now,
                })
                .await?;

            expired.push(record);
        }
        Ok(expired)
    }
}
