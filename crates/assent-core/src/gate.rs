//! Processing validation gate.
//!
//! The enforcement point: every processing operation asks the gate whether
//! a valid consent exists for (user, purpose). Any failure to determine
//! status — store unreachable, record unreadable — denies processing.
//! Better to wrongly pause processing than to wrongly continue it.
//!
//! Responses are a pure function of the record state and the supplied
//! evaluation instant, so identical requests with no intervening state
//! change produce identical results. Denials for withdrawn or expired
//! consent trigger an idempotent processor halt through the shared
//! [`HaltCoordinator`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use assent_evidence::ledger::{AuditAction, AuditLedger, NewAuditEntry};

use crate::lifecycle::HaltCoordinator;
use crate::record::RecordStore;
use crate::types::{ConsentRecord, ConsentStatus};

/// What the caller may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPermission {
    /// Valid consent exists.
    Granted,
    /// Valid consent exists but renewal is due; proceed and prompt.
    Conditional,
    /// No valid consent. Stop processing.
    Denied,
}

/// Why the gate answered the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityStatus {
    Active,
    Expired,
    Withdrawn,
    Missing,
}

/// Who is asking and for what operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingContext {
    /// The downstream processor performing the operation.
    pub processor_id: String,
    /// The operation being validated, e.g. "profile_export".
    pub operation: String,
}

/// The gate's answer for one (user, purpose) check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentValidationResponse {
    pub user_id: String,
    pub purpose_id: String,
    pub permission: ProcessingPermission,
    pub validity: ValidityStatus,
    /// Expiry of the consulted record, when one exists.
    pub expires_at: Option<DateTime<Utc>>,
    /// Machine-readable reason codes.
    pub reasons: Vec<String>,
    /// What the caller should do next.
    pub recommended_actions: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl ConsentValidationResponse {
    pub fn is_denied(&self) -> bool {
        self.permission == ProcessingPermission::Denied
    }
}

struct CacheEntry {
    record: Option<ConsentRecord>,
    fetched_at: Instant,
}

/// Short-lived read cache in front of the record store.
///
/// Staleness is bounded by the configured window; lifecycle writers
/// invalidate synchronously, so a withdrawal is never served from cache
/// after it is recorded.
pub struct GateCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
    staleness: Duration,
}

impl GateCache {
    pub fn new(staleness: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            staleness,
        }
    }

    /// Cached lookup. Outer `None` means miss or stale.
    pub async fn get(&self, user_id: &str, purpose_id: &str) -> Option<Option<ConsentRecord>> {
        let entries = self.entries.read().await;
        let entry = entries.get(&(user_id.to_string(), purpose_id.to_string()))?;
        if entry.fetched_at.elapsed() > self.staleness {
            return None;
        }
        Some(entry.record.clone())
    }

    pub async fn put(&self, user_id: &str, purpose_id: &str, record: Option<ConsentRecord>) {
        self.entries.write().await.insert(
            (user_id.to_string(), purpose_id.to_string()),
            CacheEntry {
                record,
                fetched_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate(&self, user_id: &str, purpose_id: &str) {
        self.entries
            .write()
            .await
            .remove(&(user_id.to_string(), purpose_id.to_string()));
    }
}

/// The fail-closed validation gate.
pub struct ValidationGate {
    records: Arc<dyn RecordStore>,
    cache: Arc<GateCache>,
    halt: Arc<HaltCoordinator>,
    ledger: Arc<dyn AuditLedger>,
    renewal_horizon: chrono::Duration,
}

impl ValidationGate {
    pub fn new(
        records: Arc<dyn RecordStore>,
        cache: Arc<GateCache>,
        halt: Arc<HaltCoordinator>,
        ledger: Arc<dyn AuditLedger>,
        renewal_horizon_days: i64,
    ) -> Self {
        Self {
            records,
            cache,
            halt,
            ledger,
            renewal_horizon: chrono::Duration::days(renewal_horizon_days),
        }
    }

    /// Validate one processing operation at the given instant. Never
    /// fails: every internal error collapses to a denial.
    pub async fn validate(
        &self,
        user_id: &str,
        purpose_id: &str,
        at: DateTime<Utc>,
        context: &ProcessingContext,
    ) -> ConsentValidationResponse {
        let record = match self.cache.get(user_id, purpose_id).await {
            Some(cached) => cached,
            None => match self.records.get(user_id, purpose_id).await {
                Ok(record) => {
                    self.cache.put(user_id, purpose_id, record.clone()).await;
                    record
                }
                Err(err) => {
                    tracing::warn!(
                        user_id,
                        purpose_id,
                        processor = %context.processor_id,
                        error = %err,
                        "consent status unavailable, denying"
                    );
                    return ConsentValidationResponse {
                        user_id: user_id.to_string(),
                        purpose_id: purpose_id.to_string(),
                        permission: ProcessingPermission::Denied,
                        validity: ValidityStatus::Missing,
                        expires_at: None,
                        reasons: vec!["consent_status_unavailable".into()],
                        recommended_actions: vec![
                            "pause processing".into(),
                            "retry after backoff".into(),
                        ],
                        checked_at: at,
                    };
                }
            },
        };

        let Some(record) = record else {
            return ConsentValidationResponse {
                user_id: user_id.to_string(),
                purpose_id: purpose_id.to_string(),
                permission: ProcessingPermission::Denied,
                validity: ValidityStatus::Missing,
                expires_at: None,
                reasons: vec!["no_consent_record".into()],
                recommended_actions: vec!["request consent from the data principal".into()],
                checked_at: at,
            };
        };

        match record.status {
            ConsentStatus::Withdrawn => {
                self.deny_and_halt(&record, context, "consent_withdrawn", at)
                    .await
            }
            ConsentStatus::Expired => {
                self.deny_and_halt(&record, context, "consent_expired", at)
                    .await
            }
            ConsentStatus::Pending => ConsentValidationResponse {
                user_id: record.user_id.clone(),
                purpose_id: record.purpose_id.clone(),
                permission: ProcessingPermission::Denied,
                validity: ValidityStatus::Missing,
                expires_at: None,
                reasons: vec!["consent_not_granted".into()],
                recommended_actions: vec!["request consent from the data principal".into()],
                checked_at: at,
            },
            ConsentStatus::Granted | ConsentStatus::Renewed => {
                // Active status, but the validity window rules
                if !record.is_valid_at(at) {
                    return self
                        .deny_and_halt(&record, context, "consent_expired", at)
                        .await;
                }
                let expires_at = record.expires_at;
                let renewal_due = expires_at
                    .map(|expiry| expiry - at <= self.renewal_horizon)
                    .unwrap_or(false);
                if renewal_due {
                    ConsentValidationResponse {
                        user_id: record.user_id,
                        purpose_id: record.purpose_id,
                        permission: ProcessingPermission::Conditional,
                        validity: ValidityStatus::Active,
                        expires_at,
                        reasons: vec!["renewal_due".into()],
                        recommended_actions: vec!["prompt the data principal to renew".into()],
                        checked_at: at,
                    }
                } else {
                    ConsentValidationResponse {
                        user_id: record.user_id,
                        purpose_id: record.purpose_id,
                        permission: ProcessingPermission::Granted,
                        validity: ValidityStatus::Active,
                        expires_at,
                        reasons: Vec::new(),
                        recommended_actions: Vec::new(),
                        checked_at: at,
                    }
                }
            }
        }
    }

    /// Denial for a withdrawn or expired record, triggering the idempotent
    /// processor halt. The first denial writes a ProcessingDenied entry;
    /// repeats change nothing.
    async fn deny_and_halt(
        &self,
        record: &ConsentRecord,
        context: &ProcessingContext,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ConsentValidationResponse {
        let validity = if reason == "consent_withdrawn" {
            ValidityStatus::Withdrawn
        } else {
            ValidityStatus::Expired
        };

        match self
            .halt
            .halt(&record.user_id, &record.purpose_id, reason)
            .await
        {
            Ok(true) => {
                if let Err(err) = self
                    .ledger
                    .append(NewAuditEntry {
                        actor: context.processor_id.clone(),
                        action: AuditAction::ProcessingDenied,
                        resource: format!("{}/{}", record.user_id, record.purpose_id),
                        old_status: None,
                        new_status: None,
                        reason: reason.to_string(),
                        details: serde_json::json!({ "operation": context.operation }),
                        at: now,
                    })
                    .await
                {
                    tracing::warn!(error = %err, "failed to record processing denial");
                }
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(
                    user_id = %record.user_id,
                    purpose_id = %record.purpose_id,
                    error = %err,
                    "processor halt failed during denial"
                );
            }
        }

        let recommended = match validity {
            ValidityStatus::Withdrawn => vec![
                "halt processing".into(),
                "purge derived data per retention policy".into(),
            ],
            _ => vec![
                "halt processing".into(),
                "request renewed consent".into(),
            ],
        };

        ConsentValidationResponse {
            user_id: record.user_id.clone(),
            purpose_id: record.purpose_id.clone(),
            permission: ProcessingPermission::Denied,
            validity,
            expires_at: record.expires_at,
            reasons: vec![reason.to_string()],
            recommended_actions: recommended,
            checked_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::MemoryProcessorNotifier;
    use crate::record::MemoryRecordStore;
    use crate::types::ConsentMethod;
    use assent_evidence::store::MemoryAuditLedger;

    fn record(status: ConsentStatus, expires_in_days: i64) -> ConsentRecord {
        ConsentRecord {
            user_id: "user-1".into(),
            purpose_id: "P-001".into(),
            status,
            granted_at: Some(Utc::now() - chrono::Duration::days(10)),
            expires_at: Some(Utc::now() + chrono::Duration::days(expires_in_days)),
            withdrawn_at: None,
            method: ConsentMethod::Explicit,
            version: 1,
            artifact_id: "art-1".into(),
        }
    }

    fn context() -> ProcessingContext {
        ProcessingContext {
            processor_id: "proc-analytics".into(),
            operation: "profile_export".into(),
        }
    }

    struct Fixture {
        gate: ValidationGate,
        records: Arc<MemoryRecordStore>,
        cache: Arc<GateCache>,
        notifier: Arc<MemoryProcessorNotifier>,
    }

    fn fixture() -> Fixture {
        let records = Arc::new(MemoryRecordStore::new());
        let ledger = Arc::new(MemoryAuditLedger::new());
        let notifier = Arc::new(MemoryProcessorNotifier::new(vec!["proc-analytics".into()]));
        let cache = Arc::new(GateCache::new(Duration::from_secs(30)));
        let halt = Arc::new(HaltCoordinator::new(notifier.clone(), ledger.clone(), 3));
        let gate = ValidationGate::new(records.clone(), cache.clone(), halt, ledger, 30);
        Fixture {
            gate,
            records,
            cache,
            notifier,
        }
    }

    #[tokio::test]
    async fn test_active_consent_granted() {
        let fx = fixture();
        fx.records
            .put(record(ConsentStatus::Granted, 90))
            .await
            .unwrap();

        let response = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert_eq!(response.permission, ProcessingPermission::Granted);
        assert_eq!(response.validity, ValidityStatus::Active);
        assert!(response.reasons.is_empty());
    }

    #[tokio::test]
    async fn test_renewal_window_is_conditional() {
        let fx = fixture();
        fx.records
            .put(record(ConsentStatus::Granted, 10))
            .await
            .unwrap();

        let response = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert_eq!(response.permission, ProcessingPermission::Conditional);
        assert_eq!(response.validity, ValidityStatus::Active);
        assert_eq!(response.reasons, vec!["renewal_due".to_string()]);
    }

    #[tokio::test]
    async fn test_expired_denies_and_halts() {
        let fx = fixture();
        fx.records
            .put(record(ConsentStatus::Granted, -1))
            .await
            .unwrap();

        let response = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert!(response.is_denied());
        assert_eq!(response.validity, ValidityStatus::Expired);
        assert_eq!(fx.notifier.halt_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_withdrawn_denies_and_halts_once() {
        let fx = fixture();
        let mut rec = record(ConsentStatus::Withdrawn, 90);
        rec.withdrawn_at = Some(Utc::now());
        fx.records.put(rec).await.unwrap();

        let first = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        let second = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;

        assert_eq!(first.validity, ValidityStatus::Withdrawn);
        assert!(first.is_denied());
        assert_eq!(second.permission, first.permission);
        assert_eq!(second.validity, first.validity);
        assert_eq!(second.reasons, first.reasons);

        // Halt performed exactly once across repeated denials
        assert_eq!(fx.notifier.halt_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_denies_without_halt() {
        let fx = fixture();
        let response = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;

        assert!(response.is_denied());
        assert_eq!(response.validity, ValidityStatus::Missing);
        assert!(fx.notifier.halt_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let fx = fixture();
        fx.records
            .put(record(ConsentStatus::Granted, 90))
            .await
            .unwrap();
        fx.records.set_fail_reads(true).await;

        let response = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert!(response.is_denied());
        assert_eq!(
            response.reasons,
            vec!["consent_status_unavailable".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cache_serves_within_staleness_window() {
        let fx = fixture();
        fx.records
            .put(record(ConsentStatus::Granted, 90))
            .await
            .unwrap();

        // Populate the cache, then make the store unreachable
        let first = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert_eq!(first.permission, ProcessingPermission::Granted);
        fx.records.set_fail_reads(true).await;

        let second = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert_eq!(second.permission, ProcessingPermission::Granted);
    }

    #[tokio::test]
    async fn test_invalidation_bypasses_cache() {
        let fx = fixture();
        fx.records
            .put(record(ConsentStatus::Granted, 90))
            .await
            .unwrap();
        let first = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert_eq!(first.permission, ProcessingPermission::Granted);

        // Withdraw behind the cache, then invalidate as lifecycle does
        let mut withdrawn = record(ConsentStatus::Withdrawn, 90);
        withdrawn.withdrawn_at = Some(Utc::now());
        fx.records.put(withdrawn).await.unwrap();
        fx.cache.invalidate("user-1", "P-001").await;

        let second = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert!(second.is_denied());
        assert_eq!(second.validity, ValidityStatus::Withdrawn);
    }

    #[tokio::test]
    async fn test_same_instant_yields_identical_responses() {
        let fx = fixture();
        fx.records
            .put(record(ConsentStatus::Granted, 90))
            .await
            .unwrap();

        let at = Utc::now();
        let first = fx.gate.validate("user-1", "P-001", at, &context()).await;
        let second = fx.gate.validate("user-1", "P-001", at, &context()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_instant_past_expiry_denies_without_store_mutation() {
        let fx = fixture();
        fx.records
            .put(record(ConsentStatus::Granted, 90))
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::days(91);
        let response = fx.gate.validate("user-1", "P-001", later, &context()).await;
        assert!(response.is_denied());
        assert_eq!(response.validity, ValidityStatus::Expired);
        assert_eq!(response.checked_at, later);
    }

    #[tokio::test]
    async fn test_pending_record_is_missing_consent() {
        let fx = fixture();
        let mut rec = record(ConsentStatus::Pending, 90);
        rec.granted_at = None;
        rec.expires_at = None;
        fx.records.put(rec).await.unwrap();

        let response = fx.gate.validate("user-1", "P-001", Utc::now(), &context()).await;
        assert!(response.is_denied());
        assert_eq!(response.validity, ValidityStatus::Missing);
        assert!(fx.notifier.halt_calls().await.is_empty());
    }
}
