//! Append-only audit ledger.
//!
//! Every lifecycle action writes exactly one [`AuditEntry`]. Entries are
//! hash-chained to their predecessor and carry a monotonic index that the
//! store assigns — ordering is enforced by the ledger, not by caller
//! convention. Entries are never updated or deleted.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::id::hash_canonical;
use crate::store::StoreResult;

/// Lifecycle actions recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RequirementDetected,
    RequirementStatusChanged,
    DecisionsRejected,
    ArtifactSealed,
    ConsentGranted,
    ConsentRenewed,
    ConsentWithdrawn,
    ConsentExpired,
    ProcessingDenied,
    ProcessorsNotified,
}

/// Caller-supplied portion of an audit entry.
///
/// The ledger assigns `index`, `prev_hash` and `entry_hash` on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    /// Who acted (user id or system component name).
    pub actor: String,
    /// What happened.
    pub action: AuditAction,
    /// The resource acted on (requirement id, artifact id, record key).
    pub resource: String,
    /// Status before the action, if the action changed a status.
    pub old_status: Option<String>,
    /// Status after the action, if the action changed a status.
    pub new_status: Option<String>,
    /// Machine-readable reason code.
    pub reason: String,
    /// Free-form structured details.
    pub details: serde_json::Value,
    /// When the action happened.
    pub at: DateTime<Utc>,
}

/// A sealed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub entry_id: String,
    /// Store-assigned monotonic position.
    pub index: u64,
    /// Who acted.
    pub actor: String,
    /// What happened.
    pub action: AuditAction,
    /// The resource acted on.
    pub resource: String,
    /// Status before the action.
    pub old_status: Option<String>,
    /// Status after the action.
    pub new_status: Option<String>,
    /// Machine-readable reason code.
    pub reason: String,
    /// Free-form structured details.
    pub details: serde_json::Value,
    /// When the action happened.
    pub at: DateTime<Utc>,
    /// `entry_hash` of the previous entry, or the genesis hash at index 0.
    pub prev_hash: String,
    /// SHA-256 over the canonical entry content (excluding this field).
    pub entry_hash: String,
}

/// Hash input: everything that identifies the entry, excluding the hash
/// itself.
#[derive(Serialize)]
struct EntryHashInput<'a> {
    index: u64,
    actor: &'a str,
    action: AuditAction,
    resource: &'a str,
    old_status: Option<&'a str>,
    new_status: Option<&'a str>,
    reason: &'a str,
    details: &'a serde_json::Value,
    at: &'a DateTime<Utc>,
    prev_hash: &'a str,
}

impl AuditEntry {
    /// Seal a new entry at the given chain position.
    pub fn seal(new: NewAuditEntry, index: u64, prev_hash: String) -> Result<Self> {
        let entry_hash = hash_canonical(&EntryHashInput {
            index,
            actor: &new.actor,
            action: new.action,
            resource: &new.resource,
            old_status: new.old_status.as_deref(),
            new_status: new.new_status.as_deref(),
            reason: &new.reason,
            details: &new.details,
            at: &new.at,
            prev_hash: &prev_hash,
        })?;
        Ok(Self {
            entry_id: format!("aud_{}", Uuid::new_v4()),
            index,
            actor: new.actor,
            action: new.action,
            resource: new.resource,
            old_status: new.old_status,
            new_status: new.new_status,
            reason: new.reason,
            details: new.details,
            at: new.at,
            prev_hash,
            entry_hash,
        })
    }

    /// Recompute and check this entry's hash.
    pub fn verify(&self) -> Result<bool> {
        let recomputed = hash_canonical(&EntryHashInput {
            index: self.index,
            actor: &self.actor,
            action: self.action,
            resource: &self.resource,
            old_status: self.old_status.as_deref(),
            new_status: self.new_status.as_deref(),
            reason: &self.reason,
            details: &self.details,
            at: &self.at,
            prev_hash: &self.prev_hash,
        })?;
        Ok(recomputed == self.entry_hash)
    }
}

/// The append-only ledger port.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Append an entry. The ledger assigns the index and chain linkage.
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry>;

    /// All entries in index order.
    async fn entries(&self) -> StoreResult<Vec<AuditEntry>>;

    /// Number of entries.
    async fn len(&self) -> StoreResult<u64>;

    /// Walk the chain and verify every entry hash and link.
    async fn verify(&self) -> StoreResult<()>;
}
