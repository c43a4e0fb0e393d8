//! Request and response types for the engine's operations.
//!
//! Thin, serializable shells around the domain types — the transport layer
//! (HTTP, queue worker, CLI) maps onto these without touching engine
//! internals.

use assent_evidence::artifact::ConsentArtifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::ProcessingContext;
use crate::types::{DecisionMap, InteractionMetadata, RequirementStatus};

/// Ask which consent requirements are outstanding for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequirementsRequest {
    pub user_id: String,
}

/// Render the notice for one requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateNoticeRequest {
    pub requirement_id: String,
    /// Requested language; falls back to the configured default.
    #[serde(default)]
    pub language: Option<String>,
}

/// Submit decisions against a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitDecisionsRequest {
    pub requirement_id: String,
    /// Per-purpose decisions. Absent optional purposes default to declined;
    /// absent essential purposes reject the submission.
    pub decisions: DecisionMap,
    pub metadata: InteractionMetadata,
    /// When set, the notice rendered in this language is sealed alongside
    /// the consent artifact.
    #[serde(default)]
    pub notice_language: Option<String>,
}

/// A sealed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitDecisionsResponse {
    pub artifact: ConsentArtifact,
    /// The paired notice artifact, when one was sealed.
    pub notice_id: Option<String>,
}

/// Advance a requirement's workflow status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequirementStatusRequest {
    pub requirement_id: String,
    pub status: RequirementStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Ask the gate whether processing may proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateProcessingRequest {
    pub user_id: String,
    pub purpose_id: String,
    /// Instant the check is evaluated against; the answer is a pure
    /// function of (user, purpose, timestamp) and the stored records.
    pub timestamp: DateTime<Utc>,
    pub context: ProcessingContext,
}

/// Renew consent for one or more purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewConsentRequest {
    pub user_id: String,
    pub purpose_ids: Vec<String>,
    /// False sends a renewal prompt only; true extends the validity window.
    pub user_confirmed: bool,
}

/// Withdraw consent for one or more purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawConsentRequest {
    pub user_id: String,
    pub purpose_ids: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Defaults to now.
    #[serde(default)]
    pub effective_at: Option<DateTime<Utc>>,
}
