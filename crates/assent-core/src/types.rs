//! Domain model for the consent engine.
//!
//! Requirement kinds are a tagged sum rather than one struct with optional
//! fields, so a renewal always carries its prior expiry and an update
//! always names the changed purposes — illegal states are unrepresentable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use assent_evidence::artifact::{DecisionMap, InteractionMetadata};

/// Category a purpose belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurposeCategory {
    Essential,
    Marketing,
    Analytics,
    Personalization,
    ThirdPartySharing,
}

/// Legal basis under which a purpose processes personal data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalBasis {
    Consent,
    Contract,
    LegalObligation,
    LegitimateInterest,
}

impl LegalBasis {
    /// Display text for notice rendering.
    pub fn display(&self) -> &'static str {
        match self {
            Self::Consent => "Consent of the data principal",
            Self::Contract => "Performance of a contract",
            Self::LegalObligation => "Compliance with a legal obligation",
            Self::LegitimateInterest => "Legitimate interest of the fiduciary",
        }
    }
}

/// A named, scoped reason for processing personal data.
///
/// Immutable once referenced by a sealed artifact; a changed purpose gets a
/// new identifier and a new version in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purpose {
    /// Stable identifier, e.g. "P-001".
    pub purpose_id: String,
    /// Short display name.
    pub name: String,
    /// Description shown in notices.
    pub description: String,
    /// Category grouping.
    pub category: PurposeCategory,
    /// Essential purposes cannot be declined.
    pub is_essential: bool,
    /// Legal basis for processing.
    pub legal_basis: LegalBasis,
    /// Retention period in days.
    pub retention_days: u32,
    /// Personal data categories this purpose touches.
    pub data_types: Vec<String>,
}

/// Requirement priority. Ordering: `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
}

/// Why consent is being asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequirementKind {
    /// First-time collection for new purposes.
    New,
    /// Renewal of an expiring consent.
    Renewal {
        /// When the current consent expires.
        prior_expiry: DateTime<Utc>,
    },
    /// Re-consent because purposes changed materially.
    Update {
        /// The purpose ids whose terms changed.
        changed_purposes: Vec<String>,
    },
}

impl RequirementKind {
    /// Stable label for summaries and audit payloads.
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Renewal { .. } => "renewal",
            Self::Update { .. } => "update",
        }
    }
}

/// Workflow status of a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Pending,
    InProgress,
    Completed,
    Error,
    Expired,
}

impl RequirementStatus {
    /// Terminal requirements never surface in detection again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }

    /// Lowercase label for audit entries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Expired => "expired",
        }
    }
}

/// An outstanding consent requirement for one user.
///
/// Owns its purposes by reference: `purpose_ids` point into the external
/// purpose catalog, which is the single source of purpose metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequirement {
    /// Stable identifier.
    pub requirement_id: String,
    /// The data principal this requirement belongs to.
    pub user_id: String,
    /// The data fiduciary that originated the requirement.
    pub fiduciary_id: String,
    /// Why consent is being asked for.
    pub kind: RequirementKind,
    /// Purposes to be decided, by catalog reference.
    pub purpose_ids: Vec<String>,
    /// Presentation priority.
    pub priority: Priority,
    /// Blocking requirements demand immediate presentation.
    pub is_blocking: bool,
    /// Decision due date; past due, the requirement expires without action.
    pub due_date: DateTime<Utc>,
    /// Workflow status.
    pub status: RequirementStatus,
    /// Notice template to render this requirement with.
    pub template_id: String,
}

/// How consent was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentMethod {
    /// Explicit decision against a rendered notice.
    Explicit,
    /// Confirmed renewal of an existing grant.
    Renewal,
}

/// Current validity status of a consent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Granted,
    Renewed,
    Withdrawn,
    Expired,
}

impl ConsentStatus {
    /// Whether processing may rely on this status (before expiry checks).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Granted | Self::Renewed)
    }

    /// Withdrawn and expired records are terminal for their artifact chain;
    /// only a fresh consent collection revives the (user, purpose) pair.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Withdrawn | Self::Expired)
    }

    /// Legal transitions of the lifecycle state machine:
    /// `PENDING → GRANTED → {RENEWED ⇄ GRANTED} → WITHDRAWN`,
    /// `GRANTED/RENEWED → EXPIRED`.
    pub fn can_transition_to(&self, next: ConsentStatus) -> bool {
        use ConsentStatus::*;
        matches!(
            (self, next),
            (Pending, Granted)
                | (Granted, Renewed)
                | (Renewed, Granted)
                | (Granted, Withdrawn)
                | (Renewed, Withdrawn)
                | (Granted, Expired)
                | (Renewed, Expired)
        )
    }

    /// Lowercase label for audit entries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Granted => "granted",
            Self::Renewed => "renewed",
            Self::Withdrawn => "withdrawn",
            Self::Expired => "expired",
        }
    }
}

/// The queryable "current status" projection for one (user, purpose) pair.
///
/// Derived from the latest applicable sealed artifact plus lifecycle
/// events. This is what the validation gate reads; the artifact chain
/// remains the source of truth for disputes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// The data principal.
    pub user_id: String,
    /// The purpose this record covers.
    pub purpose_id: String,
    /// Current lifecycle status.
    pub status: ConsentStatus,
    /// When consent was granted.
    pub granted_at: Option<DateTime<Utc>>,
    /// When consent expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// When consent was withdrawn, if it was.
    pub withdrawn_at: Option<DateTime<Utc>>,
    /// How consent was obtained.
    pub method: ConsentMethod,
    /// Monotonic record version, bumped on every lifecycle change.
    pub version: u32,
    /// The sealed artifact this record derives from.
    pub artifact_id: String,
}

impl ConsentRecord {
    /// Whether this record authorizes processing at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if !self.status.is_active() {
            return false;
        }
        match self.expires_at {
            Some(expiry) => now < expiry,
            None => false,
        }
    }
}
