//! Error taxonomy for the consent engine.
//!
//! Propagation policy:
//! - validation errors are reported to the caller with the offending
//!   purposes, never silently defaulted;
//! - integrity and conflict errors fail closed;
//! - detection errors may fail open for presentation only — the validation
//!   gate, not the notice surface, is the enforcement point.

use assent_evidence::store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type ConsentResult<T> = Result<T, ConsentError>;

/// Errors surfaced by the consent engine.
#[derive(Debug, Error)]
pub enum ConsentError {
    /// Essential purposes missing or declined in a submission.
    /// Rejected locally; no artifact is created.
    #[error("validation failed: essential purposes not granted: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    /// Requirement lookup failed. Presentation may degrade to "no pending
    /// consents"; never used to authorize processing.
    #[error("detection failed: {message}")]
    Detection { message: String },

    /// Hash or signature mismatch on artifact read. Treated as missing
    /// consent downstream, never silently trusted.
    #[error("integrity failure: {message}")]
    Integrity { message: String },

    /// A concurrent write won the race on the chain head. The caller must
    /// resubmit against the new head.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// External call failure. The validation gate fails closed on these.
    #[error("network failure: {message}")]
    Network { message: String },

    /// The named resource does not exist.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// A lifecycle transition the state machine forbids.
    #[error("illegal transition for {resource}: {from} -> {to}")]
    IllegalTransition {
        resource: String,
        from: String,
        to: String,
    },

    /// Other errors.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ConsentError {
    pub fn detection(message: impl Into<String>) -> Self {
        Self::Detection {
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// True for a rejected submission (essential purposes not granted).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// True for a lost chain-head race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True when stored data failed an integrity check.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}

impl From<StoreError> for ConsentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { resource } => Self::NotFound { resource },
            StoreError::AlreadyExists { resource } => Self::Conflict {
                message: format!("write-once resource already exists: {resource}"),
            },
            StoreError::Conflict {
                user_id,
                expected,
                actual,
            } => Self::Conflict {
                message: format!(
                    "chain head moved for {user_id}: built against {expected}, head at {actual}"
                ),
            },
            StoreError::Corrupt { message } => Self::Integrity { message },
            StoreError::Io { message } => Self::Network { message },
            StoreError::Other(err) => Self::Other(err),
        }
    }
}
