//! Error types for artifact, notice, and ledger storage.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur against a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named resource does not exist.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Write-once resource already exists.
    /// Not necessarily an error: for idempotent writers it means done.
    #[error("already exists: {resource}")]
    AlreadyExists { resource: String },

    /// An optimistic append lost the race on the chain head.
    /// The caller must re-read the head and retry or surface the conflict.
    #[error("chain head conflict for {user_id}: append built against block_index {expected}, head is at {actual}")]
    Conflict {
        user_id: String,
        expected: u64,
        actual: u64,
    },

    /// Stored bytes failed an integrity check. Fail closed.
    #[error("integrity failure: {message}")]
    Corrupt { message: String },

    /// Network or I/O error against the backend.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Other errors.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// True if this is a lost chain-head race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True if the resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True if this indicates the write-once resource already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// True if stored data failed integrity verification.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}
