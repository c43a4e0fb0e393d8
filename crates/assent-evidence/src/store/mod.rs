//! Storage ports for artifacts and notice artifacts.
//!
//! The engine depends only on these traits; production deployments back
//! them with a database or ledger service, tests use the in-memory
//! implementations in [`memory`].
//!
//! # Design Principles
//!
//! 1. **Optimistic concurrency**: appends carry the chain position they were
//!    built against; the store rejects stale appends with
//!    [`StoreError::Conflict`] so two concurrent submissions cannot both
//!    seal against the same head.
//! 2. **Write-once**: artifacts and notice artifacts are immutable; a
//!    duplicate write fails with [`StoreError::AlreadyExists`].
//! 3. **Testable**: every port has a memory backend.

pub mod error;
pub mod memory;

use async_trait::async_trait;

use crate::artifact::{ConsentArtifact, NoticeArtifact};
use crate::chain::ChainHead;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryArtifactStore, MemoryAuditLedger, MemoryNoticeStore};

/// Append-only store for per-user consent artifact chains.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Append a sealed artifact to its user's chain.
    ///
    /// The artifact's `block_index` and `previous_hash` name the head it was
    /// built against. If the chain has moved, returns
    /// [`StoreError::Conflict`] and stores nothing.
    async fn append(&self, artifact: ConsentArtifact) -> StoreResult<()>;

    /// Current head of a user's chain, or `None` for a fresh chain.
    async fn head(&self, user_id: &str) -> StoreResult<Option<ChainHead>>;

    /// The full chain for a user, in block order.
    async fn chain(&self, user_id: &str) -> StoreResult<Vec<ConsentArtifact>>;

    /// Fetch a single artifact by id.
    async fn get(&self, artifact_id: &str) -> StoreResult<ConsentArtifact>;
}

/// Write-once store for notice artifacts.
#[async_trait]
pub trait NoticeStore: Send + Sync {
    /// Store a notice artifact. Duplicate ids fail with `AlreadyExists`.
    async fn put(&self, notice: NoticeArtifact) -> StoreResult<()>;

    /// Fetch a notice artifact by id.
    async fn get(&self, notice_id: &str) -> StoreResult<NoticeArtifact>;

    /// Fetch the notice paired with a consent artifact, if one was sealed.
    async fn get_for_artifact(&self, artifact_id: &str) -> StoreResult<Option<NoticeArtifact>>;
}
