pub mod artifact;
pub mod chain;
pub mod crypto;
pub mod ledger;
pub mod store;

// Convenience re-exports
pub use artifact::{
    seal_artifact, verify_artifact, ArtifactContent, ConsentArtifact, DecisionMap,
    InteractionMetadata, NoticeArtifact, UserType,
};
pub use chain::{verify_chain, ChainError, ChainHead, GENESIS_HASH};
pub use crypto::id::{HmacSigner, Signer};
pub use ledger::{AuditAction, AuditEntry, AuditLedger, NewAuditEntry};
pub use store::{
    ArtifactStore, MemoryArtifactStore, MemoryAuditLedger, MemoryNoticeStore, NoticeStore,
    StoreError, StoreResult,
};
