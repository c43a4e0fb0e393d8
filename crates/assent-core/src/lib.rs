//! Consent Lifecycle & Validation Engine.
//!
//! Models consent as a governed, auditable resource: a data principal
//! grants, renews, or withdraws permission for named processing purposes;
//! decisions are sealed into hash-chained artifacts
//! ([`assent_evidence`]); every processing attempt is gated on a live
//! validity check; every state change lands in an append-only audit
//! ledger.
//!
//! Components are explicitly constructed and dependency-injected — there is
//! no global service instance. [`service::ConsentService`] is the facade
//! that wires them together; [`service::ConsentService::in_memory`] builds
//! a fully functional engine on the in-memory backends for tests and
//! single-process use.

pub mod api;
pub mod catalog;
pub mod config;
pub mod decision;
pub mod detector;
pub mod directory;
pub mod errors;
pub mod gate;
pub mod lifecycle;
pub mod notice;
pub mod record;
pub mod requirements;
pub mod sealer;
pub mod service;
pub mod types;

// Convenience re-exports
pub use config::ConsentConfig;
pub use errors::{ConsentError, ConsentResult};
pub use gate::{
    ConsentValidationResponse, ProcessingContext, ProcessingPermission, ValidationGate,
    ValidityStatus,
};
pub use lifecycle::{RenewalOutcome, WithdrawalOutcome};
pub use service::{ConsentService, InMemoryBackends, ServiceBackends};
pub use types::{
    ConsentRecord, ConsentRequirement, ConsentStatus, Priority, Purpose, RequirementKind,
    RequirementStatus,
};
