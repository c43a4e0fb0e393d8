//! Cryptographic primitives for consent artifacts.
//!
//! - `jcs`: RFC 8785 canonical JSON serialization
//! - `id`: content hashing, chain roots, and the signature port

pub mod id;
pub mod jcs;
