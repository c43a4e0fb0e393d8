//! Per-user artifact chain verification.
//!
//! Every user's artifacts form an append-only hash chain:
//! `artifact[i].previous_hash == artifact[i-1].content_hash`, with
//! contiguous `block_index` values starting at 0. Verification works over
//! any prefix, so a dispute audit can stop at the artifact in question.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ConsentArtifact;

/// `previous_hash` of the first artifact in a chain.
pub const GENESIS_HASH: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// The current head of a user's chain, used for optimistic concurrency:
/// an append must name the head it was built against, and loses the race
/// if the head has moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Owner of the chain.
    pub user_id: String,
    /// `block_index` of the latest artifact.
    pub block_index: u64,
    /// `content_hash` of the latest artifact.
    pub head_hash: String,
}

/// A broken chain, with enough detail to locate the break.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain is non-contiguous at position {position}: expected block_index {expected}, found {found}")]
    NonContiguous {
        position: usize,
        expected: u64,
        found: u64,
    },

    #[error("broken link at block_index {block_index}: previous_hash does not match the preceding artifact")]
    BrokenLink { block_index: u64 },

    #[error("first artifact does not start from the genesis hash")]
    BadGenesis,

    #[error("artifact at block_index {block_index} belongs to user {found}, chain owner is {expected}")]
    ForeignArtifact {
        block_index: u64,
        expected: String,
        found: String,
    },
}

/// Verify the linkage of a chain prefix.
///
/// Checks genesis linkage, contiguous indices, consistent ownership, and
/// the `previous_hash` link of every artifact. Does not recompute content
/// hashes; pair with [`crate::artifact::verify_artifact`] when the artifact
/// bytes themselves are untrusted.
pub fn verify_chain(artifacts: &[ConsentArtifact]) -> Result<(), ChainError> {
    let Some(first) = artifacts.first() else {
        return Ok(());
    };

    if first.block_index != 0 {
        return Err(ChainError::NonContiguous {
            position: 0,
            expected: 0,
            found: first.block_index,
        });
    }
    if first.previous_hash != GENESIS_HASH {
        return Err(ChainError::BadGenesis);
    }

    for (position, window) in artifacts.windows(2).enumerate() {
        let (prev, next) = (&window[0], &window[1]);

        if next.user_id != first.user_id {
            return Err(ChainError::ForeignArtifact {
                block_index: next.block_index,
                expected: first.user_id.clone(),
                found: next.user_id.clone(),
            });
        }
        if next.block_index != prev.block_index + 1 {
            return Err(ChainError::NonContiguous {
                position: position + 1,
                expected: prev.block_index + 1,
                found: next.block_index,
            });
        }
        if next.previous_hash != prev.content_hash {
            return Err(ChainError::BrokenLink {
                block_index: next.block_index,
            });
        }
    }

    Ok(())
}

/// The head implied by the last artifact of a verified chain.
pub fn head_of(artifacts: &[ConsentArtifact]) -> Option<ChainHead> {
    artifacts.last().map(|last| ChainHead {
        user_id: last.user_id.clone(),
        block_index: last.block_index,
        head_hash: last.content_hash.clone(),
    })
}
