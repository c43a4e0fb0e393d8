//! In-memory store backends for tests and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::artifact::{ConsentArtifact, NoticeArtifact};
use crate::chain::{head_of, ChainHead, GENESIS_HASH};
use crate::ledger::{AuditEntry, AuditLedger, NewAuditEntry};
use crate::store::{ArtifactStore, NoticeStore, StoreError, StoreResult};

/// In-memory artifact store with per-user chains.
///
/// Appends are validated against the live head under a write lock, which
/// gives the compare-and-swap semantics the engine relies on: of two
/// concurrent appends built against the same head, exactly one wins.
#[derive(Default)]
pub struct MemoryArtifactStore {
    chains: RwLock<HashMap<String, Vec<ConsentArtifact>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn append(&self, artifact: ConsentArtifact) -> StoreResult<()> {
        let mut chains = self.chains.write().await;
        let chain = chains.entry(artifact.user_id.clone()).or_default();

        let (expected_index, expected_hash) = match chain.last() {
            Some(head) => (head.block_index + 1, head.content_hash.as_str()),
            None => (0, GENESIS_HASH),
        };

        if artifact.block_index != expected_index || artifact.previous_hash != expected_hash {
            return Err(StoreError::Conflict {
                user_id: artifact.user_id.clone(),
                expected: artifact.block_index,
                actual: expected_index,
            });
        }

        chain.push(artifact);
        Ok(())
    }

    async fn head(&self, user_id: &str) -> StoreResult<Option<ChainHead>> {
        let chains = self.chains.read().await;
        Ok(chains.get(user_id).and_then(|chain| head_of(chain)))
    }

    async fn chain(&self, user_id: &str) -> StoreResult<Vec<ConsentArtifact>> {
        let chains = self.chains.read().await;
        Ok(chains.get(user_id).cloned().unwrap_or_default())
    }

    async fn get(&self, artifact_id: &str) -> StoreResult<ConsentArtifact> {
        let chains = self.chains.read().await;
        chains
            .values()
            .flatten()
            .find(|artifact| artifact.artifact_id == artifact_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                resource: format!("artifact {artifact_id}"),
            })
    }
}

/// In-memory write-once notice store.
#[derive(Default)]
pub struct MemoryNoticeStore {
    notices: RwLock<HashMap<String, NoticeArtifact>>,
}

impl MemoryNoticeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoticeStore for MemoryNoticeStore {
    async fn put(&self, notice: NoticeArtifact) -> StoreResult<()> {
        let mut notices = self.notices.write().await;
        if notices.contains_key(&notice.notice_id) {
            return Err(StoreError::AlreadyExists {
                resource: format!("notice {}", notice.notice_id),
            });
        }
        notices.insert(notice.notice_id.clone(), notice);
        Ok(())
    }

    async fn get(&self, notice_id: &str) -> StoreResult<NoticeArtifact> {
        let notices = self.notices.read().await;
        notices
            .get(notice_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                resource: format!("notice {notice_id}"),
            })
    }

    async fn get_for_artifact(&self, artifact_id: &str) -> StoreResult<Option<NoticeArtifact>> {
        let notices = self.notices.read().await;
        Ok(notices
            .values()
            .find(|notice| notice.artifact_id == artifact_id)
            .cloned())
    }
}

/// In-memory hash-chained audit ledger.
///
/// Index assignment happens under the write lock, so the monotonic-index
/// guarantee holds under concurrent appends.
#[derive(Default)]
pub struct MemoryAuditLedger {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLedger for MemoryAuditLedger {
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry> {
        let mut entries = self.entries.write().await;
        let index = entries.len() as u64;
        let prev_hash = entries
            .last()
            .map(|last| last.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let sealed = AuditEntry::seal(entry, index, prev_hash)?;
        entries.push(sealed.clone());
        Ok(sealed)
    }

    async fn entries(&self) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.entries.read().await.clone())
    }

    async fn len(&self) -> StoreResult<u64> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn verify(&self) -> StoreResult<()> {
        let entries = self.entries.read().await;
        let mut prev_hash = GENESIS_HASH.to_string();
        for (position, entry) in entries.iter().enumerate() {
            if entry.index != position as u64 {
                return Err(StoreError::Corrupt {
                    message: format!(
                        "ledger index gap at position {position}: entry claims index {}",
                        entry.index
                    ),
                });
            }
            if entry.prev_hash != prev_hash {
                return Err(StoreError::Corrupt {
                    message: format!("ledger link broken at index {}", entry.index),
                });
            }
            if !entry.verify()? {
                return Err(StoreError::Corrupt {
                    message: format!("ledger entry hash mismatch at index {}", entry.index),
                });
            }
            prev_hash = entry.entry_hash.clone();
        }
        Ok(())
    }
}
