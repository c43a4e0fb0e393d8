//! Consent record store port.
//!
//! The record store holds the read-optimized (user, purpose) projection the
//! validation gate reads. It is owned by the lifecycle manager: the sealer
//! and lifecycle workflows are the only writers.

use std::collections::HashMap;

use assent_evidence::store::{StoreError, StoreResult};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::ConsentRecord;

/// Keyed by (user, purpose).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Current record for a (user, purpose) pair.
    async fn get(&self, user_id: &str, purpose_id: &str) -> StoreResult<Option<ConsentRecord>>;

    /// Upsert a record. Callers bump `version` on every change.
    async fn put(&self, record: ConsentRecord) -> StoreResult<()>;

    /// All records for one user.
    async fn for_user(&self, user_id: &str) -> StoreResult<Vec<ConsentRecord>>;

    /// All records. Used by the expiry sweep.
    async fn all(&self) -> StoreResult<Vec<ConsentRecord>>;
}

/// In-memory record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<(String, String), ConsentRecord>>,
    /// When set, reads fail — exercises the gate's fail-closed path.
    fail_reads: RwLock<bool>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.write().await = fail;
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, user_id: &str, purpose_id: &str) -> StoreResult<Option<ConsentRecord>> {
        if *self.fail_reads.read().await {
            return Err(StoreError::Io {
                message: "record store unavailable".into(),
            });
        }
        Ok(self
            .records
            .read()
            .await
            .get(&(user_id.to_string(), purpose_id.to_string()))
            .cloned())
    }

    async fn put(&self, record: ConsentRecord) -> StoreResult<()> {
        self.records.write().await.insert(
            (record.user_id.clone(), record.purpose_id.clone()),
            record,
        );
        Ok(())
    }

    async fn for_user(&self, user_id: &str) -> StoreResult<Vec<ConsentRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn all(&self) -> StoreResult<Vec<ConsentRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
