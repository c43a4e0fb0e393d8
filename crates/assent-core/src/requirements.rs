//! Requirement source port.
//!
//! Consent requirements originate in the owning fiduciary systems; the
//! engine reads them and advances their workflow status. Production backs
//! this with the fiduciary's API, tests use [`MemoryRequirementSource`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{ConsentError, ConsentResult};
use crate::types::{ConsentRequirement, RequirementStatus};

/// Requirement lookup and status advancement.
#[async_trait]
pub trait RequirementSource: Send + Sync {
    /// All non-terminal requirements for a user.
    async fn pending_for_user(&self, user_id: &str) -> ConsentResult<Vec<ConsentRequirement>>;

    /// Fetch one requirement by id.
    async fn get(&self, requirement_id: &str) -> ConsentResult<ConsentRequirement>;

    /// Advance a requirement's workflow status.
    async fn update_status(
        &self,
        requirement_id: &str,
        status: RequirementStatus,
    ) -> ConsentResult<()>;
}

/// In-memory requirement source for tests.
#[derive(Default)]
pub struct MemoryRequirementSource {
    requirements: RwLock<HashMap<String, ConsentRequirement>>,
    /// When set, `pending_for_user` fails — exercises the fail-open
    /// detection path.
    fail_lookups: RwLock<bool>,
}

impl MemoryRequirementSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, requirement: ConsentRequirement) {
        self.requirements
            .write()
            .await
            .insert(requirement.requirement_id.clone(), requirement);
    }

    pub async fn set_fail_lookups(&self, fail: bool) {
        *self.fail_lookups.write().await = fail;
    }
}

#[async_trait]
impl RequirementSource for MemoryRequirementSource {
    async fn pending_for_user(&self, user_id: &str) -> ConsentResult<Vec<ConsentRequirement>> {
        if *self.fail_lookups.read().await {
            return Err(ConsentError::network("requirement lookup unavailable"));
        }
        Ok(self
            .requirements
            .read()
            .await
            .values()
            .filter(|req| req.user_id == user_id && !req.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn get(&self, requirement_id: &str) -> ConsentResult<ConsentRequirement> {
        self.requirements
            .read()
            .await
            .get(requirement_id)
            .cloned()
            .ok_or_else(|| ConsentError::not_found(format!("requirement {requirement_id}")))
    }

    async fn update_status(
        &self,
        requirement_id: &str,
        status: RequirementStatus,
    ) -> ConsentResult<()> {
        let mut requirements = self.requirements.write().await;
        let requirement = requirements
            .get_mut(requirement_id)
            .ok_or_else(|| ConsentError::not_found(format!("requirement {requirement_id}")))?;
        requirement.status = status;
        Ok(())
    }
}
