//! User profile lookup port.
//!
//! External collaborator: the engine only needs to know whether a principal
//! is a minor (notice artifacts record the presentation type) and where to
//! send lifecycle notifications.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::ConsentResult;

/// How a principal prefers to receive lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    #[default]
    Email,
    Sms,
    InApp,
}

/// Read-only principal profile lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether the principal is a minor (guardian consent flows apply).
    async fn is_minor(&self, user_id: &str) -> ConsentResult<bool>;

    /// Preferred notification channel; defaults when unknown.
    async fn notification_channel(&self, user_id: &str) -> ConsentResult<NotificationChannel>;
}

/// In-memory directory for tests.
#[derive(Default)]
pub struct MemoryUserDirectory {
    minors: RwLock<HashSet<String>>,
    channels: RwLock<HashMap<String, NotificationChannel>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_minor(&self, user_id: &str) {
        self.minors.write().await.insert(user_id.to_string());
    }

    pub async fn set_channel(&self, user_id: &str, channel: NotificationChannel) {
        self.channels
            .write()
            .await
            .insert(user_id.to_string(), channel);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn is_minor(&self, user_id: &str) -> ConsentResult<bool> {
        Ok(self.minors.read().await.contains(user_id))
    }

    async fn notification_channel(&self, user_id: &str) -> ConsentResult<NotificationChannel> {
        Ok(self
            .channels
            .read()
            .await
            .get(user_id)
            .copied()
            .unwrap_or_default())
    }
}
