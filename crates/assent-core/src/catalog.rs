//! Purpose/template catalog port.
//!
//! The catalog is an external, read-only collaborator: it owns purpose
//! metadata, legal basis and retention text, and notice template content.
//! The engine depends only on this interface; production backs it with the
//! fiduciary's catalog service, tests use [`MemoryCatalog`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::{ConsentError, ConsentResult};
use crate::types::Purpose;

/// Versioned notice template content for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeTemplate {
    /// Template identifier.
    pub template_id: String,
    /// Template version; bumped on any content change.
    pub version: u32,
    /// Language this rendering is in.
    pub language: String,
    /// Notice title.
    pub title: String,
    /// Introductory text shown above the purpose list.
    pub intro: String,
}

/// Read-only purpose and template lookup.
#[async_trait]
pub trait PurposeCatalog: Send + Sync {
    /// Fetch a purpose by id.
    async fn purpose(&self, purpose_id: &str) -> ConsentResult<Purpose>;

    /// Fetch several purposes, preserving input order.
    async fn purposes(&self, purpose_ids: &[String]) -> ConsentResult<Vec<Purpose>> {
        let mut out = Vec::with_capacity(purpose_ids.len());
        for id in purpose_ids {
            out.push(self.purpose(id).await?);
        }
        Ok(out)
    }

    /// Fetch a template in the given language, `None` if that language has
    /// no rendering.
    async fn template(
        &self,
        template_id: &str,
        language: &str,
    ) -> ConsentResult<Option<NoticeTemplate>>;
}

/// In-memory catalog for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryCatalog {
    purposes: RwLock<HashMap<String, Purpose>>,
    templates: RwLock<HashMap<(String, String), NoticeTemplate>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_purpose(&self, purpose: Purpose) {
        self.purposes
            .write()
            .await
            .insert(purpose.purpose_id.clone(), purpose);
    }

    pub async fn add_template(&self, template: NoticeTemplate) {
        self.templates.write().await.insert(
            (template.template_id.clone(), template.language.clone()),
            template,
        );
    }
}

#[async_trait]
impl PurposeCatalog for MemoryCatalog {
    async fn purpose(&self, purpose_id: &str) -> ConsentResult<Purpose> {
        self.purposes
            .read()
            .await
            .get(purpose_id)
            .cloned()
            .ok_or_else(|| ConsentError::not_found(format!("purpose {purpose_id}")))
    }

    async fn template(
        &self,
        template_id: &str,
        language: &str,
    ) -> ConsentResult<Option<NoticeTemplate>> {
        Ok(self
            .templates
            .read()
            .await
            .get(&(template_id.to_string(), language.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LegalBasis, PurposeCategory};

    fn purpose(id: &str) -> Purpose {
        Purpose {
            purpose_id: id.into(),
            name: format!("Purpose {id}"),
            description: "desc".into(),
            category: PurposeCategory::Analytics,
            is_essential: false,
            legal_basis: LegalBasis::Consent,
            retention_days: 365,
            data_types: vec!["usage".into()],
        }
    }

    #[tokio::test]
    async fn test_purpose_lookup() {
        let catalog = MemoryCatalog::new();
        catalog.add_purpose(purpose("P-001")).await;

        assert_eq!(catalog.purpose("P-001").await.unwrap().purpose_id, "P-001");
        assert!(matches!(
            catalog.purpose("P-404").await.unwrap_err(),
            ConsentError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_purposes_preserve_order() {
        let catalog = MemoryCatalog::new();
        catalog.add_purpose(purpose("P-002")).await;
        catalog.add_purpose(purpose("P-001")).await;

        let fetched = catalog
            .purposes(&["P-001".into(), "P-002".into()])
            .await
            .unwrap();
        let ids: Vec<_> = fetched.iter().map(|p| p.purpose_id.as_str()).collect();
        assert_eq!(ids, vec!["P-001", "P-002"]);
    }

    #[tokio::test]
    async fn test_template_by_language() {
        let catalog = MemoryCatalog::new();
        catalog
            .add_template(NoticeTemplate {
                template_id: "tpl-1".into(),
                version: 2,
                language: "en".into(),
                title: "Your consent".into(),
                intro: "Please review".into(),
            })
            .await;

        assert!(catalog.template("tpl-1", "en").await.unwrap().is_some());
        assert!(catalog.template("tpl-1", "hi").await.unwrap().is_none());
    }
}
