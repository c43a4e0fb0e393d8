//! Notice rendering.
//!
//! Expands a requirement + language into display-ready content. Pure
//! function of (requirement, template, purposes, language): no decision
//! state, no side effects. A missing language degrades to the configured
//! default rather than failing — this is presentation-only and
//! non-blocking.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::PurposeCatalog;
use crate::errors::{ConsentError, ConsentResult};
use crate::requirements::RequirementSource;
use crate::types::Purpose;

/// Display-ready content for one purpose in a notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurposeNotice {
    pub purpose_id: String,
    pub name: String,
    pub description: String,
    pub legal_basis: String,
    pub retention_days: u32,
    pub data_types: Vec<String>,
    /// Essential purposes render without a decline control.
    pub is_essential: bool,
}

impl PurposeNotice {
    fn from_purpose(purpose: &Purpose) -> Self {
        Self {
            purpose_id: purpose.purpose_id.clone(),
            name: purpose.name.clone(),
            description: purpose.description.clone(),
            legal_basis: purpose.legal_basis.display().to_string(),
            retention_days: purpose.retention_days,
            data_types: purpose.data_types.clone(),
            is_essential: purpose.is_essential,
        }
    }
}

/// Ephemeral view-model for one requirement in one language.
///
/// Never persisted on its own; the sealed notice artifact is what captures
/// exactly what was shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeRenderingData {
    pub requirement_id: String,
    /// The language actually rendered (after any fallback).
    pub language: String,
    /// True when the requested language was unavailable.
    pub language_fallback: bool,
    pub template_id: String,
    pub template_version: u32,
    pub title: String,
    pub intro: String,
    pub purposes: Vec<PurposeNotice>,
    /// False when every purpose is essential — nothing to toggle.
    pub allow_granular_choice: bool,
}

impl NoticeRenderingData {
    /// Flatten to the plain-text content sealed into a notice artifact.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.title);
        out.push_str("\n\n");
        out.push_str(&self.intro);
        for purpose in &self.purposes {
            out.push_str("\n\n");
            out.push_str(&purpose.name);
            if purpose.is_essential {
                out.push_str(" (required)");
            }
            out.push('\n');
            out.push_str(&purpose.description);
            out.push('\n');
            out.push_str(&format!(
                "Legal basis: {}. Retention: {} days. Data: {}.",
                purpose.legal_basis,
                purpose.retention_days,
                purpose.data_types.join(", ")
            ));
        }
        out
    }

    /// Purpose ids shown, in render order.
    pub fn purpose_ids(&self) -> Vec<String> {
        self.purposes
            .iter()
            .map(|purpose| purpose.purpose_id.clone())
            .collect()
    }
}

/// Renders notices from the catalog.
pub struct NoticeRenderer {
    source: Arc<dyn RequirementSource>,
    catalog: Arc<dyn PurposeCatalog>,
    default_language: String,
}

impl NoticeRenderer {
    pub fn new(
        source: Arc<dyn RequirementSource>,
        catalog: Arc<dyn PurposeCatalog>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            source,
            catalog,
            default_language: default_language.into(),
        }
    }

    /// Render a requirement's notice in the requested language, falling
    /// back to the default language when unavailable.
    pub async fn render(
        &self,
        requirement_id: &str,
        language: &str,
    ) -> ConsentResult<NoticeRenderingData> {
        let requirement = self.source.get(requirement_id).await?;
        let purposes = self.catalog.purposes(&requirement.purpose_ids).await?;

        let (template, language_fallback) = match self
            .catalog
            .template(&requirement.template_id, language)
            .await?
        {
            Some(template) => (template, false),
            None => {
                tracing::debug!(
                    requirement_id,
                    requested = language,
                    fallback = %self.default_language,
                    "notice language unavailable, falling back"
                );
                let template = self
                    .catalog
                    .template(&requirement.template_id, &self.default_language)
                    .await?
                    .ok_or_else(|| {
                        ConsentError::not_found(format!(
                            "template {} in {} or {}",
                            requirement.template_id, language, self.default_language
                        ))
                    })?;
                (template, true)
            }
        };

        let purpose_notices: Vec<PurposeNotice> =
            purposes.iter().map(PurposeNotice::from_purpose).collect();
        let allow_granular_choice = purpose_notices.iter().any(|purpose| !purpose.is_essential);

        Ok(NoticeRenderingData {
            requirement_id: requirement.requirement_id,
            language: template.language.clone(),
            language_fallback,
            template_id: template.template_id,
            template_version: template.version,
            title: template.title,
            intro: template.intro,
            purposes: purpose_notices,
            allow_granular_choice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, NoticeTemplate};
    use crate::requirements::MemoryRequirementSource;
    use crate::types::{
        ConsentRequirement, LegalBasis, Priority, PurposeCategory, RequirementKind,
        RequirementStatus,
    };
    use chrono::{TimeZone, Utc};

    fn purpose(id: &str, essential: bool) -> Purpose {
        Purpose {
            purpose_id: id.into(),
            name: format!("Purpose {id}"),
            description: "What this purpose does".into(),
            category: if essential {
                PurposeCategory::Essential
            } else {
                PurposeCategory::Marketing
            },
            is_essential: essential,
            legal_basis: LegalBasis::Consent,
            retention_days: 180,
            data_types: vec!["contact".into()],
        }
    }

    async fn renderer(purposes: Vec<Purpose>) -> NoticeRenderer {
        let source = Arc::new(MemoryRequirementSource::new());
        let catalog = Arc::new(MemoryCatalog::new());

        let purpose_ids = purposes.iter().map(|p| p.purpose_id.clone()).collect();
        for p in purposes {
            catalog.add_purpose(p).await;
        }
        catalog
            .add_template(NoticeTemplate {
                template_id: "tpl-1".into(),
                version: 2,
                language: "en".into(),
                title: "Your consent is required".into(),
                intro: "Review the purposes below.".into(),
            })
            .await;

        source
            .insert(ConsentRequirement {
                requirement_id: "req-1".into(),
                user_id: "user-1".into(),
                fiduciary_id: "fid-1".into(),
                kind: RequirementKind::New,
                purpose_ids,
                priority: Priority::High,
                is_blocking: true,
                due_date: Utc.timestamp_opt(1_710_000_000, 0).unwrap(),
                status: RequirementStatus::Pending,
                template_id: "tpl-1".into(),
            })
            .await;

        NoticeRenderer::new(source, catalog, "en")
    }

    #[tokio::test]
    async fn test_render_basic() {
        let renderer = renderer(vec![purpose("P-001", true), purpose("P-002", false)]).await;
        let notice = renderer.render("req-1", "en").await.unwrap();

        assert_eq!(notice.language, "en");
        assert!(!notice.language_fallback);
        assert_eq!(notice.purposes.len(), 2);
        assert!(notice.purposes[0].is_essential);
        assert!(notice.allow_granular_choice);
        assert_eq!(notice.template_version, 2);
    }

    #[tokio::test]
    async fn test_language_fallback() {
        let renderer = renderer(vec![purpose("P-001", true)]).await;
        let notice = renderer.render("req-1", "hi").await.unwrap();

        assert_eq!(notice.language, "en");
        assert!(notice.language_fallback);
    }

    #[tokio::test]
    async fn test_all_essential_disables_granular_choice() {
        let renderer = renderer(vec![purpose("P-001", true), purpose("P-003", true)]).await;
        let notice = renderer.render("req-1", "en").await.unwrap();
        assert!(!notice.allow_granular_choice);
    }

    #[tokio::test]
    async fn test_plain_text_contains_purposes() {
        let renderer = renderer(vec![purpose("P-001", true), purpose("P-002", false)]).await;
        let notice = renderer.render("req-1", "en").await.unwrap();
        let text = notice.to_plain_text();

        assert!(text.contains("Your consent is required"));
        assert!(text.contains("Purpose P-001"));
        assert!(text.contains("(required)"));
        assert!(text.contains("Retention: 180 days"));
    }

    #[tokio::test]
    async fn test_unknown_requirement() {
        let renderer = renderer(vec![purpose("P-001", true)]).await;
        assert!(matches!(
            renderer.render("req-404", "en").await.unwrap_err(),
            ConsentError::NotFound { .. }
        ));
    }
}
