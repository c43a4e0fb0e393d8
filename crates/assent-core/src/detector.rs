//! Requirement detection.
//!
//! Computes the set of outstanding consent requirements for a user and
//! which of them, if any, must be presented immediately. Lookup failure
//! degrades to "no pending consents" for the presentation surface — the
//! validation gate independently fails closed, so this fail-open path can
//! never authorize processing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::requirements::RequirementSource;
use crate::types::ConsentRequirement;

/// What the presentation surface needs to know about a user's outstanding
/// requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentCheckResponse {
    /// True when any non-terminal requirement exists.
    pub has_pending_consents: bool,
    /// All non-terminal requirements, blocking first, then by priority
    /// (high first), then earliest due date.
    pub requirements: Vec<ConsentRequirement>,
    /// True when a blocking requirement must be presented now.
    pub immediate_action_required: bool,
    /// The single requirement to present immediately, if any: the
    /// highest-priority blocking one, earliest due date breaking ties.
    pub active_requirement_id: Option<String>,
    /// Non-blocking requirements surfaced as a dismissible aggregate.
    pub dismissible_count: usize,
    /// Requirement count by kind label ("new" / "renewal" / "update").
    pub summary: BTreeMap<String, usize>,
    /// Set when the lookup failed and the response degraded to empty.
    pub detection_error: Option<String>,
}

impl ConsentCheckResponse {
    fn empty(detection_error: Option<String>) -> Self {
        Self {
            has_pending_consents: false,
            requirements: Vec::new(),
            immediate_action_required: false,
            active_requirement_id: None,
            dismissible_count: 0,
            summary: BTreeMap::new(),
            detection_error,
        }
    }
}

/// Detects outstanding consent requirements.
pub struct RequirementDetector {
    source: Arc<dyn RequirementSource>,
}

impl RequirementDetector {
    pub fn new(source: Arc<dyn RequirementSource>) -> Self {
        Self { source }
    }

    /// Outstanding requirements for a user.
    ///
    /// Never fails: a lookup error is reported in `detection_error` and the
    /// response defaults to no pending consents.
    pub async fn check(&self, user_id: &str) -> ConsentCheckResponse {
        let mut requirements = match self.source.pending_for_user(user_id).await {
            Ok(requirements) => requirements,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "requirement lookup failed, degrading to no pending consents");
                return ConsentCheckResponse::empty(Some(err.to_string()));
            }
        };

        if requirements.is_empty() {
            return ConsentCheckResponse::empty(None);
        }

        // Blocking first, then priority (high first), then earliest due.
        requirements.sort_by(|a, b| {
            b.is_blocking
                .cmp(&a.is_blocking)
                .then(b.priority.cmp(&a.priority))
                .then(a.due_date.cmp(&b.due_date))
        });

        let active_requirement_id = requirements
            .iter()
            .find(|req| req.is_blocking)
            .map(|req| req.requirement_id.clone());

        let dismissible_count = requirements.iter().filter(|req| !req.is_blocking).count();

        let mut summary: BTreeMap<String, usize> = BTreeMap::new();
        for requirement in &requirements {
            *summary
                .entry(requirement.kind.label().to_string())
                .or_default() += 1;
        }

        ConsentCheckResponse {
            has_pending_consents: true,
            immediate_action_required: active_requirement_id.is_some(),
            active_requirement_id,
            dismissible_count,
            summary,
            requirements,
            detection_error: None,
        }
    }
}
