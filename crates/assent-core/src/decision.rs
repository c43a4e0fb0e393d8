//! Decision collection and validation.
//!
//! Enforces the "essential purposes cannot be declined" rule. An essential
//! purpose that is absent or explicitly `false` is a hard validation error
//! naming the offending purposes — never a silent override of a refusal.
//! Only after validation passes are absent essentials filled `true`
//! (implicit grant of what cannot be declined) and absent optionals filled
//! `false` (no pre-selection: optional purposes require explicit opt-in).

use serde::{Deserialize, Serialize};

use crate::errors::{ConsentError, ConsentResult};
use crate::types::{ConsentRequirement, DecisionMap, Purpose};

/// A decision map that passed essential-purpose validation.
///
/// Constructed only by [`validate_decisions`]; holding one proves every
/// essential purpose maps to `true` and every purpose of the requirement
/// has an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedDecisions {
    requirement_id: String,
    decisions: DecisionMap,
}

impl ValidatedDecisions {
    pub fn requirement_id(&self) -> &str {
        &self.requirement_id
    }

    pub fn decisions(&self) -> &DecisionMap {
        &self.decisions
    }

    pub fn into_decisions(self) -> DecisionMap {
        self.decisions
    }

    /// Purpose ids the principal granted.
    pub fn granted(&self) -> Vec<String> {
        self.decisions
            .iter()
            .filter(|(_, granted)| **granted)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Validate a caller-supplied decision map against a requirement.
///
/// Returns the completed map, or [`ConsentError::Validation`] listing every
/// essential purpose that was absent or declined. Decisions for purposes
/// outside the requirement are dropped.
pub fn validate_decisions(
    requirement: &ConsentRequirement,
    purposes: &[Purpose],
    decisions: &DecisionMap,
) -> ConsentResult<ValidatedDecisions> {
    let missing: Vec<String> = purposes
        .iter()
        .filter(|purpose| purpose.is_essential)
        .filter(|purpose| decisions.get(&purpose.purpose_id) != Some(&true))
        .map(|purpose| purpose.purpose_id.clone())
        .collect();

    if !missing.is_empty() {
        return Err(ConsentError::Validation { missing });
    }

    let mut completed = DecisionMap::new();
    for purpose in purposes {
        let granted = if purpose.is_essential {
            true
        } else {
            decisions
                .get(&purpose.purpose_id)
                .copied()
                .unwrap_or(false)
        };
        completed.insert(purpose.purpose_id.clone(), granted);
    }

    Ok(ValidatedDecisions {
        requirement_id: requirement.requirement_id.clone(),
        decisions: completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        LegalBasis, Priority, PurposeCategory, RequirementKind, RequirementStatus,
    };
    use chrono::{TimeZone, Utc};

    fn purpose(id: &str, essential: bool) -> Purpose {
        Purpose {
            purpose_id: id.into(),
            name: format!("Purpose {id}"),
            description: "desc".into(),
            category: PurposeCategory::Analytics,
            is_essential: essential,
            legal_basis: LegalBasis::Consent,
            retention_days: 180,
            data_types: vec![],
        }
    }

    fn requirement(purpose_ids: &[&str]) -> ConsentRequirement {
        ConsentRequirement {
            requirement_id: "req-1".into(),
            user_id: "user-1".into(),
            fiduciary_id: "fid-1".into(),
            kind: RequirementKind::New,
            purpose_ids: purpose_ids.iter().map(|s| s.to_string()).collect(),
            priority: Priority::High,
            is_blocking: true,
            due_date: Utc.timestamp_opt(1_710_000_000, 0).unwrap(),
            status: RequirementStatus::Pending,
            template_id: "tpl-1".into(),
        }
    }

    #[test]
    fn test_empty_decisions_reject_essential() {
        // Scenario: one essential purpose, empty decision map
        let req = requirement(&["P-001"]);
        let purposes = vec![purpose("P-001", true)];
        let err = validate_decisions(&req, &purposes, &DecisionMap::new()).unwrap_err();

        match err {
            ConsentError::Validation { missing } => assert_eq!(missing, vec!["P-001".to_string()]),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_explicit_false_on_essential_rejected() {
        let req = requirement(&["P-001"]);
        let purposes = vec![purpose("P-001", true)];
        let mut decisions = DecisionMap::new();
        decisions.insert("P-001".into(), false);

        let err = validate_decisions(&req, &purposes, &decisions).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_optional_defaults_to_declined() {
        // Essential granted, optional omitted: completes as declined
        let req = requirement(&["P-001", "P-002"]);
        let purposes = vec![purpose("P-001", true), purpose("P-002", false)];
        let mut decisions = DecisionMap::new();
        decisions.insert("P-001".into(), true);

        let validated = validate_decisions(&req, &purposes, &decisions).unwrap();
        assert_eq!(validated.decisions().get("P-001"), Some(&true));
        assert_eq!(validated.decisions().get("P-002"), Some(&false));
        assert_eq!(validated.granted(), vec!["P-001".to_string()]);
    }

    #[test]
    fn test_optional_explicit_opt_in_kept() {
        let req = requirement(&["P-001", "P-002"]);
        let purposes = vec![purpose("P-001", true), purpose("P-002", false)];
        let mut decisions = DecisionMap::new();
        decisions.insert("P-001".into(), true);
        decisions.insert("P-002".into(), true);

        let validated = validate_decisions(&req, &purposes, &decisions).unwrap();
        assert_eq!(validated.decisions().get("P-002"), Some(&true));
    }

    #[test]
    fn test_all_offending_essentials_listed() {
        let req = requirement(&["P-001", "P-002", "P-003"]);
        let purposes = vec![
            purpose("P-001", true),
            purpose("P-002", true),
            purpose("P-003", false),
        ];
        let mut decisions = DecisionMap::new();
        decisions.insert("P-002".into(), false);

        let err = validate_decisions(&req, &purposes, &decisions).unwrap_err();
        match err {
            ConsentError::Validation { missing } => {
                assert_eq!(missing, vec!["P-001".to_string(), "P-002".to_string()]);
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_foreign_decisions_dropped() {
        let req = requirement(&["P-001"]);
        let purposes = vec![purpose("P-001", true)];
        let mut decisions = DecisionMap::new();
        decisions.insert("P-001".into(), true);
        decisions.insert("P-999".into(), true);

        let validated = validate_decisions(&req, &purposes, &decisions).unwrap();
        assert!(!validated.decisions().contains_key("P-999"));
    }
}
