//! Declaration workflow: the status state machine and its gates.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::fields;

/// Declaration status in the filing workflow.
///
/// The valid transitions are:
/// - draft → validated
/// - validated → draft, awaiting_consent
/// - awaiting_consent → validated, signed
/// - signed → submitted
/// - submitted → accepted, rejected
/// - rejected → draft
/// - accepted is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationStatus {
    /// Being edited; items and header may change.
    Draft,
    /// Passed business validation.
    Validated,
    /// Waiting for the taxpayer's consent.
    AwaitingConsent,
    /// Digitally signed.
    Signed,
    /// Sent to the submission gateway (immutable).
    Submitted,
    /// Accepted by the regulator (terminal, immutable).
    Accepted,
    /// Rejected by the regulator.
    Rejected,
}

impl DeclarationStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::AwaitingConsent => "awaiting_consent",
            Self::Signed => "signed",
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "validated" => Some(Self::Validated),
            "awaiting_consent" => Some(Self::AwaitingConsent),
            "signed" => Some(Self::Signed),
            "submitted" => Some(Self::Submitted),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// True for statuses that reject any mutation.
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::Submitted | Self::Accepted)
    }

    /// True for statuses that permit regeneration of items.
    #[must_use]
    pub fn allows_regeneration(&self) -> bool {
        matches!(self, Self::Draft | Self::Validated)
    }

    /// True once the declaration may be projected to XML.
    #[must_use]
    pub fn is_validated_or_later(&self) -> bool {
        !matches!(self, Self::Draft | Self::Rejected)
    }
}

impl fmt::Display for DeclarationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// The requested transition is not in the state graph.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: DeclarationStatus,
        /// Requested status.
        to: DeclarationStatus,
    },

    /// The declaration is in an immutable status.
    #[error("declaration is {0} and cannot be modified")]
    Immutable(DeclarationStatus),

    /// Validation requires at least one item.
    #[error("declaration has no items")]
    NoItems,

    /// Validation requires the listed fields to be present.
    #[error("missing required fields: {}", missing.join(", "))]
    MissingRequiredFields {
        /// The absent field codes.
        missing: Vec<String>,
    },
}

/// Stateless service validating and executing status transitions.
pub struct WorkflowService;

impl WorkflowService {
    /// Checks whether a status transition is in the state graph.
    #[must_use]
    pub fn is_valid_transition(from: DeclarationStatus, to: DeclarationStatus) -> bool {
        use DeclarationStatus as S;
        matches!(
            (from, to),
            (S::Draft, S::Validated)
                | (S::Validated, S::Draft | S::AwaitingConsent)
                | (S::AwaitingConsent, S::Validated | S::Signed)
                | (S::Signed, S::Submitted)
                | (S::Submitted, S::Accepted | S::Rejected)
                | (S::Rejected, S::Draft)
        )
    }

    /// Validates a transition, returning the target status.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not in the state graph.
    pub fn transition(
        from: DeclarationStatus,
        to: DeclarationStatus,
    ) -> Result<DeclarationStatus, WorkflowError> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(WorkflowError::InvalidTransition { from, to })
        }
    }

    /// Rejects mutation of immutable declarations.
    ///
    /// # Errors
    ///
    /// Returns an error for submitted or accepted declarations.
    pub fn ensure_mutable(status: DeclarationStatus) -> Result<(), WorkflowError> {
        if status.is_immutable() {
            Err(WorkflowError::Immutable(status))
        } else {
            Ok(())
        }
    }

    /// The draft → validated gate: at least one item, and the three
    /// derived fields must be present.
    ///
    /// # Errors
    ///
    /// Returns an error naming the violation.
    pub fn validation_gate<'a, I>(item_count: usize, present_fields: I) -> Result<(), WorkflowError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if item_count == 0 {
            return Err(WorkflowError::NoItems);
        }
        let present: std::collections::BTreeSet<&str> = present_fields.into_iter().collect();
        let missing: Vec<String> = [
            fields::INCOME_TOTAL,
            fields::TAXABLE_INCOME,
            fields::IPN_CALCULATED,
        ]
        .iter()
        .filter(|code| !present.contains(**code))
        .map(|code| (*code).to_string())
        .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::MissingRequiredFields { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeclarationStatus as S;

    #[test]
    fn test_happy_path_is_valid() {
        let path = [
            (S::Draft, S::Validated),
            (S::Validated, S::AwaitingConsent),
            (S::AwaitingConsent, S::Signed),
            (S::Signed, S::Submitted),
            (S::Submitted, S::Accepted),
        ];
        for (from, to) in path {
            assert!(WorkflowService::is_valid_transition(from, to), "{from} -> {to}");
        }
    }

    #[test]
    fn test_backward_edges() {
        assert!(WorkflowService::is_valid_transition(S::Validated, S::Draft));
        assert!(WorkflowService::is_valid_transition(S::AwaitingConsent, S::Validated));
        assert!(WorkflowService::is_valid_transition(S::Submitted, S::Rejected));
        assert!(WorkflowService::is_valid_transition(S::Rejected, S::Draft));
    }

    #[test]
    fn test_accepted_is_terminal() {
        for to in [
            S::Draft,
            S::Validated,
            S::AwaitingConsent,
            S::Signed,
            S::Submitted,
            S::Rejected,
        ] {
            assert!(!WorkflowService::is_valid_transition(S::Accepted, to));
        }
    }

    #[test]
    fn test_skipping_states_rejected() {
        assert!(!WorkflowService::is_valid_transition(S::Draft, S::Signed));
        assert!(!WorkflowService::is_valid_transition(S::Draft, S::Submitted));
        assert!(!WorkflowService::is_valid_transition(S::Validated, S::Submitted));
        assert!(!WorkflowService::is_valid_transition(S::Signed, S::Accepted));
    }

    #[test]
    fn test_transition_error_carries_states() {
        let err = WorkflowService::transition(S::Draft, S::Signed).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InvalidTransition {
                from: S::Draft,
                to: S::Signed
            }
        );
    }

    #[test]
    fn test_immutability() {
        assert!(S::Submitted.is_immutable());
        assert!(S::Accepted.is_immutable());
        assert!(!S::Signed.is_immutable());
        assert!(WorkflowService::ensure_mutable(S::Submitted).is_err());
        assert!(WorkflowService::ensure_mutable(S::Draft).is_ok());
    }

    #[test]
    fn test_regeneration_allowed_states() {
        assert!(S::Draft.allows_regeneration());
        assert!(S::Validated.allows_regeneration());
        assert!(!S::Signed.allows_regeneration());
        assert!(!S::Submitted.allows_regeneration());
    }

    #[test]
    fn test_validation_gate_requires_items() {
        let err = WorkflowService::validation_gate(0, []).unwrap_err();
        assert_eq!(err, WorkflowError::NoItems);
    }

    #[test]
    fn test_validation_gate_requires_fields() {
        let err =
            WorkflowService::validation_gate(2, ["LF_INCOME_TOTAL", "LF_TAXABLE_INCOME"])
                .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::MissingRequiredFields {
                missing: vec!["LF_IPN_CALCULATED".to_string()]
            }
        );
    }

    #[test]
    fn test_validation_gate_passes() {
        assert!(WorkflowService::validation_gate(
            3,
            ["LF_INCOME_TOTAL", "LF_TAXABLE_INCOME", "LF_IPN_CALCULATED"],
        )
        .is_ok());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            S::Draft,
            S::Validated,
            S::AwaitingConsent,
            S::Signed,
            S::Submitted,
            S::Accepted,
            S::Rejected,
        ] {
            assert_eq!(DeclarationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DeclarationStatus::parse("unknown"), None);
    }
}
