//! Registry status vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status string as stored on the remote registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    /// Submitted, not yet picked up.
    Received,
    /// Claimed by an orchestration run.
    EvaluationInProgress,
    /// Passed validation.
    Validated,
    /// Rejected by validation or scoring (terminal).
    Invalid,
    /// Scored.
    Scored,
    /// Scored and accepted (terminal).
    Accepted,
    /// Infrastructure failure while processing (terminal).
    Error,
}

/// Returned when a status string is not part of the vocabulary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized submission status: {0:?}")]
pub struct StatusParseError(pub String);

impl SubmissionStatus {
    /// All statuses, in progress order followed by the failure terminals.
    pub const ALL: [SubmissionStatus; 7] = [
        SubmissionStatus::Received,
        SubmissionStatus::EvaluationInProgress,
        SubmissionStatus::Validated,
        SubmissionStatus::Scored,
        SubmissionStatus::Accepted,
        SubmissionStatus::Invalid,
        SubmissionStatus::Error,
    ];

    /// Returns the registry representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Received => "RECEIVED",
            SubmissionStatus::EvaluationInProgress => "EVALUATION_IN_PROGRESS",
            SubmissionStatus::Validated => "VALIDATED",
            SubmissionStatus::Invalid => "INVALID",
            SubmissionStatus::Scored => "SCORED",
            SubmissionStatus::Accepted => "ACCEPTED",
            SubmissionStatus::Error => "ERROR",
        }
    }

    /// Position in the progress order. Failure terminals have no rank.
    fn progress_rank(&self) -> Option<u8> {
        match self {
            SubmissionStatus::Received => Some(0),
            SubmissionStatus::EvaluationInProgress => Some(1),
            SubmissionStatus::Validated => Some(2),
            SubmissionStatus::Scored => Some(3),
            SubmissionStatus::Accepted => Some(4),
            SubmissionStatus::Invalid | SubmissionStatus::Error => None,
        }
    }

    /// Returns true if no further status change is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Accepted | SubmissionStatus::Invalid | SubmissionStatus::Error
        )
    }

    /// Returns true for the failure terminals.
    pub fn is_failure(&self) -> bool {
        matches!(self, SubmissionStatus::Invalid | SubmissionStatus::Error)
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    ///
    /// Re-applying the same status is allowed (idempotent no-op).
    pub fn can_advance_to(&self, next: SubmissionStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.progress_rank(), next.progress_rank()) {
            (Some(current), Some(target)) => target > current,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        SubmissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| StatusParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "evaluation_in_progress".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::EvaluationInProgress
        );
        assert_eq!(
            " RECEIVED ".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::Received
        );
    }

    #[test]
    fn test_parse_unknown_fails() {
        let err = "PENDING".parse::<SubmissionStatus>().unwrap_err();
        assert_eq!(err, StatusParseError("PENDING".to_string()));
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for status in SubmissionStatus::ALL {
            assert_eq!(status.to_string().parse::<SubmissionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_forward_progress_allowed() {
        use SubmissionStatus::*;
        assert!(Received.can_advance_to(EvaluationInProgress));
        assert!(EvaluationInProgress.can_advance_to(Validated));
        assert!(Validated.can_advance_to(Scored));
        assert!(Validated.can_advance_to(Accepted));
        assert!(Scored.can_advance_to(Accepted));
    }

    #[test]
    fn test_regression_rejected() {
        use SubmissionStatus::*;
        assert!(!Validated.can_advance_to(EvaluationInProgress));
        assert!(!Scored.can_advance_to(Validated));
        assert!(!Accepted.can_advance_to(Error));
        assert!(!Invalid.can_advance_to(Validated));
        assert!(!Error.can_advance_to(Invalid));
    }

    #[test]
    fn test_failure_reachable_from_any_non_terminal() {
        use SubmissionStatus::*;
        for status in [Received, EvaluationInProgress, Validated, Scored] {
            assert!(status.can_advance_to(Invalid), "{status} -> INVALID");
            assert!(status.can_advance_to(Error), "{status} -> ERROR");
        }
    }

    #[test]
    fn test_same_status_is_idempotent() {
        for status in SubmissionStatus::ALL {
            assert!(status.can_advance_to(status));
        }
    }

    #[test]
    fn test_serde_uses_registry_strings() {
        let json = serde_json::to_string(&SubmissionStatus::EvaluationInProgress).unwrap();
        assert_eq!(json, "\"EVALUATION_IN_PROGRESS\"");
    }
}
