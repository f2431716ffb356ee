//! Pipeline state machine for one submission within one orchestration run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::Topology;
use crate::stage::StageKind;

use super::types::ValidationStatus;

/// Where a submission is in its topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmissionState {
    /// Returned by the fetcher; nothing has happened yet.
    Discovered,
    /// Working storage exists and the in-progress status is acknowledged.
    /// For data-to-model this also means the data file has been downloaded.
    Staged,
    /// The container is running.
    Executing,
    /// The container finished; a non-zero exit is still a normal outcome.
    Executed { exit_code: i32 },
    /// Validation script is running.
    Validating,
    /// Validation verdict is known and its side effects are acknowledged.
    Validated { status: ValidationStatus },
    /// Scoring script is running.
    Scoring,
    /// Score is known and the final status update is acknowledged.
    Scored { status: String },
    /// Notification sent (model-to-data terminal).
    Notified { notified_at: DateTime<Utc> },
    /// An infrastructure-level stage failure (terminal).
    Failed {
        stage: StageKind,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl SubmissionState {
    /// Returns the state type as a string (for logging and summaries).
    pub fn state_type(&self) -> &'static str {
        match self {
            SubmissionState::Discovered => "discovered",
            SubmissionState::Staged => "staged",
            SubmissionState::Executing => "executing",
            SubmissionState::Executed { .. } => "executed",
            SubmissionState::Validating => "validating",
            SubmissionState::Validated { .. } => "validated",
            SubmissionState::Scoring => "scoring",
            SubmissionState::Scored { .. } => "scored",
            SubmissionState::Notified { .. } => "notified",
            SubmissionState::Failed { .. } => "failed",
        }
    }

    /// Returns true if this state ends processing for the given topology.
    ///
    /// Data-to-model has no notification stage: it ends at `Scored`, or at
    /// `Validated` when validation rejected the submission.
    pub fn is_terminal_for(&self, topology: Topology) -> bool {
        match self {
            SubmissionState::Failed { .. } | SubmissionState::Notified { .. } => true,
            SubmissionState::Scored { .. } => topology == Topology::DataToModel,
            SubmissionState::Validated {
                status: ValidationStatus::Invalid,
            } => topology == Topology::DataToModel,
            _ => false,
        }
    }

    /// Whether `next` is a legal successor of this state under `topology`.
    pub fn can_transition_to(&self, next: &SubmissionState, topology: Topology) -> bool {
        use SubmissionState::*;

        if self.is_terminal_for(topology) {
            return false;
        }
        if matches!(next, Failed { .. }) {
            return true;
        }

        match topology {
            Topology::ModelToData => matches!(
                (self, next),
                (Discovered, Staged)
                    | (Staged, Executing)
                    | (Executing, Executed { .. })
                    | (Executed { .. }, Validating)
                    | (Validating, Validated { .. })
                    | (
                        Validated {
                            status: ValidationStatus::Validated
                        },
                        Scoring
                    )
                    | (
                        Validated {
                            status: ValidationStatus::Invalid
                        },
                        Notified { .. }
                    )
                    | (Scoring, Scored { .. })
                    | (Scored { .. }, Notified { .. })
            ),
            Topology::DataToModel => matches!(
                (self, next),
                (Discovered, Staged)
                    | (Staged, Validating)
                    | (Validating, Validated { .. })
                    | (
                        Validated {
                            status: ValidationStatus::Validated
                        },
                        Scoring
                    )
                    | (Scoring, Scored { .. })
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> SubmissionState {
        SubmissionState::Failed {
            stage: StageKind::Execute,
            error: "boom".to_string(),
            failed_at: Utc::now(),
        }
    }

    #[test]
    fn test_model_to_data_happy_path() {
        let path = [
            SubmissionState::Discovered,
            SubmissionState::Staged,
            SubmissionState::Executing,
            SubmissionState::Executed { exit_code: 0 },
            SubmissionState::Validating,
            SubmissionState::Validated {
                status: ValidationStatus::Validated,
            },
            SubmissionState::Scoring,
            SubmissionState::Scored {
                status: "ACCEPTED".to_string(),
            },
            SubmissionState::Notified {
                notified_at: Utc::now(),
            },
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(&pair[1], Topology::ModelToData),
                "{} -> {}",
                pair[0].state_type(),
                pair[1].state_type()
            );
        }
        assert!(path[8].is_terminal_for(Topology::ModelToData));
    }

    #[test]
    fn test_invalid_skips_scoring_but_still_notifies() {
        let invalid = SubmissionState::Validated {
            status: ValidationStatus::Invalid,
        };
        assert!(!invalid.can_transition_to(&SubmissionState::Scoring, Topology::ModelToData));
        assert!(invalid.can_transition_to(
            &SubmissionState::Notified {
                notified_at: Utc::now()
            },
            Topology::ModelToData
        ));
        assert!(!invalid.is_terminal_for(Topology::ModelToData));
    }

    #[test]
    fn test_data_to_model_ends_without_notification() {
        let scored = SubmissionState::Scored {
            status: "SCORED".to_string(),
        };
        assert!(scored.is_terminal_for(Topology::DataToModel));
        assert!(!scored.is_terminal_for(Topology::ModelToData));
        assert!(!SubmissionState::Staged
            .can_transition_to(&SubmissionState::Executing, Topology::DataToModel));
        assert!(SubmissionState::Validated {
            status: ValidationStatus::Invalid
        }
        .is_terminal_for(Topology::DataToModel));
    }

    #[test]
    fn test_cannot_skip_stages() {
        assert!(!SubmissionState::Discovered
            .can_transition_to(&SubmissionState::Validating, Topology::ModelToData));
        assert!(!SubmissionState::Staged.can_transition_to(
            &SubmissionState::Scored {
                status: "SCORED".to_string()
            },
            Topology::ModelToData
        ));
    }

    #[test]
    fn test_failed_reachable_and_terminal() {
        assert!(SubmissionState::Executing.can_transition_to(&failed(), Topology::ModelToData));
        assert!(failed().is_terminal_for(Topology::ModelToData));
        assert!(failed().is_terminal_for(Topology::DataToModel));
        assert!(!failed().can_transition_to(&failed(), Topology::ModelToData));
    }

    #[test]
    fn test_state_serialization() {
        let state = SubmissionState::Executed { exit_code: 3 };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"type":"executed","exit_code":3}"#);
    }
}
