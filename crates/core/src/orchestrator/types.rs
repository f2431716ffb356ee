//! Types for the evaluation orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetcher::FetchError;
use crate::stage::{StageFailed, StageKind};
use crate::submission::{Submission, SubmissionId, SubmissionState, SubmissionStatus};

use super::config::Topology;

/// Errors that abort a whole run before any submission is processed.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The run configuration cannot work.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The batch could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Run-level input data could not be staged.
    #[error("staging run inputs failed: {0}")]
    Staging(StageFailed),
}

/// Where one submission ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub submission_id: SubmissionId,
    /// Terminal state type ("notified", "scored", "validated", "failed").
    pub state: String,
    /// Last status acknowledged by the registry.
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmissionOutcome {
    pub fn from_submission(submission: &Submission) -> Self {
        let (failed_stage, error) = match &submission.state {
            SubmissionState::Failed { stage, error, .. } => (Some(*stage), Some(error.clone())),
            _ => (None, None),
        };
        Self {
            submission_id: submission.id.clone(),
            state: submission.state.state_type().to_string(),
            status: submission.status,
            failed_stage,
            error,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed_stage.is_some() || self.state == "failed"
    }

    pub fn is_notified(&self) -> bool {
        self.state == "notified"
    }
}

/// Report for one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub topology: Topology,
    /// Submissions in the fetched batch.
    pub fetched: usize,
    /// Submissions that reached a terminal state (`completed + failed`).
    pub processed: usize,
    /// Submissions that finished their topology without failing.
    pub completed: usize,
    pub notified: usize,
    pub failed: usize,
    pub outcomes: Vec<SubmissionOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Builds a summary from per-submission outcomes.
    pub fn new(
        run_id: String,
        topology: Topology,
        fetched: usize,
        outcomes: Vec<SubmissionOutcome>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        let notified = outcomes.iter().filter(|o| o.is_notified()).count();
        let completed = outcomes.len() - failed;
        Self {
            run_id,
            topology,
            fetched,
            processed: completed + failed,
            completed,
            notified,
            failed,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Summary of a run whose fetch came back empty.
    pub fn empty(run_id: String, topology: Topology, started_at: DateTime<Utc>) -> Self {
        Self::new(run_id, topology, 0, Vec::new(), started_at)
    }

    /// Summary of a run aborted by a fatal error: nothing was processed,
    /// whatever the fetch returned.
    pub fn aborted(
        run_id: String,
        topology: Topology,
        fetched: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::new(run_id, topology, fetched, Vec::new(), started_at)
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the polling loop is running.
    pub running: bool,
    /// Whether a run is in progress right now.
    pub run_in_progress: bool,
    /// Runs started since startup.
    pub runs: u64,
    pub last_run: Option<RunSummary>,
    /// Error that aborted the most recent run, if it was aborted.
    pub last_error: Option<String>,
}
