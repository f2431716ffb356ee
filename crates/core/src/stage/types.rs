//! Stage vocabulary: what a stage is asked to do and what it produced.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::{ContainerJob, ContainerOutcome};
use crate::registry::OutgoingMessage;
use crate::scripts::{ScoringRequest, ValidationRequest};
use crate::submission::{
    ScoreOutcome, SubmissionFolders, SubmissionId, SubmissionStatus, ValidationOutcome,
};
use crate::tracker::Ack;

/// Names of the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Download the run's input or truth data (run level).
    StageInputs,
    /// Create local working storage and check the artifact reference.
    Prepare,
    CreateFolders,
    UpdateFolders,
    UpdateStatus,
    Execute,
    Download,
    Validate,
    Annotate,
    Score,
    Notify,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::StageInputs => "stage_inputs",
            StageKind::Prepare => "prepare",
            StageKind::CreateFolders => "create_folders",
            StageKind::UpdateFolders => "update_folders",
            StageKind::UpdateStatus => "update_status",
            StageKind::Execute => "execute",
            StageKind::Download => "download",
            StageKind::Validate => "validate",
            StageKind::Annotate => "annotate",
            StageKind::Score => "score",
            StageKind::Notify => "notify",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage invocation for one submission, with the inputs it needs.
#[derive(Debug, Clone)]
pub enum StageSpec {
    /// Get or create the remote output folders.
    CreateFolders,
    /// Upload local output and logs into the remote folders.
    UpdateFolders {
        output_dir: PathBuf,
        logs_dir: PathBuf,
    },
    UpdateStatus { status: SubmissionStatus },
    Execute { job: ContainerJob },
    /// Download a registry entity into `dest`.
    Download { reference: String, dest: PathBuf },
    Validate {
        script: String,
        request: ValidationRequest,
    },
    Annotate { annotations: BTreeMap<String, String> },
    Score {
        script: String,
        request: ScoringRequest,
    },
    Notify { include_score: bool },
}

impl StageSpec {
    pub fn kind(&self) -> StageKind {
        match self {
            StageSpec::CreateFolders => StageKind::CreateFolders,
            StageSpec::UpdateFolders { .. } => StageKind::UpdateFolders,
            StageSpec::UpdateStatus { .. } => StageKind::UpdateStatus,
            StageSpec::Execute { .. } => StageKind::Execute,
            StageSpec::Download { .. } => StageKind::Download,
            StageSpec::Validate { .. } => StageKind::Validate,
            StageSpec::Annotate { .. } => StageKind::Annotate,
            StageSpec::Score { .. } => StageKind::Score,
            StageSpec::Notify { .. } => StageKind::Notify,
        }
    }
}

/// Stage-specific output.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePayload {
    /// Status or annotation write acknowledgement.
    Ack(Ack),
    Folders(SubmissionFolders),
    Uploaded { files: usize },
    Container(ContainerOutcome),
    File(PathBuf),
    Validation(ValidationOutcome),
    Score(ScoreOutcome),
    Message(OutgoingMessage),
}

/// Result of a stage that completed.
///
/// Returning a `StageResult` at all is the readiness signal: the stage's
/// side effects are acknowledged. Application-level rejections (non-zero
/// exit, invalid predictions) are carried in the payload, not as errors.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub submission_id: SubmissionId,
    pub stage: StageKind,
    pub attempts: u32,
    pub duration_ms: u64,
    pub payload: StagePayload,
}

impl StageResult {
    /// Whether the payload is an application-level rejection.
    pub fn is_rejection(&self) -> bool {
        match &self.payload {
            StagePayload::Container(outcome) => !outcome.succeeded(),
            StagePayload::Validation(outcome) => !outcome.status.is_valid(),
            StagePayload::Score(outcome) => outcome.status.is_failure(),
            _ => false,
        }
    }

    fn unexpected(self, wanted: &str) -> StageFailed {
        StageFailed {
            stage: self.stage,
            submission_id: Some(self.submission_id),
            attempts: self.attempts,
            message: format!("stage produced no {}", wanted),
        }
    }

    pub fn into_folders(self) -> Result<SubmissionFolders, StageFailed> {
        match self.payload {
            StagePayload::Folders(folders) => Ok(folders),
            _ => Err(self.unexpected("folders")),
        }
    }

    pub fn into_container(self) -> Result<ContainerOutcome, StageFailed> {
        match self.payload {
            StagePayload::Container(outcome) => Ok(outcome),
            _ => Err(self.unexpected("container outcome")),
        }
    }

    pub fn into_file(self) -> Result<PathBuf, StageFailed> {
        match self.payload {
            StagePayload::File(path) => Ok(path),
            _ => Err(self.unexpected("file")),
        }
    }

    pub fn into_validation(self) -> Result<ValidationOutcome, StageFailed> {
        match self.payload {
            StagePayload::Validation(outcome) => Ok(outcome),
            _ => Err(self.unexpected("validation outcome")),
        }
    }

    pub fn into_score(self) -> Result<ScoreOutcome, StageFailed> {
        match self.payload {
            StagePayload::Score(outcome) => Ok(outcome),
            _ => Err(self.unexpected("score")),
        }
    }
}

/// A stage action that could not complete, after retries where allowed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Stage {stage} failed{} after {attempts} attempt(s): {message}", subject(.submission_id))]
pub struct StageFailed {
    pub stage: StageKind,
    /// `None` for run-level stages.
    pub submission_id: Option<SubmissionId>,
    pub attempts: u32,
    pub message: String,
}

fn subject(id: &Option<SubmissionId>) -> String {
    match id {
        Some(id) => format!(" for {}", id),
        None => String::new(),
    }
}

impl StageFailed {
    /// A failure detected before any collaborator call.
    pub fn local(stage: StageKind, submission_id: &SubmissionId, message: impl Into<String>) -> Self {
        Self {
            stage,
            submission_id: Some(submission_id.clone()),
            attempts: 0,
            message: message.into(),
        }
    }
}
