//! Script strategy traits and their inputs.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::submission::{ScoreOutcome, SubmissionId, ValidationOutcome};

/// Errors that stop a script from producing a verdict.
///
/// A verdict of "invalid" is not an error; it is a `ValidationOutcome`.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Script command not found: {command}")]
    CommandNotFound { command: PathBuf },

    #[error("Script timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("Script exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Malformed script output: {0}")]
    MalformedOutput(String),

    #[error("Invalid script configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// Scripts are local and deterministic; only I/O hiccups are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Input to a validation script.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    pub submission_id: SubmissionId,
    /// Predictions file, or the container's output directory when it
    /// holds no file.
    pub predictions: PathBuf,
    /// Held-out truth, when the challenge stages one.
    pub truth: Option<PathBuf>,
    /// Exit code of the submission container (model-to-data).
    pub exit_code: Option<i32>,
    /// Scratch directory for the script's result file.
    pub work_dir: PathBuf,
}

/// Input to a scoring script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRequest {
    pub submission_id: SubmissionId,
    pub predictions: PathBuf,
    pub truth: Option<PathBuf>,
    pub work_dir: PathBuf,
}

/// Decides whether a submission's predictions are well-formed.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Returns the name of this validator implementation.
    fn name(&self) -> &str;

    async fn validate(&self, request: &ValidationRequest)
        -> Result<ValidationOutcome, ScriptError>;
}

/// Computes metrics for validated predictions.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Returns the name of this scorer implementation.
    fn name(&self) -> &str;

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreOutcome, ScriptError>;
}
