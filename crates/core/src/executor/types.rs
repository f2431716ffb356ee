//! Types and trait for container execution.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::ResourceAllocation;
use crate::submission::ImageReference;

/// Errors that prevent a container from producing an outcome.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Docker binary not found.
    #[error("Docker not found at path: {path}")]
    DockerNotFound { path: PathBuf },

    /// The container runtime could not be reached; nothing was started.
    #[error("Container runtime unavailable: {0}")]
    DaemonUnavailable(String),

    /// The runtime refused to start the container.
    #[error("Container launch failed: {reason}")]
    LaunchFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// I/O error while preparing or collecting the run.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Whether the run may be retried without risking a duplicate execution.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DaemonUnavailable(_))
    }
}

/// One container run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerJob {
    /// Used to name the container.
    pub job_id: String,
    pub image: ImageReference,
    /// Mounted read-only at `/input`.
    pub input_dir: PathBuf,
    /// Mounted read-write at `/output`.
    pub output_dir: PathBuf,
    /// Where stdout/stderr are written.
    pub logs_dir: PathBuf,
    pub allocation: ResourceAllocation,
}

/// Result of a container run that got as far as starting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerOutcome {
    pub exit_code: i32,
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    pub duration_ms: u64,
    /// The run was killed after exceeding the configured timeout.
    #[serde(default)]
    pub timed_out: bool,
}

impl ContainerOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Runs submission containers.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs the job's image to completion.
    async fn run(&self, job: &ContainerJob) -> Result<ContainerOutcome, ExecutorError>;
}
