//! Types for registry operations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::submission::{SubmissionFolders, SubmissionId, SubmissionRecord, SubmissionStatus};

/// Errors that can occur while talking to the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry could not be reached; nothing was sent.
    #[error("Registry unreachable: {0}")]
    Unreachable(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The registry rejected the query itself.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Unreachable(_) | RegistryError::Timeout => true,
            RegistryError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the failure proves the request never reached the registry.
    pub fn is_undelivered(&self) -> bool {
        matches!(self, RegistryError::Unreachable(_))
    }
}

/// A message addressed to the submitters of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub submission_id: SubmissionId,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Client for the remote submission registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Returns the name of this client implementation.
    fn name(&self) -> &str;

    /// Lists submissions in a view that currently have the given status.
    async fn fetch_submissions(
        &self,
        view_id: &str,
        status: SubmissionStatus,
    ) -> Result<Vec<SubmissionRecord>, RegistryError>;

    /// Reads the current status of a submission.
    async fn get_submission_status(
        &self,
        id: &SubmissionId,
    ) -> Result<SubmissionStatus, RegistryError>;

    /// Overwrites the status of a submission.
    async fn update_status(
        &self,
        id: &SubmissionId,
        status: SubmissionStatus,
    ) -> Result<(), RegistryError>;

    /// Merges annotations into a submission's annotation set.
    async fn annotate(
        &self,
        id: &SubmissionId,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError>;

    /// Downloads an entity into `dest_dir`, returning the written file.
    async fn download(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf, RegistryError>;

    /// Gets or creates the remote folders for a submission's outputs.
    async fn create_folders(&self, id: &SubmissionId) -> Result<SubmissionFolders, RegistryError>;

    /// Uploads every file under `source` into a remote folder. Returns the file count.
    async fn upload_folder(&self, folder_id: &str, source: &Path) -> Result<usize, RegistryError>;

    /// Sends a message to participants.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RegistryError::Unreachable("refused".to_string()).is_transient());
        assert!(RegistryError::Timeout.is_transient());
        assert!(RegistryError::Http {
            status: 503,
            message: "busy".to_string()
        }
        .is_transient());
        assert!(RegistryError::Http {
            status: 429,
            message: "slow down".to_string()
        }
        .is_transient());
        assert!(!RegistryError::Http {
            status: 403,
            message: "forbidden".to_string()
        }
        .is_transient());
        assert!(!RegistryError::InvalidQuery("bad".to_string()).is_transient());
        assert!(!RegistryError::NotFound("sub-1".to_string()).is_transient());
    }

    #[test]
    fn test_only_unreachable_is_undelivered() {
        assert!(RegistryError::Unreachable("refused".to_string()).is_undelivered());
        assert!(!RegistryError::Timeout.is_undelivered());
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::Http {
            status: 500,
            message: "oops".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500: oops");
    }
}
