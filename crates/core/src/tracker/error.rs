//! Error types for the tracker module.

use thiserror::Error;

use crate::registry::RegistryError;
use crate::submission::SubmissionId;

/// A registry write the tracker could not complete.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Status write for {id} failed: {source}")]
    StatusWrite {
        id: SubmissionId,
        #[source]
        source: RegistryError,
    },

    #[error("Annotation write for {id} failed: {source}")]
    AnnotationWrite {
        id: SubmissionId,
        #[source]
        source: RegistryError,
    },

    #[error("Status read for {id} failed: {source}")]
    StatusRead {
        id: SubmissionId,
        #[source]
        source: RegistryError,
    },
}

impl TrackerError {
    pub fn registry_error(&self) -> &RegistryError {
        match self {
            Self::StatusWrite { source, .. }
            | Self::AnnotationWrite { source, .. }
            | Self::StatusRead { source, .. } => source,
        }
    }

    /// Whether the underlying registry failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        self.registry_error().is_transient()
    }
}
