//! Submission model: registry status vocabulary, pipeline state machine and
//! the per-submission record threaded between stages.

mod state;
mod status;
mod types;

pub use state::SubmissionState;
pub use status::{StatusParseError, SubmissionStatus};
pub use types::{
    ArtifactRef, ImageReference, InvalidImageReference, InvalidTransition, ResultPayload,
    ScoreOutcome, Submission, SubmissionFolders, SubmissionId, SubmissionRecord,
    ValidationOutcome, ValidationStatus,
};
