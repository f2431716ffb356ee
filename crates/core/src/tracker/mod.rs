//! Canonical status and annotation set for each submission in a run.
//!
//! A `SubmissionTracker` fronts every registry write for one submission.
//! Writes are serialized per submission, re-applying a value is a no-op, and
//! a status that would move backwards is skipped instead of written.

mod error;
mod submission;

pub use error::TrackerError;
pub use submission::{Ack, SubmissionTracker};
