//! Container execution for model-to-data submissions.
//!
//! The `ContainerRunner` trait runs a participant's image against staged input
//! data. A container that exits non-zero is a normal outcome, not an error:
//! validation decides what it means for the submission.

mod config;
mod docker;
mod types;

pub use config::ExecutorConfig;
pub use docker::DockerRunner;
pub use types::{ContainerJob, ContainerOutcome, ContainerRunner, ExecutorError};
