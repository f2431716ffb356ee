//! Evaluation orchestrator.
//!
//! Composes stages into the two topologies:
//! - **Model-to-data**: participants submit a container image that is run
//!   against staged input data, validated, scored, and notified.
//! - **Data-to-model**: participants submit a predictions file that is
//!   downloaded, validated and scored against staged truth. No notification.
//!
//! Submissions in a batch are processed concurrently; the only shared
//! resource is the execution semaphore.

mod config;
mod pipeline;
mod runner;
mod types;

pub use config::{ResourceAllocation, ResourcePreset, RunConfig, Topology};
pub use runner::EvaluationOrchestrator;
pub use types::{OrchestratorError, OrchestratorStatus, RunSummary, SubmissionOutcome};
