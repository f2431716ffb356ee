//! Stage runner: one pipeline stage for one submission.
//!
//! A stage names an external action (create folders, execute, validate, ...)
//! and carries its inputs in a `StageSpec`. The runner invokes the action,
//! classifies failures, retries transient ones with bounded backoff, and
//! returns a `StageResult` once the action's side effects are acknowledged.
//!
//! Actions that are not provably idempotent are retried conservatively:
//! - status writes re-read the remote status before writing again
//! - notifications are retried only when the message never left
//! - container runs are retried only when the container never started

mod config;
mod retry;
mod runner;
mod types;

pub use config::RetryConfig;
pub use retry::{retry_with_backoff, Exhausted};
pub use runner::StageRunner;
pub use types::{StageFailed, StageKind, StagePayload, StageResult, StageSpec};
