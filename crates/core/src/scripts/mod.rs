//! Pluggable validation and scoring scripts.
//!
//! Scripts are strategies registered by name in a `ScriptRegistry`. The
//! built-in `generic` validator covers the common checks; challenge-specific
//! logic is provided by external commands configured under `[scripts.<name>]`.

mod command;
mod config;
mod generic;
mod registry;
mod types;

pub use command::CommandScript;
pub use config::{ScriptConfig, ScriptKind};
pub use generic::{resolve_predictions, GenericValidator};
pub use registry::{ScriptRegistry, GENERIC_VALIDATOR};
pub use types::{Scorer, ScoringRequest, ScriptError, ValidationRequest, Validator};
