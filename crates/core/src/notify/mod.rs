//! Final per-submission outcome messages.
//!
//! The dispatcher composes a subject and body from a submission's validation
//! verdict and (optionally) its score metrics, addresses it to the submitting
//! team or user, and sends it through the registry.

mod config;
mod dispatcher;
mod message;

pub use config::NotificationConfig;
pub use dispatcher::{NotificationDispatcher, NotifyError};
pub use message::{compose_body, compose_subject};
