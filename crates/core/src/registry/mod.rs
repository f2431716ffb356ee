//! Remote submission registry abstraction.
//!
//! This module provides a `RegistryClient` trait covering everything the
//! orchestrator needs from the research-data platform: listing submissions,
//! status and annotation writes, file transfer and participant messaging.

mod config;
mod http;
mod types;

pub use config::RegistryConfig;
pub use http::HttpRegistryClient;
pub use types::*;
