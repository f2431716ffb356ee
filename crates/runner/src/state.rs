use std::sync::Arc;

use evalflow_core::{Config, EvaluationOrchestrator, SanitizedConfig};
use sha2::{Digest, Sha256};

/// Shared application state
pub struct AppState {
    config: Config,
    config_hash: String,
    orchestrator: Arc<EvaluationOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<EvaluationOrchestrator>) -> Self {
        let config_hash = config_fingerprint(&config);
        Self {
            config,
            config_hash,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Short fingerprint of the sanitized config, logged at startup.
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn orchestrator(&self) -> &EvaluationOrchestrator {
        self.orchestrator.as_ref()
    }
}

/// First 16 hex digits of the SHA-256 of the sanitized config.
pub fn config_fingerprint(config: &Config) -> String {
    let json = serde_json::to_string(&SanitizedConfig::from(config)).unwrap_or_default();
    let digest = format!("{:x}", Sha256::digest(json.as_bytes()));
    digest[..16].to_string()
}
