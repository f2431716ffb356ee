//! Registry client configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the remote registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry REST API.
    #[serde(default = "default_url")]
    pub url: String,

    /// Bearer token used for every request.
    #[serde(default)]
    pub api_token: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_url() -> String {
    "http://localhost:8080/api/v1".to_string()
}

fn default_timeout() -> u32 {
    30
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_token: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}
