//! Configuration for the container executor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Container runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Path to the docker binary.
    #[serde(default = "default_docker_path")]
    pub docker_path: PathBuf,

    /// Maximum wall-clock time for one container, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Run containers without network access.
    #[serde(default = "default_network_disabled")]
    pub network_disabled: bool,
}

fn default_docker_path() -> PathBuf {
    PathBuf::from("docker")
}

fn default_timeout() -> u64 {
    7200 // 2 hours
}

fn default_network_disabled() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            docker_path: default_docker_path(),
            timeout_secs: default_timeout(),
            network_disabled: default_network_disabled(),
        }
    }
}
