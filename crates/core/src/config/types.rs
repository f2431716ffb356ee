use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::executor::ExecutorConfig;
use crate::notify::NotificationConfig;
use crate::orchestrator::RunConfig;
use crate::registry::RegistryConfig;
use crate::scripts::ScriptConfig;
use crate::stage::RetryConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub run: RunConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Named validation and scoring scripts.
    #[serde(default)]
    pub scripts: BTreeMap<String, ScriptConfig>,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Continuous polling mode
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: default_poll_interval(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_poll_interval() -> u64 {
    300_000 // 5 minutes
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub run: RunConfig,
    pub registry: SanitizedRegistryConfig,
    pub executor: ExecutorConfig,
    pub retry: RetryConfig,
    pub notification: NotificationConfig,
    pub scripts: BTreeMap<String, ScriptConfig>,
    pub daemon: DaemonConfig,
}

/// Sanitized registry config (API token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRegistryConfig {
    pub url: String,
    pub api_token_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            run: config.run.clone(),
            registry: SanitizedRegistryConfig {
                url: config.registry.url.clone(),
                api_token_configured: !config.registry.api_token.is_empty(),
                timeout_secs: config.registry.timeout_secs,
            },
            executor: config.executor.clone(),
            retry: config.retry.clone(),
            notification: config.notification.clone(),
            scripts: config.scripts.clone(),
            daemon: config.daemon.clone(),
        }
    }
}
