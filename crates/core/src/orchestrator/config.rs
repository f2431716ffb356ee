//! Run-level configuration for the evaluation orchestrator.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which pipeline a challenge uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Participants submit a container that is run against hidden data.
    ModelToData,
    /// Participants submit a predictions file scored against hidden truth.
    DataToModel,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::ModelToData => "model-to-data",
            Topology::DataToModel => "data-to-model",
        }
    }

    /// Scoring script used when none is configured.
    pub fn default_scoring_script(&self) -> &'static str {
        match self {
            Topology::ModelToData => "model_to_data_score",
            Topology::DataToModel => "data_to_model_score",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named compute allocation for the execution stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePreset {
    /// Half of the default allocation.
    Reduced,
    #[default]
    Default,
    /// Twice the default allocation.
    Doubled,
}

/// CPUs and memory handed to the container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub cpus: f64,
    pub memory_gb: u32,
}

impl ResourcePreset {
    pub fn allocation(&self) -> ResourceAllocation {
        match self {
            ResourcePreset::Reduced => ResourceAllocation {
                cpus: 2.0,
                memory_gb: 8,
            },
            ResourcePreset::Default => ResourceAllocation {
                cpus: 4.0,
                memory_gb: 16,
            },
            ResourcePreset::Doubled => ResourceAllocation {
                cpus: 8.0,
                memory_gb: 32,
            },
        }
    }
}

/// Configuration for one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Pipeline topology for this challenge.
    pub topology: Topology,

    /// Registry view listing the challenge's submissions.
    pub view_id: String,

    /// Input data mounted into every container (model-to-data).
    #[serde(default)]
    pub input_id: Option<String>,

    /// Held-out truth data (data-to-model).
    #[serde(default)]
    pub testing_data: Option<String>,

    /// Scoring script name; defaults per topology.
    #[serde(default)]
    pub scoring_script: Option<String>,

    /// Validation script name.
    #[serde(default = "default_validation_script")]
    pub validation_script: String,

    /// "yes" to include scores in notifications, "no" otherwise (model-to-data only).
    #[serde(default)]
    pub email_with_score: Option<String>,

    /// Compute preset for the execution stage.
    #[serde(default)]
    pub resources: ResourcePreset,

    /// Overrides the preset's CPU count.
    #[serde(default)]
    pub cpus: Option<f64>,

    /// Overrides the preset's memory (GiB).
    #[serde(default)]
    pub memory_gb: Option<u32>,

    /// Status that marks a submission as new.
    #[serde(default = "default_status_filter")]
    pub status_filter: String,

    /// Root for staged inputs and per-submission scratch storage.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Delete scratch storage once a submission is terminal.
    #[serde(default = "default_cleanup")]
    pub cleanup_workspace: bool,

    /// Maximum containers (or scoring jobs) running at once.
    #[serde(default = "default_max_executions")]
    pub max_concurrent_executions: usize,
}

fn default_validation_script() -> String {
    "generic".to_string()
}

fn default_status_filter() -> String {
    "RECEIVED".to_string()
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("evalflow")
}

fn default_cleanup() -> bool {
    true
}

fn default_max_executions() -> usize {
    2
}

impl RunConfig {
    /// Creates a run config with defaults for everything but topology and view.
    pub fn new(topology: Topology, view_id: impl Into<String>) -> Self {
        Self {
            topology,
            view_id: view_id.into(),
            input_id: None,
            testing_data: None,
            scoring_script: None,
            validation_script: default_validation_script(),
            email_with_score: None,
            resources: ResourcePreset::default(),
            cpus: None,
            memory_gb: None,
            status_filter: default_status_filter(),
            work_dir: default_work_dir(),
            cleanup_workspace: default_cleanup(),
            max_concurrent_executions: default_max_executions(),
        }
    }

    /// Effective scoring script name.
    pub fn scoring_script_name(&self) -> &str {
        self.scoring_script
            .as_deref()
            .unwrap_or_else(|| self.topology.default_scoring_script())
    }

    /// Whether outcome messages carry scores. Defaults to "yes".
    pub fn email_with_score(&self) -> bool {
        !matches!(self.email_with_score.as_deref(), Some("no"))
    }

    /// Effective execution-stage allocation.
    pub fn allocation(&self) -> ResourceAllocation {
        let preset = self.resources.allocation();
        ResourceAllocation {
            cpus: self.cpus.unwrap_or(preset.cpus),
            memory_gb: self.memory_gb.unwrap_or(preset.memory_gb),
        }
    }

    /// Data staged once per run: container input or scoring truth.
    pub fn staged_input(&self) -> Option<&str> {
        match self.topology {
            Topology::ModelToData => self.input_id.as_deref(),
            Topology::DataToModel => self.testing_data.as_deref(),
        }
    }

    pub fn with_input_id(mut self, input_id: impl Into<String>) -> Self {
        self.input_id = Some(input_id.into());
        self
    }

    pub fn with_testing_data(mut self, testing_data: impl Into<String>) -> Self {
        self.testing_data = Some(testing_data.into());
        self
    }

    pub fn with_email_with_score(mut self, value: impl Into<String>) -> Self {
        self.email_with_score = Some(value.into());
        self
    }

    pub fn with_work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn with_max_concurrent_executions(mut self, max: usize) -> Self {
        self.max_concurrent_executions = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            topology = "model-to-data"
            view_id = "syn52658661"
            input_id = "syn51390589"
        "#;
        let config: RunConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.topology, Topology::ModelToData);
        assert_eq!(config.validation_script, "generic");
        assert_eq!(config.scoring_script_name(), "model_to_data_score");
        assert_eq!(config.status_filter, "RECEIVED");
        assert!(config.email_with_score());
        assert!(config.cleanup_workspace);
        assert_eq!(config.max_concurrent_executions, 2);
        assert_eq!(config.staged_input(), Some("syn51390589"));
    }

    #[test]
    fn test_data_to_model_defaults() {
        let config = RunConfig::new(Topology::DataToModel, "syn1").with_testing_data("syn2");
        assert_eq!(config.scoring_script_name(), "data_to_model_score");
        assert_eq!(config.staged_input(), Some("syn2"));
    }

    #[test]
    fn test_resource_presets() {
        let mut config = RunConfig::new(Topology::ModelToData, "syn1");
        assert_eq!(config.allocation().cpus, 4.0);
        assert_eq!(config.allocation().memory_gb, 16);

        config.resources = ResourcePreset::Reduced;
        assert_eq!(config.allocation().cpus, 2.0);
        assert_eq!(config.allocation().memory_gb, 8);

        config.resources = ResourcePreset::Doubled;
        assert_eq!(config.allocation().memory_gb, 32);

        config.cpus = Some(6.0);
        assert_eq!(config.allocation().cpus, 6.0);
        assert_eq!(config.allocation().memory_gb, 32);
    }

    #[test]
    fn test_email_with_score_no() {
        let config = RunConfig::new(Topology::ModelToData, "syn1").with_email_with_score("no");
        assert!(!config.email_with_score());
    }

    #[test]
    fn test_topology_serde() {
        let json = serde_json::to_string(&Topology::DataToModel).unwrap();
        assert_eq!(json, "\"data-to-model\"");
    }
}
