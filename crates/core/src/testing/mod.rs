//! Testing utilities and mock implementations for end-to-end tests.
//!
//! Mocks cover every external seam (registry, container runtime, scripts)
//! and share a `CallLog`, so tests can assert the order in which stages
//! touched the outside world.
//!
//! # Example
//!
//! ```rust,ignore
//! use evalflow_core::testing::{fixtures, CallLog, MockRegistry};
//!
//! let log = CallLog::new();
//! let registry = MockRegistry::new(log.clone());
//! registry.add_submissions(vec![fixtures::container_record("9700001")]);
//!
//! // ... run the orchestrator ...
//!
//! assert_eq!(log.count("9700001", "send_message"), 1);
//! ```

mod call_log;
mod mock_container_runner;
mod mock_registry;
mod mock_scripts;

pub use call_log::{CallLog, RecordedCall};
pub use mock_container_runner::MockContainerRunner;
pub use mock_registry::MockRegistry;
pub use mock_scripts::{MockScorer, MockValidator};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;
    use std::sync::Arc;

    use crate::orchestrator::{RunConfig, Topology};
    use crate::scripts::{Scorer, ScriptRegistry, Validator, GENERIC_VALIDATOR};
    use crate::submission::{SubmissionRecord, SubmissionStatus};

    pub const TEAM_ID: &str = "3466183";
    pub const USER_ID: &str = "3421936";
    pub const EVALUATION_ID: &str = "9615379";
    pub const EVALUATION_NAME: &str = "Pediatric Tumor Challenge";
    pub const DIGEST: &str =
        "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";
    pub const VIEW_ID: &str = "syn52658661";
    pub const INPUT_ID: &str = "syn51390589";
    pub const TESTING_DATA: &str = "syn52817032";

    /// Create a model-to-data submission submitted by a team.
    pub fn container_record(id: &str) -> SubmissionRecord {
        SubmissionRecord {
            id: id.into(),
            status: SubmissionStatus::Received,
            evaluation_id: EVALUATION_ID.to_string(),
            evaluation_name: Some(EVALUATION_NAME.to_string()),
            team_id: Some(TEAM_ID.to_string()),
            user_id: Some(USER_ID.to_string()),
            docker_repository: Some(format!("docker.synapse.org/syn5265/model-{}", id)),
            docker_digest: Some(DIGEST.to_string()),
            entity_id: None,
        }
    }

    /// Create a data-to-model submission submitted by an individual.
    pub fn data_record(id: &str) -> SubmissionRecord {
        SubmissionRecord {
            id: id.into(),
            status: SubmissionStatus::Received,
            evaluation_id: EVALUATION_ID.to_string(),
            evaluation_name: Some(EVALUATION_NAME.to_string()),
            team_id: None,
            user_id: Some(USER_ID.to_string()),
            docker_repository: None,
            docker_digest: None,
            entity_id: Some(format!("syn-pred-{}", id)),
        }
    }

    /// Model-to-data run rooted at `work_dir`.
    pub fn model_to_data_config(work_dir: &Path) -> RunConfig {
        RunConfig::new(Topology::ModelToData, VIEW_ID)
            .with_input_id(INPUT_ID)
            .with_work_dir(work_dir.to_path_buf())
    }

    /// Data-to-model run rooted at `work_dir`.
    pub fn data_to_model_config(work_dir: &Path) -> RunConfig {
        RunConfig::new(Topology::DataToModel, VIEW_ID)
            .with_testing_data(TESTING_DATA)
            .with_work_dir(work_dir.to_path_buf())
    }

    /// Registers `validator` as the default validator and `scorer` under
    /// both default scoring names.
    pub fn script_registry(validator: Arc<dyn Validator>, scorer: Arc<dyn Scorer>) -> ScriptRegistry {
        let mut scripts = ScriptRegistry::new();
        scripts.register_validator(GENERIC_VALIDATOR, validator);
        for topology in [Topology::ModelToData, Topology::DataToModel] {
            scripts.register_scorer(topology.default_scoring_script(), scorer.clone());
        }
        scripts
    }
}
