pub mod config;
pub mod executor;
pub mod fetcher;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod registry;
pub mod scripts;
pub mod stage;
pub mod submission;
pub mod testing;
pub mod tracker;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DaemonConfig,
    SanitizedConfig,
};
pub use executor::{ContainerJob, ContainerOutcome, ContainerRunner, DockerRunner, ExecutorConfig};
pub use fetcher::{FetchError, SubmissionFetcher};
pub use notify::{NotificationConfig, NotificationDispatcher};
pub use orchestrator::{
    EvaluationOrchestrator, OrchestratorError, OrchestratorStatus, RunConfig, RunSummary,
    SubmissionOutcome, Topology,
};
pub use registry::{HttpRegistryClient, RegistryClient, RegistryConfig, RegistryError};
pub use scripts::{ScriptConfig, ScriptRegistry};
pub use stage::{RetryConfig, StageFailed, StageKind, StageRunner};
pub use submission::{Submission, SubmissionId, SubmissionRecord, SubmissionState, SubmissionStatus};
pub use tracker::SubmissionTracker;
