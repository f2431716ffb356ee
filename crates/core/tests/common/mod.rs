//! Shared harness for the lifecycle tests.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use evalflow_core::testing::{
    fixtures, CallLog, MockContainerRunner, MockRegistry, MockScorer, MockValidator,
};
use evalflow_core::{EvaluationOrchestrator, NotificationConfig, RetryConfig, RunConfig};

/// Mocks for every collaborator, sharing one call log.
pub struct TestHarness {
    pub log: CallLog,
    pub registry: Arc<MockRegistry>,
    pub containers: Arc<MockContainerRunner>,
    pub validator: Arc<MockValidator>,
    pub scorer: Arc<MockScorer>,
    work_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let log = CallLog::new();
        Self {
            registry: Arc::new(MockRegistry::new(log.clone())),
            containers: Arc::new(MockContainerRunner::new(log.clone())),
            validator: Arc::new(MockValidator::new(log.clone())),
            scorer: Arc::new(MockScorer::new(log.clone())),
            log,
            work_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn work_dir(&self) -> &std::path::Path {
        self.work_dir.path()
    }

    pub fn model_to_data(&self) -> RunConfig {
        fixtures::model_to_data_config(self.work_dir())
    }

    pub fn data_to_model(&self) -> RunConfig {
        fixtures::data_to_model_config(self.work_dir())
    }

    pub fn orchestrator(&self, config: RunConfig) -> EvaluationOrchestrator {
        EvaluationOrchestrator::new(
            config,
            self.registry.clone(),
            self.containers.clone(),
            fixtures::script_registry(self.validator.clone(), self.scorer.clone()),
            NotificationConfig::default(),
            RetryConfig::immediate(3),
        )
    }
}
