//! Common test utilities for in-process API testing with mocks.
//!
//! Builds the router over an orchestrator whose registry, container runtime
//! and scripts are the core crate's recording mocks.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use evalflow_core::testing::{
    fixtures, CallLog, MockContainerRunner, MockRegistry, MockScorer, MockValidator,
};
use evalflow_core::{
    load_config_from_str, Config, EvaluationOrchestrator, NotificationConfig, RetryConfig,
};
use evalflow_runner::api::create_router;
use evalflow_runner::state::AppState;

pub use evalflow_core::testing::fixtures as core_fixtures;

/// Test fixture for API testing with mock collaborators.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_status() {
///     let fixture = TestFixture::new();
///     fixture.orchestrator.run_once().await.unwrap();
///
///     let response = fixture.get("/api/v1/status").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub orchestrator: Arc<EvaluationOrchestrator>,
    pub registry: Arc<MockRegistry>,
    pub log: CallLog,
    /// Scratch storage for runs
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let log = CallLog::new();
        let registry = Arc::new(MockRegistry::new(log.clone()));
        let containers = Arc::new(MockContainerRunner::new(log.clone()));
        let scripts = fixtures::script_registry(
            Arc::new(MockValidator::new(log.clone())),
            Arc::new(MockScorer::new(log.clone())),
        );

        let config = test_config(&temp_dir);
        let orchestrator = Arc::new(EvaluationOrchestrator::new(
            config.run.clone(),
            registry.clone(),
            containers,
            scripts,
            NotificationConfig::default(),
            RetryConfig::immediate(2),
        ));

        let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
        let router = create_router(state);

        Self {
            router,
            orchestrator,
            registry,
            log,
            temp_dir,
        }
    }

    /// Send a GET request to the test router.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Configuration matching the fixture's orchestrator, with a secret token.
fn test_config(temp_dir: &TempDir) -> Config {
    let toml = format!(
        r#"
[run]
topology = "model-to-data"
view_id = "{view}"
input_id = "{input}"
work_dir = "{work_dir}"

[registry]
url = "https://registry.example.org/api/v1"
api_token = "super-secret-token"

[scripts.model_to_data_score]
kind = "scoring"
command = "python3"
args = ["score.py"]
"#,
        view = fixtures::VIEW_ID,
        input = fixtures::INPUT_ID,
        work_dir = temp_dir.path().display(),
    );
    load_config_from_str(&toml).expect("Failed to parse test config")
}
