//! Orchestrator run-level integration tests: fetching, fatal errors,
//! idempotent re-runs and the polling loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::TestHarness;
use evalflow_core::fetcher::FetchError;
use evalflow_core::registry::RegistryError;
use evalflow_core::scripts::ScriptRegistry;
use evalflow_core::submission::SubmissionStatus;
use evalflow_core::testing::fixtures;
use evalflow_core::{
    EvaluationOrchestrator, NotificationConfig, OrchestratorError, RetryConfig,
};

#[tokio::test]
async fn test_unreachable_registry_aborts_run() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    h.registry
        .fail_fetches(3, || RegistryError::Unreachable("connection refused".into()));

    let orchestrator = h.orchestrator(h.model_to_data());
    let err = orchestrator.run_once().await.unwrap_err();

    match err {
        OrchestratorError::Fetch(FetchError::TransientRegistry { attempts, .. }) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.registry.fetch_count(), 3);
    assert!(h.log.for_submission("sub-1").is_empty());
    assert_eq!(h.registry.status_of("sub-1"), Some(SubmissionStatus::Received));

    let status = orchestrator.status().await;
    assert!(status.last_error.is_some());
    let summary = status.last_run.expect("aborted run leaves a summary");
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 0);
    assert!(summary.outcomes.is_empty());
}

#[tokio::test]
async fn test_aborted_run_replaces_previous_summary() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    let orchestrator = h.orchestrator(h.model_to_data());

    let first = orchestrator.run_once().await.unwrap();
    assert_eq!(first.processed, 1);

    h.registry
        .fail_fetches(3, || RegistryError::Unreachable("connection refused".into()));
    orchestrator.run_once().await.unwrap_err();

    let status = orchestrator.status().await;
    let last = status.last_run.unwrap();
    assert_ne!(last.run_id, first.run_id);
    assert_eq!(last.processed, 0);
    assert_eq!(status.runs, 2);
}

#[tokio::test]
async fn test_empty_batch_invokes_no_stage() {
    let h = TestHarness::new();

    let summary = h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.processed, 0);
    let actions: Vec<&str> = h.log.entries().iter().map(|c| c.action).collect();
    assert_eq!(actions, vec!["fetch_submissions"]);
}

#[tokio::test]
async fn test_invalid_filter_aborts_before_fetch() {
    let h = TestHarness::new();
    let mut config = h.model_to_data();
    config.status_filter = "WHATEVER".to_string();

    let err = h.orchestrator(config).run_once().await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Fetch(FetchError::InvalidQuery { .. })
    ));
    assert_eq!(h.registry.fetch_count(), 0);
}

#[tokio::test]
async fn test_missing_scorer_is_rejected_before_fetch() {
    let h = TestHarness::new();
    let orchestrator = EvaluationOrchestrator::new(
        h.model_to_data(),
        h.registry.clone(),
        h.containers.clone(),
        ScriptRegistry::new(),
        NotificationConfig::default(),
        RetryConfig::immediate(3),
    );

    let err = orchestrator.run_once().await.unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    assert!(err.to_string().contains("model_to_data_score"));
    assert_eq!(h.registry.fetch_count(), 0);
}

#[tokio::test]
async fn test_unstageable_input_aborts_run() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    h.registry.fail_downloads(1, || RegistryError::NotFound("syn51390589".into()));

    let orchestrator = h.orchestrator(h.model_to_data());
    let err = orchestrator.run_once().await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Staging(_)));
    assert!(h.log.for_submission("sub-1").is_empty());

    let summary = orchestrator.status().await.last_run.unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
async fn test_rerun_does_not_reprocess() {
    let h = TestHarness::new();
    h.registry.add_submissions(vec![
        fixtures::container_record("sub-1"),
        fixtures::container_record("sub-2"),
    ]);
    let orchestrator = h.orchestrator(h.model_to_data());

    let first = orchestrator.run_once().await.unwrap();
    let writes = h.registry.status_writes("sub-1");
    let second = orchestrator.run_once().await.unwrap();

    assert_eq!(first.fetched, 2);
    assert_eq!(second.fetched, 0);
    assert_eq!(h.registry.status_writes("sub-1"), writes);
    assert_eq!(h.registry.sent_messages().len(), 2);
    assert_eq!(h.containers.jobs().len(), 2);

    let status = orchestrator.status().await;
    assert_eq!(status.runs, 2);
    assert_eq!(status.last_run.unwrap().run_id, second.run_id);
}

#[tokio::test]
async fn test_new_submissions_picked_up_on_next_run() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    let orchestrator = h.orchestrator(h.model_to_data());
    orchestrator.run_once().await.unwrap();

    h.registry
        .add_submissions(vec![fixtures::container_record("sub-2")]);
    let summary = orchestrator.run_once().await.unwrap();

    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.outcomes[0].submission_id.as_str(), "sub-2");
    assert_eq!(h.log.count("sub-1", "execute"), 1);
}

#[tokio::test]
async fn test_polling_until_shutdown() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    let orchestrator = Arc::new(h.orchestrator(h.model_to_data()));

    let handle = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run_polling(Duration::from_millis(20)).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(orchestrator.status().await.running);
    orchestrator.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("polling loop did not stop")
        .unwrap();

    let status = orchestrator.status().await;
    assert!(!status.running);
    assert!(status.runs >= 2);
    assert_eq!(h.log.count("sub-1", "execute"), 1);
    assert_eq!(h.registry.status_of("sub-1"), Some(SubmissionStatus::Accepted));
}

#[tokio::test]
async fn test_shutdown_before_polling_starts() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    let orchestrator = Arc::new(h.orchestrator(h.model_to_data()));

    orchestrator.shutdown();
    let handle = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run_polling(Duration::from_millis(20)).await })
    };
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("polling loop did not stop")
        .unwrap();

    let status = orchestrator.status().await;
    assert!(!status.running);
    assert_eq!(status.runs, 0);
    assert_eq!(h.registry.fetch_count(), 0);
}

#[tokio::test]
async fn test_polling_survives_fatal_runs() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    h.registry
        .fail_fetches(3, || RegistryError::Unreachable("down".into()));
    let orchestrator = Arc::new(h.orchestrator(h.model_to_data()));

    let handle = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run_polling(Duration::from_millis(20)).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    orchestrator.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("polling loop did not stop")
        .unwrap();

    // The first run failed; a later one processed the submission.
    assert_eq!(h.registry.status_of("sub-1"), Some(SubmissionStatus::Accepted));
    assert!(orchestrator.status().await.last_error.is_none());
}
