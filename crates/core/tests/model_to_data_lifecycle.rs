//! Model-to-data lifecycle integration tests.
//!
//! Submissions go through: in progress -> execute -> upload -> validate ->
//! score -> notify, with the registry, container runtime and scripts mocked.

mod common;

use std::time::Duration;

use common::TestHarness;
use evalflow_core::registry::RegistryError;
use evalflow_core::submission::{ScoreOutcome, SubmissionStatus, ValidationOutcome};
use evalflow_core::testing::fixtures;
use evalflow_core::StageKind;

#[tokio::test]
async fn test_valid_submissions_are_scored_and_notified() {
    let h = TestHarness::new();
    h.registry.add_submissions(vec![
        fixtures::container_record("sub-1"),
        fixtures::container_record("sub-2"),
    ]);

    let summary = h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.notified, 2);
    assert_eq!(summary.failed, 0);

    for id in ["sub-1", "sub-2"] {
        assert_eq!(h.registry.status_of(id), Some(SubmissionStatus::Accepted));
        assert_eq!(
            h.registry.status_writes(id),
            vec![
                SubmissionStatus::EvaluationInProgress,
                SubmissionStatus::Validated,
                SubmissionStatus::Accepted,
            ]
        );
        let annotations = h.registry.annotations_of(id);
        assert_eq!(annotations["validation_status"], "VALIDATED");
        assert_eq!(annotations["score_status"], "ACCEPTED");
        assert_eq!(annotations["auc"], "0.9");

        let messages = h.registry.messages_for(id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipients, vec![fixtures::TEAM_ID.to_string()]);
        assert_eq!(
            messages[0].subject,
            format!("Submission to '{}' Success: {}", fixtures::EVALUATION_NAME, id)
        );
        assert!(messages[0].body.contains("auc : 0.9"));
    }

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.submission_id.as_str(), "sub-1");
    assert_eq!(outcome.state, "notified");
    assert_eq!(outcome.status, SubmissionStatus::Accepted);
}

#[tokio::test]
async fn test_invalid_submission_is_notified_without_score() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-3")]);
    h.containers.set_exit_code("sub-3", 1);
    h.validator.set_verdict(
        "sub-3",
        ValidationOutcome::invalid(vec!["missing column X".to_string()]),
    );

    let config = h.model_to_data().with_email_with_score("yes");
    let summary = h.orchestrator(config).run_once().await.unwrap();

    assert_eq!(summary.notified, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(h.registry.status_of("sub-3"), Some(SubmissionStatus::Invalid));
    assert_eq!(h.registry.annotations_of("sub-3")["validation_status"], "INVALID");
    assert_eq!(h.log.count("sub-3", "score"), 0);

    let request = &h.validator.requests()[0];
    assert_eq!(request.exit_code, Some(1));

    let messages = h.registry.messages_for("sub-3");
    assert_eq!(messages.len(), 1);
    assert!(messages[0].subject.contains("Failed: sub-3"));
    assert!(messages[0].body.contains("Reason: 'missing column X'"));
    assert!(!messages[0].body.contains("View your submissions"));
}

#[tokio::test]
async fn test_scores_withheld_when_configured() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);

    let config = h.model_to_data().with_email_with_score("no");
    h.orchestrator(config).run_once().await.unwrap();

    let messages = h.registry.messages_for("sub-1");
    assert_eq!(messages.len(), 1);
    assert!(messages[0].body.contains("Your score will be available"));
    assert!(!messages[0].body.contains("auc"));
    // Scoring still happened; only the message leaves it out.
    assert_eq!(h.registry.annotations_of("sub-1")["auc"], "0.9");
}

#[tokio::test]
async fn test_validation_waits_for_upload_and_status() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);

    h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    let validate = h.log.position("sub-1", "validate").unwrap();
    let execute = h.log.position("sub-1", "execute").unwrap();
    let upload = h.log.position("sub-1", "upload_folder").unwrap();
    let in_progress = h
        .log
        .position_of("sub-1", "update_status", "EVALUATION_IN_PROGRESS")
        .unwrap();
    let folders = h.log.position("sub-1", "create_folders").unwrap();
    let notify = h.log.position("sub-1", "send_message").unwrap();

    assert!(folders < execute);
    assert!(in_progress < execute);
    assert!(execute < upload);
    assert!(upload < validate);
    assert!(validate < h.log.position("sub-1", "score").unwrap());
    assert!(h.log.position("sub-1", "score").unwrap() < notify);
    assert_eq!(h.log.count("sub-1", "upload_folder"), 2);
}

#[tokio::test]
async fn test_one_failure_does_not_stop_others() {
    let h = TestHarness::new();
    h.registry.add_submissions(vec![
        fixtures::container_record("sub-1"),
        fixtures::container_record("sub-2"),
        fixtures::container_record("sub-3"),
    ]);
    h.registry.fail_folders_for("sub-2", 1, || RegistryError::Http {
        status: 403,
        message: "forbidden".to_string(),
    });

    let summary = h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.notified, 2);

    let failed = summary
        .outcomes
        .iter()
        .find(|o| o.submission_id.as_str() == "sub-2")
        .unwrap();
    assert_eq!(failed.state, "failed");
    assert_eq!(failed.failed_stage, Some(StageKind::CreateFolders));
    assert!(failed.error.as_deref().unwrap().contains("403"));

    assert_eq!(h.registry.status_of("sub-2"), Some(SubmissionStatus::Error));
    assert_eq!(h.log.count("sub-2", "execute"), 0);
    assert!(h.registry.messages_for("sub-2").is_empty());
    assert_eq!(h.registry.status_of("sub-1"), Some(SubmissionStatus::Accepted));
    assert_eq!(h.registry.status_of("sub-3"), Some(SubmissionStatus::Accepted));
}

#[tokio::test]
async fn test_transient_registry_errors_are_absorbed() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    h.registry.fail_status_writes(1, || RegistryError::Timeout);
    h.registry
        .fail_annotations(2, || RegistryError::Unreachable("reset".to_string()));

    let summary = h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    assert_eq!(summary.failed, 0);
    assert_eq!(h.registry.status_of("sub-1"), Some(SubmissionStatus::Accepted));
    assert_eq!(h.registry.messages_for("sub-1").len(), 1);
}

#[tokio::test]
async fn test_scorer_status_is_final() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);
    h.scorer.set_score(
        "sub-1",
        ScoreOutcome {
            status: SubmissionStatus::Scored,
            metrics: [("auprc".to_string(), 0.42)].into_iter().collect(),
            errors: Vec::new(),
        },
    );

    h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    assert_eq!(h.registry.status_of("sub-1"), Some(SubmissionStatus::Scored));
    assert!(h.registry.messages_for("sub-1")[0]
        .body
        .contains("auprc : 0.42"));
}

#[tokio::test]
async fn test_execution_concurrency_is_bounded() {
    let h = TestHarness::new();
    h.registry.add_submissions(
        (1..=4)
            .map(|i| fixtures::container_record(&format!("sub-{}", i)))
            .collect(),
    );
    h.containers.set_run_duration(Duration::from_millis(30));

    let config = h.model_to_data().with_max_concurrent_executions(1);
    let summary = h.orchestrator(config).run_once().await.unwrap();

    assert_eq!(summary.notified, 4);
    assert_eq!(h.containers.max_concurrent(), 1);
    assert_eq!(h.containers.jobs().len(), 4);
}

#[tokio::test]
async fn test_containers_get_run_input_and_allocation() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);

    h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    let job = &h.containers.jobs()[0];
    assert!(job.input_dir.starts_with(h.work_dir().join("runs")));
    assert!(job.input_dir.ends_with("input"));
    assert!(job.output_dir.ends_with("submissions/sub-1/output"));
    assert_eq!(job.allocation.cpus, 4.0);
    assert_eq!(job.allocation.memory_gb, 16);
    assert_eq!(job.image.digest.as_deref(), Some(fixtures::DIGEST));
}

#[tokio::test]
async fn test_workspaces_removed_after_run() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);

    h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    let runs = h.work_dir().join("runs");
    let leftover = std::fs::read_dir(&runs)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_scripts_see_container_predictions_file() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-1")]);

    h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    let scoring = &h.scorer.requests()[0];
    assert!(scoring.predictions.starts_with(h.work_dir().join("runs")));
    assert!(scoring
        .predictions
        .ends_with("submissions/sub-1/output/predictions.csv"));
    let truth = scoring.truth.as_ref().unwrap();
    assert!(truth.ends_with(format!("input/{}.csv", fixtures::INPUT_ID)));

    let validation = &h.validator.requests()[0];
    assert_eq!(validation.exit_code, Some(0));
    assert_eq!(validation.predictions, scoring.predictions);
}

#[tokio::test]
async fn test_failed_container_hands_output_dir_to_validator() {
    let h = TestHarness::new();
    h.registry
        .add_submissions(vec![fixtures::container_record("sub-3")]);
    h.containers.set_exit_code("sub-3", 1);
    h.validator.set_verdict(
        "sub-3",
        ValidationOutcome::invalid(vec!["no predictions file found".to_string()]),
    );

    h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    let validation = &h.validator.requests()[0];
    assert_eq!(validation.exit_code, Some(1));
    assert!(validation.predictions.ends_with("submissions/sub-3/output"));
    assert!(h.scorer.requests().is_empty());
}

#[tokio::test]
async fn test_lookalike_ids_do_not_share_workspaces() {
    let h = TestHarness::new();
    h.registry.add_submissions(vec![
        fixtures::container_record("sub/1"),
        fixtures::container_record("sub_1"),
    ]);
    h.containers.set_run_duration(Duration::from_millis(30));

    let summary = h.orchestrator(h.model_to_data()).run_once().await.unwrap();

    assert_eq!(summary.notified, 2);
    assert_eq!(summary.failed, 0);

    let jobs = h.containers.jobs();
    assert_eq!(jobs.len(), 2);
    assert_ne!(jobs[0].output_dir, jobs[1].output_dir);
    assert_ne!(jobs[0].logs_dir, jobs[1].logs_dir);

    let mut scored: Vec<_> = h
        .scorer
        .requests()
        .into_iter()
        .map(|r| (r.submission_id.to_string(), r.predictions))
        .collect();
    scored.sort();
    assert_eq!(scored.len(), 2);
    assert_ne!(scored[0].1, scored[1].1);
    for id in ["sub/1", "sub_1"] {
        assert_eq!(h.registry.status_of(id), Some(SubmissionStatus::Accepted));
        assert_eq!(h.log.count(id, "execute"), 1);
    }
}
