//! Executes one stage for one submission, retrying transient failures.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::executor::{ContainerRunner, ExecutorError};
use crate::metrics;
use crate::notify::{NotificationDispatcher, NotifyError};
use crate::registry::{RegistryClient, RegistryError};
use crate::scripts::{ScriptError, ScriptRegistry};
use crate::submission::{Submission, SubmissionId};
use crate::tracker::{Ack, SubmissionTracker, TrackerError};

use super::config::RetryConfig;
use super::retry::{retry_with_backoff, Exhausted};
use super::types::{StageFailed, StageKind, StagePayload, StageResult, StageSpec};

/// A failed attempt, already classified.
#[derive(Debug)]
struct AttemptError {
    message: String,
    retryable: bool,
}

impl AttemptError {
    fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<RegistryError> for AttemptError {
    fn from(e: RegistryError) -> Self {
        Self {
            retryable: e.is_transient(),
            message: e.to_string(),
        }
    }
}

impl From<TrackerError> for AttemptError {
    fn from(e: TrackerError) -> Self {
        Self {
            retryable: e.is_transient(),
            message: e.to_string(),
        }
    }
}

impl From<ExecutorError> for AttemptError {
    fn from(e: ExecutorError) -> Self {
        Self {
            retryable: e.is_retryable(),
            message: e.to_string(),
        }
    }
}

impl From<ScriptError> for AttemptError {
    fn from(e: ScriptError) -> Self {
        Self {
            retryable: e.is_retryable(),
            message: e.to_string(),
        }
    }
}

impl From<NotifyError> for AttemptError {
    fn from(e: NotifyError) -> Self {
        Self {
            retryable: e.is_undelivered(),
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        Self::permanent(e.to_string())
    }
}

/// Runs pipeline stages against the run's collaborators.
///
/// Holds no per-submission state: the submission and its tracker are passed
/// into every call.
pub struct StageRunner {
    registry: Arc<dyn RegistryClient>,
    containers: Arc<dyn ContainerRunner>,
    scripts: Arc<ScriptRegistry>,
    notifier: NotificationDispatcher,
    retry: RetryConfig,
}

impl StageRunner {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        containers: Arc<dyn ContainerRunner>,
        scripts: Arc<ScriptRegistry>,
        notifier: NotificationDispatcher,
        retry: RetryConfig,
    ) -> Self {
        Self {
            registry,
            containers,
            scripts,
            notifier,
            retry,
        }
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Runs one stage to completion.
    ///
    /// Returns only once the stage's side effects are acknowledged. Transient
    /// collaborator errors are retried with backoff; anything else, or
    /// running out of attempts, yields `StageFailed`.
    pub async fn run(
        &self,
        submission: &Submission,
        tracker: &SubmissionTracker,
        spec: StageSpec,
    ) -> Result<StageResult, StageFailed> {
        let stage = spec.kind();
        let started = Instant::now();
        debug!(submission = %submission.id, stage = %stage, "Stage started");

        let result = retry_with_backoff(
            &self.retry,
            |attempt| self.attempt(submission, tracker, &spec, attempt),
            |e: &AttemptError| e.retryable,
            |attempt, delay, e| log_retry(&submission.id, stage, attempt, delay, e),
        )
        .await;

        let elapsed = started.elapsed();
        match result {
            Ok((payload, attempts)) => {
                let result = StageResult {
                    submission_id: submission.id.clone(),
                    stage,
                    attempts,
                    duration_ms: elapsed.as_millis() as u64,
                    payload,
                };
                let outcome = if result.is_rejection() { "rejected" } else { "ok" };
                observe(stage, outcome, elapsed);
                debug!(
                    submission = %submission.id,
                    stage = %stage,
                    attempts,
                    "Stage completed ({})",
                    outcome
                );
                Ok(result)
            }
            Err(Exhausted { error, attempts }) => {
                observe(stage, "failed", elapsed);
                Err(StageFailed {
                    stage,
                    submission_id: Some(submission.id.clone()),
                    attempts,
                    message: error.message,
                })
            }
        }
    }

    /// Downloads run-level input (model-to-data input or data-to-model truth)
    /// into `dest`.
    pub async fn stage_inputs(&self, reference: &str, dest: &Path) -> Result<PathBuf, StageFailed> {
        let stage = StageKind::StageInputs;
        let started = Instant::now();

        let result = retry_with_backoff(
            &self.retry,
            |_| async move {
                tokio::fs::create_dir_all(dest).await?;
                let path = self.registry.download(reference, dest).await?;
                Ok::<_, AttemptError>(path)
            },
            |e: &AttemptError| e.retryable,
            |attempt, delay, e| {
                metrics::STAGE_RETRIES
                    .with_label_values(&[stage.as_str()])
                    .inc();
                warn!(
                    stage = %stage,
                    attempt,
                    "Retrying in {:?}: {}",
                    delay,
                    e.message
                );
            },
        )
        .await;

        observe(stage, if result.is_ok() { "ok" } else { "failed" }, started.elapsed());
        result
            .map(|(path, _)| path)
            .map_err(|Exhausted { error, attempts }| StageFailed {
                stage,
                submission_id: None,
                attempts,
                message: error.message,
            })
    }

    /// Best-effort single attempt, used to record ERROR on a failed submission.
    pub async fn try_once(
        &self,
        submission: &Submission,
        tracker: &SubmissionTracker,
        spec: StageSpec,
    ) -> Result<StagePayload, StageFailed> {
        let stage = spec.kind();
        self.attempt(submission, tracker, &spec, 1)
            .await
            .map_err(|e| StageFailed {
                stage,
                submission_id: Some(submission.id.clone()),
                attempts: 1,
                message: e.message,
            })
    }

    async fn attempt(
        &self,
        submission: &Submission,
        tracker: &SubmissionTracker,
        spec: &StageSpec,
        attempt: u32,
    ) -> Result<StagePayload, AttemptError> {
        match spec {
            StageSpec::CreateFolders => {
                let folders = self.registry.create_folders(&submission.id).await?;
                Ok(StagePayload::Folders(folders))
            }

            StageSpec::UpdateFolders {
                output_dir,
                logs_dir,
            } => {
                let folders = submission.folders.as_ref().ok_or_else(|| {
                    AttemptError::permanent("remote folders were never created")
                })?;
                let mut files = self
                    .registry
                    .upload_folder(&folders.output_id, output_dir)
                    .await?;
                files += self.registry.upload_folder(&folders.logs_id, logs_dir).await?;
                Ok(StagePayload::Uploaded { files })
            }

            StageSpec::UpdateStatus { status } => {
                // The previous write may have landed before its error came back.
                if attempt > 1 && tracker.confirm_status(*status).await? {
                    return Ok(StagePayload::Ack(Ack::Applied));
                }
                let ack = tracker.update_status(*status).await?;
                Ok(StagePayload::Ack(ack))
            }

            StageSpec::Execute { job } => {
                let outcome = self.containers.run(job).await?;
                Ok(StagePayload::Container(outcome))
            }

            StageSpec::Download { reference, dest } => {
                tokio::fs::create_dir_all(dest).await?;
                let path = self.registry.download(reference, dest).await?;
                Ok(StagePayload::File(path))
            }

            StageSpec::Validate { script, request } => {
                let validator = self.scripts.validator(script).ok_or_else(|| {
                    AttemptError::permanent(format!("validation script {} is not registered", script))
                })?;
                let outcome = validator.validate(request).await?;
                Ok(StagePayload::Validation(outcome))
            }

            StageSpec::Annotate { annotations } => {
                let ack = tracker.annotate(annotations).await?;
                Ok(StagePayload::Ack(ack))
            }

            StageSpec::Score { script, request } => {
                let scorer = self.scripts.scorer(script).ok_or_else(|| {
                    AttemptError::permanent(format!("scoring script {} is not registered", script))
                })?;
                let outcome = scorer.score(request).await?;
                Ok(StagePayload::Score(outcome))
            }

            StageSpec::Notify { include_score } => {
                let message = self.notifier.notify(submission, *include_score).await?;
                Ok(StagePayload::Message(message))
            }
        }
    }
}

fn log_retry(id: &SubmissionId, stage: StageKind, attempt: u32, delay: Duration, e: &AttemptError) {
    metrics::STAGE_RETRIES
        .with_label_values(&[stage.as_str()])
        .inc();
    warn!(
        submission = %id,
        stage = %stage,
        attempt,
        "Retrying in {:?}: {}",
        delay,
        e.message
    );
}

fn observe(stage: StageKind, outcome: &str, elapsed: Duration) {
    metrics::STAGE_DURATION
        .with_label_values(&[stage.as_str(), outcome])
        .observe(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationConfig;
    use crate::registry::RegistryError;
    use crate::submission::{SubmissionStatus, ValidationOutcome};
    use crate::testing::{fixtures, CallLog, MockContainerRunner, MockRegistry};
    use std::collections::BTreeMap;

    struct Fixture {
        registry: Arc<MockRegistry>,
        runner: StageRunner,
        submission: Submission,
        tracker: SubmissionTracker,
    }

    fn fixture(max_attempts: u32) -> Fixture {
        let log = CallLog::new();
        let registry = Arc::new(MockRegistry::new(log.clone()));
        let containers = Arc::new(MockContainerRunner::new(log));
        let runner = StageRunner::new(
            registry.clone(),
            containers,
            Arc::new(ScriptRegistry::new()),
            NotificationDispatcher::new(registry.clone(), NotificationConfig::default()),
            RetryConfig::immediate(max_attempts),
        );
        let submission = Submission::discovered(fixtures::container_record("sub-1"));
        let tracker = SubmissionTracker::new(
            submission.id.clone(),
            registry.clone(),
            SubmissionStatus::Received,
        );
        Fixture {
            registry,
            runner,
            submission,
            tracker,
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let f = fixture(3);
        f.registry.fail_annotations(2, || RegistryError::Timeout);

        let result = f
            .runner
            .run(
                &f.submission,
                &f.tracker,
                StageSpec::Annotate {
                    annotations: BTreeMap::from([("k".to_string(), "v".to_string())]),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(result.payload, StagePayload::Ack(Ack::Applied));
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_stage_failed() {
        let f = fixture(3);
        f.registry
            .fail_annotations(5, || RegistryError::Unreachable("refused".into()));

        let err = f
            .runner
            .run(
                &f.submission,
                &f.tracker,
                StageSpec::Annotate {
                    annotations: BTreeMap::from([("k".to_string(), "v".to_string())]),
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage, StageKind::Annotate);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.submission_id, Some("sub-1".into()));
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let f = fixture(3);
        f.registry.fail_status_writes(1, || RegistryError::NotFound("sub-1".into()));

        let err = f
            .runner
            .run(
                &f.submission,
                &f.tracker,
                StageSpec::UpdateStatus {
                    status: SubmissionStatus::EvaluationInProgress,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn test_status_retry_checks_remote_first() {
        let f = fixture(3);
        // The write lands remotely but the response is lost.
        f.registry.fail_status_writes_after_apply(1);

        let result = f
            .runner
            .run(
                &f.submission,
                &f.tracker,
                StageSpec::UpdateStatus {
                    status: SubmissionStatus::EvaluationInProgress,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.attempts, 2);
        assert_eq!(result.payload, StagePayload::Ack(Ack::Applied));
        assert_eq!(f.registry.status_writes("sub-1").len(), 1);
        assert_eq!(
            f.tracker.status().await,
            SubmissionStatus::EvaluationInProgress
        );
    }

    #[tokio::test]
    async fn test_notify_retries_only_undelivered() {
        let f = fixture(3);
        let mut submission = f.submission.clone();
        submission.results.record_validation(ValidationOutcome::valid());

        f.registry.fail_messages(1, || RegistryError::Timeout);
        let err = f
            .runner
            .run(&submission, &f.tracker, StageSpec::Notify { include_score: false })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);

        f.registry
            .fail_messages(1, || RegistryError::Unreachable("refused".into()));
        let result = f
            .runner
            .run(&submission, &f.tracker, StageSpec::Notify { include_score: false })
            .await
            .unwrap();
        assert_eq!(result.attempts, 2);
        assert_eq!(f.registry.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_scorer_fails_stage() {
        let f = fixture(3);
        let err = f
            .runner
            .run(
                &f.submission,
                &f.tracker,
                StageSpec::Score {
                    script: "missing".to_string(),
                    request: crate::scripts::ScoringRequest {
                        submission_id: "sub-1".into(),
                        predictions: PathBuf::from("/tmp/p.csv"),
                        truth: None,
                        work_dir: PathBuf::from("/tmp"),
                    },
                },
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("not registered"));
    }

    #[tokio::test]
    async fn test_rejection_is_a_result_not_a_failure() {
        let f = fixture(3);
        let dir = tempfile::tempdir().unwrap();
        let rejected = || {
            metrics::STAGE_DURATION
                .with_label_values(&["validate", "rejected"])
                .get_sample_count()
        };
        let before = rejected();

        let result = f
            .runner
            .run(
                &f.submission,
                &f.tracker,
                StageSpec::Validate {
                    script: "generic".to_string(),
                    request: crate::scripts::ValidationRequest {
                        submission_id: "sub-1".into(),
                        predictions: dir.path().join("missing.csv"),
                        truth: None,
                        exit_code: Some(2),
                        work_dir: dir.path().to_path_buf(),
                    },
                },
            )
            .await
            .unwrap();

        assert!(result.is_rejection());
        assert_eq!(result.attempts, 1);
        assert!(rejected() > before);
    }

    #[tokio::test]
    async fn test_stage_inputs_downloads_into_dest() {
        let f = fixture(3);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("input");

        let path = f.runner.stage_inputs("syn-input", &dest).await.unwrap();

        assert!(path.starts_with(&dest));
        assert!(path.exists());
    }
}
