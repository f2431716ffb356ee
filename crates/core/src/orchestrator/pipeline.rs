//! Per-submission pipelines for the two topologies.
//!
//! Each submission is driven by one task that owns its `Submission` and
//! `SubmissionTracker`. Stages run strictly in topology order; where the
//! topology has two independent branches, both run concurrently and the
//! next stage starts only after both have completed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::executor::ContainerJob;
use crate::metrics;
use crate::registry::RegistryClient;
use crate::scripts::{resolve_predictions, ScoringRequest, ValidationRequest};
use crate::stage::{StageFailed, StageKind, StageResult, StageRunner, StageSpec};
use crate::submission::{
    Submission, SubmissionId, SubmissionRecord, SubmissionState, SubmissionStatus,
};
use crate::tracker::SubmissionTracker;

use super::config::{RunConfig, Topology};
use super::types::SubmissionOutcome;

/// Everything a submission task needs to know about its run.
#[derive(Debug)]
pub(crate) struct RunContext {
    pub run_id: String,
    pub config: RunConfig,
    /// `<work_dir>/runs/<run_id>`.
    pub run_dir: PathBuf,
    /// Directory holding the staged run input.
    pub input_dir: PathBuf,
    /// The staged file itself (scoring truth for scripts).
    pub staged_input: PathBuf,
}

/// Local scratch directories for one submission.
#[derive(Debug, Clone)]
pub(crate) struct Workspace {
    pub root: PathBuf,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Workspace {
    fn for_submission(run_dir: &Path, id: &SubmissionId) -> Self {
        let root = run_dir.join("submissions").join(path_segment(id.as_str()));
        Self {
            output_dir: root.join("output"),
            logs_dir: root.join("logs"),
            root,
        }
    }

    async fn create(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::create_dir_all(&self.logs_dir).await
    }
}

/// Registry ids end up in paths; percent-encode them into one plain
/// segment. Distinct ids always map to distinct segments.
fn path_segment(id: &str) -> String {
    match id {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(id).into_owned(),
    }
}

/// Drives submissions of one run through their topology.
pub(crate) struct SubmissionPipeline {
    ctx: Arc<RunContext>,
    runner: Arc<StageRunner>,
    registry: Arc<dyn RegistryClient>,
    /// Bounds concurrent container runs (or scoring jobs for data-to-model).
    executions: Arc<Semaphore>,
}

impl SubmissionPipeline {
    pub fn new(
        ctx: Arc<RunContext>,
        runner: Arc<StageRunner>,
        registry: Arc<dyn RegistryClient>,
        executions: Arc<Semaphore>,
    ) -> Self {
        Self {
            ctx,
            runner,
            registry,
            executions,
        }
    }

    fn topology(&self) -> Topology {
        self.ctx.config.topology
    }

    /// Processes one submission to a terminal state.
    pub async fn process(&self, record: SubmissionRecord) -> SubmissionOutcome {
        let mut submission = Submission::discovered(record);
        let tracker = SubmissionTracker::new(
            submission.id.clone(),
            Arc::clone(&self.registry),
            submission.status,
        );
        let workspace = Workspace::for_submission(&self.ctx.run_dir, &submission.id);

        info!(
            run_id = %self.ctx.run_id,
            submission = %submission.id,
            "Processing submission ({})",
            self.topology()
        );

        let result = match self.topology() {
            Topology::ModelToData => {
                self.model_to_data(&mut submission, &tracker, &workspace)
                    .await
            }
            Topology::DataToModel => {
                self.data_to_model(&mut submission, &tracker, &workspace)
                    .await
            }
        };

        if let Err(failed) = result {
            self.fail(&mut submission, &tracker, failed).await;
        }

        submission.status = tracker.status().await;
        if !submission.state.is_terminal_for(self.topology()) {
            error!(
                run_id = %self.ctx.run_id,
                submission = %submission.id,
                "Submission stopped in non-terminal state {}",
                submission.state.state_type()
            );
        }

        if self.ctx.config.cleanup_workspace && submission.workspace.is_some() {
            if let Err(e) = tokio::fs::remove_dir_all(&workspace.root).await {
                warn!(
                    submission = %submission.id,
                    "Failed to clean up {}: {}",
                    workspace.root.display(),
                    e
                );
            }
        }

        let outcome = SubmissionOutcome::from_submission(&submission);
        metrics::SUBMISSIONS_TOTAL
            .with_label_values(&[self.topology().as_str(), outcome_label(&submission)])
            .inc();
        info!(
            run_id = %self.ctx.run_id,
            submission = %submission.id,
            "Submission finished: {} ({})",
            outcome.state,
            outcome.status
        );
        outcome
    }

    /// Model-to-data: prepare, execute, validate, score, notify.
    async fn model_to_data(
        &self,
        submission: &mut Submission,
        tracker: &SubmissionTracker,
        workspace: &Workspace,
    ) -> Result<(), StageFailed> {
        let image = submission
            .record
            .container_image()
            .map_err(|e| StageFailed::local(StageKind::Prepare, &submission.id, e.to_string()))?;
        self.prepare(submission, workspace).await?;

        // Remote folders and the in-progress status, both before execution.
        let (folders, _) = self
            .join(
                submission,
                tracker,
                StageSpec::CreateFolders,
                StageSpec::UpdateStatus {
                    status: SubmissionStatus::EvaluationInProgress,
                },
            )
            .await?;
        submission.folders = Some(folders.into_folders()?);
        self.advance(submission, SubmissionState::Staged, StageKind::CreateFolders)?;

        self.advance(submission, SubmissionState::Executing, StageKind::Execute)?;
        let job = ContainerJob {
            job_id: format!("{}-{}", short_run_id(&self.ctx.run_id), submission.id),
            image,
            input_dir: self.ctx.input_dir.clone(),
            output_dir: workspace.output_dir.clone(),
            logs_dir: workspace.logs_dir.clone(),
            allocation: self.ctx.config.allocation(),
        };
        let outcome = {
            let _permit = self.execution_permit(submission, StageKind::Execute).await?;
            self.runner
                .run(submission, tracker, StageSpec::Execute { job })
                .await?
                .into_container()?
        };
        if !outcome.succeeded() {
            info!(
                submission = %submission.id,
                "Container exited with code {}{}",
                outcome.exit_code,
                if outcome.timed_out { " (timed out)" } else { "" }
            );
        }
        // Validation and scoring both see the file the container produced.
        let predictions = resolve_predictions(&outcome.output_dir)
            .await
            .map_err(|e| {
                StageFailed::local(
                    StageKind::Execute,
                    &submission.id,
                    format!("reading {}: {}", outcome.output_dir.display(), e),
                )
            })?
            .unwrap_or_else(|| outcome.output_dir.clone());
        submission.results.record_exit(outcome.exit_code);
        submission.results.record_predictions(predictions.clone());
        self.advance(
            submission,
            SubmissionState::Executed {
                exit_code: outcome.exit_code,
            },
            StageKind::Execute,
        )?;

        // Results uploaded and status re-asserted, both before validation.
        self.join(
            submission,
            tracker,
            StageSpec::UpdateFolders {
                output_dir: workspace.output_dir.clone(),
                logs_dir: workspace.logs_dir.clone(),
            },
            StageSpec::UpdateStatus {
                status: SubmissionStatus::EvaluationInProgress,
            },
        )
        .await?;

        let valid = self
            .validate(
                submission,
                tracker,
                workspace,
                predictions,
                Some(outcome.exit_code),
            )
            .await?;

        let include_score = if valid {
            self.score(submission, tracker, workspace).await?;
            self.ctx.config.email_with_score()
        } else {
            false
        };

        self.runner
            .run(submission, tracker, StageSpec::Notify { include_score })
            .await?;
        self.advance(
            submission,
            SubmissionState::Notified {
                notified_at: Utc::now(),
            },
            StageKind::Notify,
        )
    }

    /// Data-to-model: download, validate, score. No notification.
    async fn data_to_model(
        &self,
        submission: &mut Submission,
        tracker: &SubmissionTracker,
        workspace: &Workspace,
    ) -> Result<(), StageFailed> {
        let reference = submission
            .record
            .data_file()
            .map(str::to_string)
            .ok_or_else(|| {
                StageFailed::local(
                    StageKind::Prepare,
                    &submission.id,
                    "record has no data file reference",
                )
            })?;
        self.prepare(submission, workspace).await?;

        self.runner
            .run(
                submission,
                tracker,
                StageSpec::UpdateStatus {
                    status: SubmissionStatus::EvaluationInProgress,
                },
            )
            .await?;

        let predictions = self
            .runner
            .run(
                submission,
                tracker,
                StageSpec::Download {
                    reference,
                    dest: workspace.root.join("input"),
                },
            )
            .await?
            .into_file()?;
        submission.results.record_predictions(predictions.clone());
        self.advance(submission, SubmissionState::Staged, StageKind::Download)?;

        let valid = self
            .validate(submission, tracker, workspace, predictions, None)
            .await?;
        if valid {
            self.score(submission, tracker, workspace).await?;
        }
        Ok(())
    }

    /// Creates local scratch storage.
    async fn prepare(
        &self,
        submission: &mut Submission,
        workspace: &Workspace,
    ) -> Result<(), StageFailed> {
        workspace.create().await.map_err(|e| {
            StageFailed::local(
                StageKind::Prepare,
                &submission.id,
                format!("creating {}: {}", workspace.root.display(), e),
            )
        })?;
        submission.workspace = Some(workspace.root.clone());
        Ok(())
    }

    /// Validates, then annotates and updates status in parallel.
    /// Returns whether validation passed.
    async fn validate(
        &self,
        submission: &mut Submission,
        tracker: &SubmissionTracker,
        workspace: &Workspace,
        predictions: PathBuf,
        exit_code: Option<i32>,
    ) -> Result<bool, StageFailed> {
        self.advance(submission, SubmissionState::Validating, StageKind::Validate)?;

        let request = ValidationRequest {
            submission_id: submission.id.clone(),
            predictions,
            truth: Some(self.ctx.staged_input.clone()),
            exit_code,
            work_dir: workspace.root.join("validation"),
        };
        let outcome = self
            .runner
            .run(
                submission,
                tracker,
                StageSpec::Validate {
                    script: self.ctx.config.validation_script.clone(),
                    request,
                },
            )
            .await?
            .into_validation()?;
        debug!(
            submission = %submission.id,
            "Validation verdict: {} ({} error(s))",
            outcome.status.as_str(),
            outcome.errors.len()
        );

        let annotations = outcome.annotations();
        self.join(
            submission,
            tracker,
            StageSpec::Annotate {
                annotations: annotations.clone(),
            },
            StageSpec::UpdateStatus {
                status: outcome.status.into(),
            },
        )
        .await?;

        let status = outcome.status;
        submission.results.record_validation(outcome);
        submission.results.merge_annotations(&annotations);
        self.advance(
            submission,
            SubmissionState::Validated { status },
            StageKind::Validate,
        )?;
        Ok(status.is_valid())
    }

    /// Scores, then annotates and writes the final status in parallel.
    async fn score(
        &self,
        submission: &mut Submission,
        tracker: &SubmissionTracker,
        workspace: &Workspace,
    ) -> Result<(), StageFailed> {
        self.advance(submission, SubmissionState::Scoring, StageKind::Score)?;

        let predictions = submission.results.predictions.clone().ok_or_else(|| {
            StageFailed::local(StageKind::Score, &submission.id, "no predictions recorded")
        })?;
        let request = ScoringRequest {
            submission_id: submission.id.clone(),
            predictions,
            truth: Some(self.ctx.staged_input.clone()),
            work_dir: workspace.root.join("scoring"),
        };
        let spec = StageSpec::Score {
            script: self.ctx.config.scoring_script_name().to_string(),
            request,
        };

        // Data-to-model has no container stage; scoring is its heavy step.
        let result = if self.topology() == Topology::DataToModel {
            let _permit = self.execution_permit(submission, StageKind::Score).await?;
            self.runner.run(submission, tracker, spec).await?
        } else {
            self.runner.run(submission, tracker, spec).await?
        };
        let outcome = result.into_score()?;

        let annotations = outcome.annotations();
        self.join(
            submission,
            tracker,
            StageSpec::Annotate {
                annotations: annotations.clone(),
            },
            StageSpec::UpdateStatus {
                status: outcome.status,
            },
        )
        .await?;

        let status = outcome.status.to_string();
        submission.results.record_score(outcome);
        submission.results.merge_annotations(&annotations);
        self.advance(submission, SubmissionState::Scored { status }, StageKind::Score)
    }

    /// Runs two independent stages concurrently and waits for both.
    ///
    /// Both branches always run to completion; the first failure is
    /// reported once both have finished.
    async fn join(
        &self,
        submission: &Submission,
        tracker: &SubmissionTracker,
        first: StageSpec,
        second: StageSpec,
    ) -> Result<(StageResult, StageResult), StageFailed> {
        let (a, b) = tokio::join!(
            self.runner.run(submission, tracker, first),
            self.runner.run(submission, tracker, second),
        );
        Ok((a?, b?))
    }

    async fn execution_permit(
        &self,
        submission: &Submission,
        stage: StageKind,
    ) -> Result<tokio::sync::SemaphorePermit<'_>, StageFailed> {
        self.executions
            .acquire()
            .await
            .map_err(|_| StageFailed::local(stage, &submission.id, "execution pool closed"))
    }

    fn advance(
        &self,
        submission: &mut Submission,
        next: SubmissionState,
        stage: StageKind,
    ) -> Result<(), StageFailed> {
        submission
            .advance(next, self.topology())
            .map_err(|e| StageFailed::local(stage, &submission.id, e.to_string()))
    }

    /// Moves a submission to FAILED and makes one attempt to record ERROR.
    async fn fail(
        &self,
        submission: &mut Submission,
        tracker: &SubmissionTracker,
        failed: StageFailed,
    ) {
        error!(
            run_id = %self.ctx.run_id,
            submission = %submission.id,
            stage = %failed.stage,
            attempts = failed.attempts,
            "Submission failed: {}",
            failed.message
        );

        let state = SubmissionState::Failed {
            stage: failed.stage,
            error: failed.message,
            failed_at: Utc::now(),
        };
        if let Err(e) = submission.advance(state, self.topology()) {
            warn!(submission = %submission.id, "Could not mark failed: {}", e);
        }

        let spec = StageSpec::UpdateStatus {
            status: SubmissionStatus::Error,
        };
        if let Err(e) = self.runner.try_once(submission, tracker, spec).await {
            warn!(
                submission = %submission.id,
                "Could not record ERROR status: {}",
                e
            );
        }
    }
}

fn short_run_id(run_id: &str) -> &str {
    run_id.get(..8).unwrap_or(run_id)
}

fn outcome_label(submission: &Submission) -> &'static str {
    match &submission.state {
        SubmissionState::Failed { .. } => "failed",
        SubmissionState::Notified { .. } => "notified",
        SubmissionState::Validated { .. } => "rejected",
        _ => "scored",
    }
}
