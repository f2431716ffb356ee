//! Evaluation orchestrator implementation.
//!
//! One run: validate the run config, fetch the batch, stage run inputs, then
//! process every submission in its own task. Submissions share nothing but
//! the execution semaphore. A polling loop repeats runs until shutdown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::executor::ContainerRunner;
use crate::fetcher::SubmissionFetcher;
use crate::metrics;
use crate::notify::{NotificationConfig, NotificationDispatcher};
use crate::registry::RegistryClient;
use crate::scripts::ScriptRegistry;
use crate::stage::{RetryConfig, StageRunner};

use super::config::RunConfig;
use super::pipeline::{RunContext, SubmissionPipeline};
use super::types::{OrchestratorError, OrchestratorStatus, RunSummary, SubmissionOutcome};

/// Drives batches of submissions through the configured topology.
pub struct EvaluationOrchestrator {
    config: RunConfig,
    registry: Arc<dyn RegistryClient>,
    fetcher: SubmissionFetcher,
    runner: Arc<StageRunner>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_requested: AtomicBool,
    run_in_progress: AtomicBool,
    runs: AtomicU64,
    last_run: RwLock<Option<RunSummary>>,
    last_error: RwLock<Option<String>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EvaluationOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: RunConfig,
        registry: Arc<dyn RegistryClient>,
        containers: Arc<dyn ContainerRunner>,
        scripts: ScriptRegistry,
        notification: NotificationConfig,
        retry: RetryConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let notifier = NotificationDispatcher::new(Arc::clone(&registry), notification);
        let runner = StageRunner::new(
            Arc::clone(&registry),
            containers,
            Arc::new(scripts),
            notifier,
            retry.clone(),
        );

        Self {
            fetcher: SubmissionFetcher::new(Arc::clone(&registry), retry),
            config,
            registry,
            runner: Arc::new(runner),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_requested: AtomicBool::new(false),
            run_in_progress: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            last_run: RwLock::new(None),
            last_error: RwLock::new(None),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Checks that the run can start: scripts exist and run inputs are named.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let scripts = self.runner.scripts();
        if !scripts.has_validator(&self.config.validation_script) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "validation script {} is not registered",
                self.config.validation_script
            )));
        }
        let scoring = self.config.scoring_script_name();
        if !scripts.has_scorer(scoring) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "scoring script {} is not registered",
                scoring
            )));
        }
        if self.config.staged_input().is_none() {
            let field = match self.config.topology {
                super::config::Topology::ModelToData => "input_id",
                super::config::Topology::DataToModel => "testing_data",
            };
            return Err(OrchestratorError::InvalidConfig(format!(
                "{} is required for {}",
                field, self.config.topology
            )));
        }
        if self.config.max_concurrent_executions == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_concurrent_executions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Runs one orchestration pass.
    ///
    /// Fatal errors (bad config, bad filter, registry unavailable through
    /// every fetch attempt, run inputs not stageable) abort the run before
    /// any submission is touched. Per-submission failures do not. An aborted
    /// run still leaves a summary with nothing processed in `last_run`.
    pub async fn run_once(&self) -> Result<RunSummary, OrchestratorError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let mut fetched = 0;

        self.runs.fetch_add(1, Ordering::SeqCst);
        self.run_in_progress.store(true, Ordering::SeqCst);
        let result = self.execute_run(&run_id, started_at, &mut fetched).await;
        self.run_in_progress.store(false, Ordering::SeqCst);

        match &result {
            Ok(summary) => {
                let label = if summary.fetched == 0 { "empty" } else { "completed" };
                metrics::RUNS_TOTAL.with_label_values(&[label]).inc();
                *self.last_run.write().await = Some(summary.clone());
                *self.last_error.write().await = None;
            }
            Err(e) => {
                metrics::RUNS_TOTAL.with_label_values(&["fatal"]).inc();
                let summary =
                    RunSummary::aborted(run_id, self.config.topology, fetched, started_at);
                *self.last_run.write().await = Some(summary);
                *self.last_error.write().await = Some(e.to_string());
            }
        }
        result
    }

    async fn execute_run(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
        fetched: &mut usize,
    ) -> Result<RunSummary, OrchestratorError> {
        let run_id = run_id.to_string();
        let topology = self.config.topology;

        self.validate()?;
        info!(run_id = %run_id, "Starting {} run on view {}", topology, self.config.view_id);

        let batch = self
            .fetcher
            .fetch(&self.config.view_id, &self.config.status_filter)
            .await?;
        *fetched = batch.len();
        metrics::FETCHED_BATCH_SIZE
            .with_label_values(&[topology.as_str()])
            .observe(batch.len() as f64);

        if batch.is_empty() {
            info!(run_id = %run_id, "No new submissions; run finished");
            return Ok(RunSummary::empty(run_id, topology, started_at));
        }

        let run_dir = self.config.work_dir.join("runs").join(&run_id);
        let input_dir = run_dir.join("input");
        let reference = self.config.staged_input().ok_or_else(|| {
            OrchestratorError::InvalidConfig("no run input configured".to_string())
        })?;
        let staged_input = self
            .runner
            .stage_inputs(reference, &input_dir)
            .await
            .map_err(OrchestratorError::Staging)?;
        info!(run_id = %run_id, "Staged run input {} at {}", reference, staged_input.display());

        let ctx = Arc::new(RunContext {
            run_id: run_id.clone(),
            config: self.config.clone(),
            run_dir: run_dir.clone(),
            input_dir,
            staged_input,
        });
        let pipeline = Arc::new(SubmissionPipeline::new(
            ctx,
            Arc::clone(&self.runner),
            Arc::clone(&self.registry),
            Arc::new(Semaphore::new(self.config.max_concurrent_executions)),
        ));

        let handles: Vec<_> = batch
            .into_iter()
            .map(|record| {
                let id = record.id.clone();
                let status = record.status;
                let pipeline = Arc::clone(&pipeline);
                let handle = tokio::spawn(async move { pipeline.process(record).await });
                (id, status, handle)
            })
            .collect();

        let ids: Vec<_> = handles
            .iter()
            .map(|(id, status, _)| (id.clone(), *status))
            .collect();
        let results = join_all(handles.into_iter().map(|(_, _, handle)| handle)).await;

        let outcomes: Vec<SubmissionOutcome> = ids
            .into_iter()
            .zip(results)
            .map(|((id, status), result)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(run_id = %run_id, submission = %id, "Submission task aborted: {}", e);
                    SubmissionOutcome {
                        submission_id: id,
                        state: "failed".to_string(),
                        status,
                        failed_stage: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        if self.config.cleanup_workspace {
            if let Err(e) = tokio::fs::remove_dir_all(&run_dir).await {
                warn!(run_id = %run_id, "Failed to remove {}: {}", run_dir.display(), e);
            }
        }

        let summary = RunSummary::new(run_id, topology, *fetched, outcomes, started_at);
        info!(
            run_id = %summary.run_id,
            "Run finished: {} processed, {} completed, {} notified, {} failed",
            summary.processed,
            summary.completed,
            summary.notified,
            summary.failed
        );
        Ok(summary)
    }

    /// Repeats runs every `poll_interval` until `shutdown` is called.
    ///
    /// A run in progress when shutdown arrives finishes first. Fatal errors
    /// are logged and the next poll proceeds.
    pub async fn run_polling(&self, poll_interval: Duration) {
        // Subscribe first: a shutdown sent after this point is received,
        // one sent before it has already set the flag.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.shutdown_requested.load(Ordering::SeqCst) {
            info!("Shutdown requested before polling started");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }
        info!("Polling every {:?}", poll_interval);

        loop {
            if let Err(e) = self.run_once().await {
                error!("Run aborted: {}", e);
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Polling loop received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {
                    if !self.running.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Polling loop stopped");
    }

    /// Stops the polling loop after the current run, or keeps it from
    /// starting at all.
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            run_in_progress: self.run_in_progress.load(Ordering::Relaxed),
            runs: self.runs.load(Ordering::Relaxed),
            last_run: self.last_run.read().await.clone(),
            last_error: self.last_error.read().await.clone(),
        }
    }
}
