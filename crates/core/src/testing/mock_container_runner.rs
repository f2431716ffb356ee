//! Mock container runner for testing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::executor::{ContainerJob, ContainerOutcome, ContainerRunner, ExecutorError};
use crate::submission::SubmissionId;

use super::call_log::CallLog;

type ErrorFactory = Arc<dyn Fn() -> ExecutorError + Send + Sync>;

#[derive(Default)]
struct Inner {
    exit_codes: HashMap<String, i32>,
    jobs: Vec<ContainerJob>,
    failures: Vec<(usize, ErrorFactory)>,
    run_duration: Duration,
}

/// Mock implementation of the ContainerRunner trait.
///
/// Instead of starting a container it writes `predictions.csv` into the job's
/// output directory and `container.log` into its logs directory. The
/// submission is identified by the workspace directory enclosing
/// `output_dir`.
///
/// # Example
///
/// ```rust,ignore
/// let runner = MockContainerRunner::new(log.clone());
/// runner.set_exit_code("sub-2", 1);
/// runner.set_run_duration(Duration::from_millis(50));
///
/// // ... run the pipeline ...
///
/// assert!(runner.max_concurrent() <= 2);
/// ```
pub struct MockContainerRunner {
    inner: Mutex<Inner>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    log: CallLog,
}

impl MockContainerRunner {
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            log,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the container for `id` exit with `code`. Non-zero exits write no predictions.
    pub fn set_exit_code(&self, id: &str, code: i32) {
        self.lock().exit_codes.insert(id.to_string(), code);
    }

    /// Makes every run take at least `duration`.
    pub fn set_run_duration(&self, duration: Duration) {
        self.lock().run_duration = duration;
    }

    /// The next `count` runs fail before starting.
    pub fn fail_next(&self, count: usize, make: impl Fn() -> ExecutorError + Send + Sync + 'static) {
        self.lock().failures.push((count, Arc::new(make)));
    }

    /// Jobs that actually ran, in start order.
    pub fn jobs(&self) -> Vec<ContainerJob> {
        self.lock().jobs.clone()
    }

    /// Highest number of runs observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn submission_of(output_dir: &Path) -> Option<SubmissionId> {
        output_dir
            .parent()
            .and_then(Path::file_name)
            .map(|name| {
                let name = name.to_string_lossy();
                let id = urlencoding::decode(&name)
                    .map(|id| id.into_owned())
                    .unwrap_or_else(|_| name.to_string());
                SubmissionId::new(id)
            })
    }

    fn take_failure(&self) -> Option<ExecutorError> {
        let mut inner = self.lock();
        let plan = inner.failures.iter_mut().find(|(remaining, _)| *remaining > 0)?;
        plan.0 -= 1;
        Some((plan.1)())
    }
}

#[async_trait]
impl ContainerRunner for MockContainerRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, job: &ContainerJob) -> Result<ContainerOutcome, ExecutorError> {
        if let Some(e) = self.take_failure() {
            return Err(e);
        }

        let id = Self::submission_of(&job.output_dir);
        let (exit_code, duration) = {
            let mut inner = self.lock();
            inner.jobs.push(job.clone());
            let code = id
                .as_ref()
                .and_then(|id| inner.exit_codes.get(id.as_str()).copied())
                .unwrap_or(0);
            (code, inner.run_duration)
        };

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        tokio::fs::create_dir_all(&job.output_dir).await?;
        tokio::fs::create_dir_all(&job.logs_dir).await?;
        if exit_code == 0 {
            tokio::fs::write(job.output_dir.join("predictions.csv"), "id,probability\n1,0.5\n")
                .await?;
        }
        let log_path = job.logs_dir.join("container.log");
        tokio::fs::write(&log_path, format!("{} exited with {}\n", job.image, exit_code)).await?;

        self.log
            .record("execute", id.as_ref(), exit_code.to_string());

        Ok(ContainerOutcome {
            exit_code,
            output_dir: job.output_dir.clone(),
            log_path: Some(log_path),
            duration_ms: duration.as_millis() as u64,
            timed_out: false,
        })
    }
}
