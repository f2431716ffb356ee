//! Docker CLI implementation of the container runner.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::config::ExecutorConfig;
use super::types::{ContainerJob, ContainerOutcome, ContainerRunner, ExecutorError};

/// Exit code docker uses when it could not run the container at all.
const DOCKER_LAUNCH_FAILURE: i32 = 125;

/// Exit code reported for runs killed by the timeout.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Runs submission images through the docker CLI.
pub struct DockerRunner {
    config: ExecutorConfig,
}

impl DockerRunner {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    fn container_name(job: &ContainerJob) -> String {
        let sanitized: String = job
            .job_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("evalflow-{}", sanitized)
    }

    /// Builds the `docker run` argument list for a job.
    fn build_args(&self, job: &ContainerJob) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            Self::container_name(job),
        ];

        if self.config.network_disabled {
            args.push("--network".to_string());
            args.push("none".to_string());
        }

        args.extend([
            "--cpus".to_string(),
            job.allocation.cpus.to_string(),
            "--memory".to_string(),
            format!("{}g", job.allocation.memory_gb),
            "--volume".to_string(),
            format!("{}:/input:ro", job.input_dir.display()),
            "--volume".to_string(),
            format!("{}:/output:rw", job.output_dir.display()),
            job.image.to_string(),
        ]);

        args
    }

    async fn kill(&self, name: &str) {
        let result = Command::new(&self.config.docker_path)
            .args(["kill", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            warn!("Failed to kill container {}: {}", name, e);
        }
    }
}

#[async_trait]
impl ContainerRunner for DockerRunner {
    fn name(&self) -> &str {
        "docker"
    }

    async fn run(&self, job: &ContainerJob) -> Result<ContainerOutcome, ExecutorError> {
        tokio::fs::create_dir_all(&job.output_dir).await?;
        tokio::fs::create_dir_all(&job.logs_dir).await?;

        let args = self.build_args(job);
        let name = Self::container_name(job);
        debug!("Running {:?} {}", self.config.docker_path, args.join(" "));

        let start = Instant::now();
        let child = Command::new(&self.config.docker_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExecutorError::DockerNotFound {
                        path: self.config.docker_path.clone(),
                    }
                } else {
                    ExecutorError::Io(e)
                }
            })?;

        let limit = Duration::from_secs(self.config.timeout_secs);
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecutorError::Io(e)),
            Err(_) => {
                warn!(
                    "Container {} exceeded {}s, killing it",
                    name, self.config.timeout_secs
                );
                self.kill(&name).await;
                return Ok(ContainerOutcome {
                    exit_code: TIMEOUT_EXIT_CODE,
                    output_dir: job.output_dir.clone(),
                    log_path: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                    timed_out: true,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code == DOCKER_LAUNCH_FAILURE {
            return Err(if stderr.contains("Cannot connect to the Docker daemon") {
                ExecutorError::DaemonUnavailable(stderr.trim().to_string())
            } else {
                ExecutorError::LaunchFailed {
                    reason: format!("docker exited with code {}", exit_code),
                    stderr: (!stderr.is_empty()).then_some(stderr),
                }
            });
        }

        let log_path = job.logs_dir.join("container.log");
        let mut log = output.stdout;
        log.extend_from_slice(&output.stderr);
        tokio::fs::write(&log_path, &log).await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Container {} finished with exit code {} in {}ms",
            name, exit_code, duration_ms
        );

        Ok(ContainerOutcome {
            exit_code,
            output_dir: job.output_dir.clone(),
            log_path: Some(log_path),
            duration_ms,
            timed_out: false,
        })
    }
}
