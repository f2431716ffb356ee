//! External-program scripts.
//!
//! The program is invoked as
//! `<command> <args...> --predictions <path> [--truth <path>] --output <results.json>`
//! and reports its verdict in the results file. When no results file is
//! written, the first non-empty stdout line is taken as the status string.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::submission::{ScoreOutcome, SubmissionStatus, ValidationOutcome, ValidationStatus};

use super::config::ScriptConfig;
use super::types::{Scorer, ScoringRequest, ScriptError, ValidationRequest, Validator};

/// A validation or scoring strategy backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandScript {
    name: String,
    command: PathBuf,
    args: Vec<String>,
    timeout_secs: u64,
}

/// What the program reported.
struct ScriptReport {
    /// Parsed results file, if one was written.
    results: Option<Map<String, Value>>,
    /// First non-empty stdout line.
    stdout_status: Option<String>,
}

impl CommandScript {
    pub fn new(name: impl Into<String>, command: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            timeout_secs: 600,
        }
    }

    /// Builds a script from its `[scripts.<name>]` entry.
    pub fn from_config(name: &str, config: &ScriptConfig) -> Result<Self, ScriptError> {
        let command = config
            .command
            .clone()
            .ok_or_else(|| ScriptError::Config(format!("script {} has no command", name)))?;
        Ok(Self {
            name: name.to_string(),
            command,
            args: config.args.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn build_args(&self, predictions: &Path, truth: Option<&Path>, output: &Path) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--predictions".to_string());
        args.push(predictions.display().to_string());
        if let Some(truth) = truth {
            args.push("--truth".to_string());
            args.push(truth.display().to_string());
        }
        args.push("--output".to_string());
        args.push(output.display().to_string());
        args
    }

    async fn invoke(
        &self,
        predictions: &Path,
        truth: Option<&Path>,
        work_dir: &Path,
        results_name: &str,
    ) -> Result<ScriptReport, ScriptError> {
        tokio::fs::create_dir_all(work_dir).await?;
        let output_path = work_dir.join(results_name);
        let args = self.build_args(predictions, truth, &output_path);
        debug!("Running script {}: {:?} {}", self.name, self.command, args.join(" "));

        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ScriptError::CommandNotFound {
                        command: self.command.clone(),
                    }
                } else {
                    ScriptError::Io(e)
                }
            })?;

        let output = timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| ScriptError::Timeout {
                timeout_secs: self.timeout_secs,
            })??;

        if !output.status.success() {
            return Err(ScriptError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout_status = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string);

        let results = match tokio::fs::read_to_string(&output_path).await {
            Ok(contents) => match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(map)) => Some(map),
                Ok(_) => {
                    return Err(ScriptError::MalformedOutput(
                        "results file is not a JSON object".to_string(),
                    ))
                }
                Err(e) => return Err(ScriptError::MalformedOutput(e.to_string())),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(ScriptReport {
            results,
            stdout_status,
        })
    }
}

/// Reads a string that scripts may emit either bare or as a one-element list.
fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(first_string),
        _ => None,
    }
}

/// Reads an error list that may be a string, a list of strings, or null.
fn error_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(first_string)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Array(items) => items.first().and_then(number),
        _ => None,
    }
}

fn status_of(report: &ScriptReport, key: &str) -> Result<String, ScriptError> {
    report
        .results
        .as_ref()
        .and_then(|r| r.get(key))
        .and_then(first_string)
        .or_else(|| report.stdout_status.clone())
        .ok_or_else(|| ScriptError::MalformedOutput(format!("no {} reported", key)))
}

fn parse_validation(report: &ScriptReport) -> Result<ValidationOutcome, ScriptError> {
    let status = status_of(report, "validation_status")?;
    let errors = error_list(report.results.as_ref().and_then(|r| r.get("validation_errors")));

    match status.trim().to_ascii_uppercase().as_str() {
        "VALIDATED" => Ok(ValidationOutcome {
            status: ValidationStatus::Validated,
            errors,
        }),
        "INVALID" => Ok(ValidationOutcome::invalid(errors)),
        other => Err(ScriptError::MalformedOutput(format!(
            "unknown validation status {:?}",
            other
        ))),
    }
}

const NON_METRIC_KEYS: [&str; 4] = [
    "score_status",
    "score_errors",
    "validation_status",
    "validation_errors",
];

fn parse_score(report: &ScriptReport) -> Result<ScoreOutcome, ScriptError> {
    let status_text = status_of(report, "score_status")?;
    let status: SubmissionStatus = status_text
        .parse()
        .map_err(|e: crate::submission::StatusParseError| ScriptError::MalformedOutput(e.to_string()))?;

    let mut metrics = BTreeMap::new();
    if let Some(results) = &report.results {
        for (key, value) in results {
            if NON_METRIC_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Some(n) = number(value) {
                metrics.insert(key.clone(), n);
            }
        }
    }

    Ok(ScoreOutcome {
        status,
        metrics,
        errors: error_list(report.results.as_ref().and_then(|r| r.get("score_errors"))),
    })
}

#[async_trait]
impl Validator for CommandScript {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationOutcome, ScriptError> {
        let report = self
            .invoke(
                &request.predictions,
                request.truth.as_deref(),
                &request.work_dir,
                "validation_results.json",
            )
            .await?;
        parse_validation(&report)
    }
}

#[async_trait]
impl Scorer for CommandScript {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreOutcome, ScriptError> {
        let report = self
            .invoke(
                &request.predictions,
                request.truth.as_deref(),
                &request.work_dir,
                "score_results.json",
            )
            .await?;
        parse_score(&report)
    }
}
