use tracing::warn;

use crate::orchestrator::Topology;
use crate::scripts::{ScriptKind, GENERIC_VALIDATOR};

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - run.view_id is set
/// - the topology's run input (input_id / testing_data) is set
/// - email_with_score is "yes" or "no"
/// - validation and scoring scripts name configured scripts of the right kind
/// - retry.max_attempts and run.max_concurrent_executions are not 0
/// - daemon port and poll interval are not 0 when the daemon is enabled
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let run = &config.run;

    if run.view_id.trim().is_empty() {
        return invalid("run.view_id cannot be empty");
    }

    match run.topology {
        Topology::ModelToData => {
            if run.input_id.as_deref().map_or(true, str::is_empty) {
                return invalid("run.input_id is required for model-to-data");
            }
        }
        Topology::DataToModel => {
            if run.testing_data.as_deref().map_or(true, str::is_empty) {
                return invalid("run.testing_data is required for data-to-model");
            }
        }
    }

    if let Some(value) = run.email_with_score.as_deref() {
        if value != "yes" && value != "no" {
            return invalid(&format!(
                "run.email_with_score must be \"yes\" or \"no\", got {:?}",
                value
            ));
        }
        if run.topology == Topology::DataToModel {
            warn!("run.email_with_score is ignored for data-to-model (no notifications)");
        }
    }

    if run.validation_script != GENERIC_VALIDATOR {
        match config.scripts.get(&run.validation_script) {
            Some(script) if script.kind == ScriptKind::Validation => {}
            Some(_) => {
                return invalid(&format!(
                    "run.validation_script {} is not a validation script",
                    run.validation_script
                ))
            }
            None => {
                return invalid(&format!(
                    "run.validation_script {} is not configured under [scripts]",
                    run.validation_script
                ))
            }
        }
    }

    let scoring = run.scoring_script_name();
    match config.scripts.get(scoring) {
        Some(script) if script.kind == ScriptKind::Scoring => {}
        Some(_) => {
            return invalid(&format!("scoring script {} is not a scoring script", scoring))
        }
        None => {
            return invalid(&format!(
                "scoring script {} is not configured under [scripts]",
                scoring
            ))
        }
    }

    for (name, script) in &config.scripts {
        if script.kind == ScriptKind::Scoring && script.command.is_none() {
            return invalid(&format!("scripts.{} needs a command", name));
        }
    }

    if config.retry.max_attempts == 0 {
        return invalid("retry.max_attempts cannot be 0");
    }

    if run.max_concurrent_executions == 0 {
        return invalid("run.max_concurrent_executions cannot be 0");
    }

    if config.daemon.enabled && config.daemon.port == 0 {
        return invalid("daemon.port cannot be 0");
    }

    if config.daemon.enabled && config.daemon.poll_interval_ms == 0 {
        return invalid("daemon.poll_interval_ms cannot be 0");
    }

    Ok(())
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}
