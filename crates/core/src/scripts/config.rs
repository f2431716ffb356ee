//! Script configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whether a script validates or scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Validation,
    Scoring,
}

/// A named script entry from `[scripts.<name>]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub kind: ScriptKind,

    /// External program. Validation entries without a command use the
    /// built-in generic validator.
    #[serde(default)]
    pub command: Option<PathBuf>,

    /// Arguments placed before the standard `--predictions/--truth/--output` flags.
    #[serde(default)]
    pub args: Vec<String>,

    /// Header columns the generic validator requires in CSV predictions.
    #[serde(default)]
    pub required_columns: Vec<String>,

    /// Maximum run time in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    600 // 10 minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_command_script() {
        let toml = r#"
            kind = "scoring"
            command = "python3"
            args = ["score.py", "--metric", "auc"]
        "#;
        let config: ScriptConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.kind, ScriptKind::Scoring);
        assert_eq!(config.command, Some(PathBuf::from("python3")));
        assert_eq!(config.args.len(), 3);
        assert_eq!(config.timeout_secs, 600);
    }

    #[test]
    fn test_deserialize_builtin_validation() {
        let toml = r#"
            kind = "validation"
            required_columns = ["id", "probability"]
        "#;
        let config: ScriptConfig = toml::from_str(toml).unwrap();
        assert!(config.command.is_none());
        assert_eq!(config.required_columns, vec!["id", "probability"]);
    }
}
