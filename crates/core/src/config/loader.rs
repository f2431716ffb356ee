use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "EVALFLOW_CONFIG";

/// Config file used when `EVALFLOW_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "evalflow.toml";

/// Prefix of environment overrides, e.g. `EVALFLOW_RUN__VIEW_ID`.
pub const ENV_PREFIX: &str = "EVALFLOW_";

/// Load configuration from file with environment variable overrides
///
/// Nested keys are separated by a double underscore so that field names
/// containing underscores stay intact.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Topology;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[run]
topology = "data-to-model"
view_id = "syn1"
testing_data = "syn2"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.run.topology, Topology::DataToModel);
        assert_eq!(config.daemon.port, 8080);
    }

    #[test]
    fn test_load_config_from_str_bad_topology() {
        let toml = r#"
[run]
topology = "model-to-model"
view_id = "syn1"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/evalflow.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[run]
topology = "model-to-data"
view_id = "syn52658661"
input_id = "syn51390589"

[daemon]
host = "127.0.0.1"
port = 3000
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.run.view_id, "syn52658661");
        assert_eq!(config.daemon.port, 3000);
        assert_eq!(config.daemon.host.to_string(), "127.0.0.1");
    }
}
