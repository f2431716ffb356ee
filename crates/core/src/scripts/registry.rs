//! Name-to-strategy lookup for validators and scorers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::command::CommandScript;
use super::config::{ScriptConfig, ScriptKind};
use super::generic::GenericValidator;
use super::types::{Scorer, ScriptError, Validator};

/// Name under which the built-in validator is always registered.
pub const GENERIC_VALIDATOR: &str = "generic";

/// Registered validation and scoring strategies.
#[derive(Clone)]
pub struct ScriptRegistry {
    validators: HashMap<String, Arc<dyn Validator>>,
    scorers: HashMap<String, Arc<dyn Scorer>>,
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut validators: Vec<_> = self.validators.keys().collect();
        let mut scorers: Vec<_> = self.scorers.keys().collect();
        validators.sort();
        scorers.sort();
        f.debug_struct("ScriptRegistry")
            .field("validators", &validators)
            .field("scorers", &scorers)
            .finish()
    }
}

impl ScriptRegistry {
    /// Creates a registry holding only the generic validator.
    pub fn new() -> Self {
        let mut registry = Self {
            validators: HashMap::new(),
            scorers: HashMap::new(),
        };
        registry.register_validator(GENERIC_VALIDATOR, Arc::new(GenericValidator::new()));
        registry
    }

    /// Builds a registry from the `[scripts]` config table.
    ///
    /// Command entries become external scripts. A validation entry without a
    /// command configures the generic validator under that name.
    pub fn from_config(scripts: &BTreeMap<String, ScriptConfig>) -> Result<Self, ScriptError> {
        let mut registry = Self::new();

        for (name, config) in scripts {
            match (config.kind, &config.command) {
                (ScriptKind::Validation, Some(_)) => {
                    let script = CommandScript::from_config(name, config)?;
                    registry.register_validator(name, Arc::new(script));
                }
                (ScriptKind::Validation, None) => {
                    let validator = GenericValidator::new()
                        .with_required_columns(config.required_columns.clone());
                    registry.register_validator(name, Arc::new(validator));
                }
                (ScriptKind::Scoring, Some(_)) => {
                    let script = CommandScript::from_config(name, config)?;
                    registry.register_scorer(name, Arc::new(script));
                }
                (ScriptKind::Scoring, None) => {
                    return Err(ScriptError::Config(format!(
                        "scoring script {} needs a command",
                        name
                    )));
                }
            }
        }

        Ok(registry)
    }

    /// Registers (or replaces) a validator.
    pub fn register_validator(&mut self, name: impl Into<String>, validator: Arc<dyn Validator>) {
        self.validators.insert(name.into(), validator);
    }

    /// Registers (or replaces) a scorer.
    pub fn register_scorer(&mut self, name: impl Into<String>, scorer: Arc<dyn Scorer>) {
        self.scorers.insert(name.into(), scorer);
    }

    pub fn validator(&self, name: &str) -> Option<Arc<dyn Validator>> {
        self.validators.get(name).cloned()
    }

    pub fn scorer(&self, name: &str) -> Option<Arc<dyn Scorer>> {
        self.scorers.get(name).cloned()
    }

    pub fn has_validator(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    pub fn has_scorer(&self, name: &str) -> bool {
        self.scorers.contains_key(name)
    }
}
