//! Core submission data types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::Topology;

use super::state::SubmissionState;
use super::status::SubmissionStatus;

/// Opaque submission identifier assigned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubmissionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubmissionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Artifacts
// ============================================================================

static IMAGE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?P<repo>(?:[A-Za-z0-9.-]+(?::[0-9]+)?/)?",
        r"[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*",
        r"(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*)",
        r"(?:(?:@(?P<digest>sha256:[a-f0-9]{64}))|(?::(?P<tag>[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})))?$",
    ))
    .expect("image reference pattern is valid")
});

/// Image reference that failed to parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid container image reference: {0:?}")]
pub struct InvalidImageReference(pub String);

/// A container image reference, pinned by digest when the registry provides one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ImageReference {
    /// Parses `repository[:tag]` or `repository@sha256:<hex>`.
    pub fn parse(reference: &str) -> Result<Self, InvalidImageReference> {
        let caps = IMAGE_REFERENCE
            .captures(reference.trim())
            .ok_or_else(|| InvalidImageReference(reference.to_string()))?;

        Ok(Self {
            repository: caps["repo"].to_string(),
            digest: caps.name("digest").map(|m| m.as_str().to_string()),
            tag: caps.name("tag").map(|m| m.as_str().to_string()),
        })
    }

    /// Combines a repository and an optional digest as reported by the registry.
    pub fn from_parts(
        repository: &str,
        digest: Option<&str>,
    ) -> Result<Self, InvalidImageReference> {
        match digest {
            Some(d) if !d.is_empty() => Self::parse(&format!("{}@{}", repository, d)),
            _ => Self::parse(repository),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => write!(f, "{}@{}", self.repository, digest),
            (None, Some(tag)) => write!(f, "{}:{}", self.repository, tag),
            (None, None) => write!(f, "{}:latest", self.repository),
        }
    }
}

/// The artifact a participant submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// Model-to-data: a container image run against hidden data.
    ContainerImage { image: ImageReference },
    /// Data-to-model: a predictions file stored on the registry.
    DataFile { entity_id: String },
}

// ============================================================================
// Registry record
// ============================================================================

/// A submission as reported by the registry view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub status: SubmissionStatus,
    pub evaluation_id: String,
    #[serde(default)]
    pub evaluation_name: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub docker_repository: Option<String>,
    #[serde(default)]
    pub docker_digest: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
}

impl SubmissionRecord {
    /// Who receives the outcome message: the team when there is one, else the user.
    pub fn recipient(&self) -> Option<&str> {
        self.team_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.user_id.as_deref().filter(|u| !u.is_empty()))
    }

    /// The submitted container image, if this is a model-to-data submission.
    pub fn container_image(&self) -> Result<ImageReference, InvalidImageReference> {
        let repository = self
            .docker_repository
            .as_deref()
            .ok_or_else(|| InvalidImageReference(String::new()))?;
        ImageReference::from_parts(repository, self.docker_digest.as_deref())
    }

    /// The submitted data file, if this is a data-to-model submission.
    pub fn data_file(&self) -> Option<&str> {
        self.entity_id.as_deref().filter(|e| !e.is_empty())
    }
}

/// Remote folders created for a submission's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionFolders {
    pub root_id: String,
    pub output_id: String,
    pub logs_id: String,
}

// ============================================================================
// Results
// ============================================================================

/// Verdict of a validation script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Validated,
    Invalid,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Validated => "VALIDATED",
            ValidationStatus::Invalid => "INVALID",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Validated)
    }
}

impl From<ValidationStatus> for SubmissionStatus {
    fn from(status: ValidationStatus) -> Self {
        match status {
            ValidationStatus::Validated => SubmissionStatus::Validated,
            ValidationStatus::Invalid => SubmissionStatus::Invalid,
        }
    }
}

/// Output of the validation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            status: ValidationStatus::Validated,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            status: ValidationStatus::Invalid,
            errors,
        }
    }

    /// Annotation set recorded after validation.
    pub fn annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("validation_status".to_string(), self.status.as_str().to_string()),
            ("validation_errors".to_string(), self.errors.join("; ")),
        ])
    }
}

/// Output of the scoring stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub status: SubmissionStatus,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ScoreOutcome {
    /// Annotation set recorded after scoring: status, errors and one key per metric.
    pub fn annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::from([
            ("score_status".to_string(), self.status.as_str().to_string()),
            ("score_errors".to_string(), self.errors.join("; ")),
        ]);
        for (name, value) in &self.metrics {
            annotations.insert(name.clone(), value.to_string());
        }
        annotations
    }
}

/// Results accumulated across stages. Fields are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreOutcome>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ResultPayload {
    /// Records the container exit code. Returns false if one was already recorded.
    pub fn record_exit(&mut self, exit_code: i32) -> bool {
        set_once(&mut self.exit_code, exit_code)
    }

    /// Records where the predictions live. Returns false if already recorded.
    pub fn record_predictions(&mut self, path: PathBuf) -> bool {
        set_once(&mut self.predictions, path)
    }

    /// Records the validation verdict. Returns false if already recorded.
    pub fn record_validation(&mut self, outcome: ValidationOutcome) -> bool {
        set_once(&mut self.validation, outcome)
    }

    /// Records the score. Returns false if already recorded.
    pub fn record_score(&mut self, outcome: ScoreOutcome) -> bool {
        set_once(&mut self.score, outcome)
    }

    /// Merges acknowledged annotations.
    pub fn merge_annotations(&mut self, annotations: &BTreeMap<String, String>) {
        for (key, value) in annotations {
            self.annotations.insert(key.clone(), value.clone());
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}

// ============================================================================
// Submission
// ============================================================================

/// A submission being driven through one orchestration run.
///
/// Owned exclusively by the task processing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub record: SubmissionRecord,
    pub state: SubmissionState,
    /// Last status acknowledged by the registry.
    pub status: SubmissionStatus,
    /// Local scratch directory for this submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folders: Option<SubmissionFolders>,
    pub results: ResultPayload,
    /// State types visited, in order.
    pub history: Vec<String>,
    pub discovered_at: DateTime<Utc>,
}

impl Submission {
    /// Creates a submission from a freshly fetched registry record.
    pub fn discovered(record: SubmissionRecord) -> Self {
        let state = SubmissionState::Discovered;
        Self {
            id: record.id.clone(),
            status: record.status,
            history: vec![state.state_type().to_string()],
            state,
            record,
            workspace: None,
            folders: None,
            results: ResultPayload::default(),
            discovered_at: Utc::now(),
        }
    }

    /// Returns true once the notification stage has completed.
    pub fn is_notified(&self) -> bool {
        matches!(self.state, SubmissionState::Notified { .. })
    }

    /// Moves to `next`, recording it in the history.
    pub fn advance(
        &mut self,
        next: SubmissionState,
        topology: Topology,
    ) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(&next, topology) {
            return Err(InvalidTransition {
                id: self.id.clone(),
                from: self.state.state_type(),
                to: next.state_type(),
            });
        }
        self.history.push(next.state_type().to_string());
        self.state = next;
        Ok(())
    }
}

/// A state change the topology does not allow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid transition for {id}: {from} -> {to}")]
pub struct InvalidTransition {
    pub id: SubmissionId,
    pub from: &'static str,
    pub to: &'static str,
}
