//! Mock validation and scoring scripts for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::scripts::{Scorer, ScoringRequest, ScriptError, ValidationRequest, Validator};
use crate::submission::{ScoreOutcome, SubmissionStatus, ValidationOutcome};

use super::call_log::CallLog;

/// Validator returning configured verdicts. Submissions without one are valid.
pub struct MockValidator {
    verdicts: Mutex<HashMap<String, ValidationOutcome>>,
    requests: Mutex<Vec<ValidationRequest>>,
    log: CallLog,
}

impl MockValidator {
    pub fn new(log: CallLog) -> Self {
        Self {
            verdicts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            log,
        }
    }

    fn verdicts(&self) -> MutexGuard<'_, HashMap<String, ValidationOutcome>> {
        self.verdicts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_verdict(&self, id: &str, outcome: ValidationOutcome) {
        self.verdicts().insert(id.to_string(), outcome);
    }

    pub fn requests(&self) -> Vec<ValidationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Validator for MockValidator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationOutcome, ScriptError> {
        let outcome = self
            .verdicts()
            .get(request.submission_id.as_str())
            .cloned()
            .unwrap_or_else(ValidationOutcome::valid);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.log.record(
            "validate",
            Some(&request.submission_id),
            outcome.status.as_str(),
        );
        Ok(outcome)
    }
}

/// Scorer returning configured results. Defaults to ACCEPTED with `auc = 0.9`.
pub struct MockScorer {
    scores: Mutex<HashMap<String, ScoreOutcome>>,
    requests: Mutex<Vec<ScoringRequest>>,
    log: CallLog,
}

impl MockScorer {
    pub fn new(log: CallLog) -> Self {
        Self {
            scores: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn default_score() -> ScoreOutcome {
        ScoreOutcome {
            status: SubmissionStatus::Accepted,
            metrics: BTreeMap::from([("auc".to_string(), 0.9)]),
            errors: Vec::new(),
        }
    }

    pub fn set_score(&self, id: &str, outcome: ScoreOutcome) {
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), outcome);
    }

    pub fn requests(&self) -> Vec<ScoringRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Scorer for MockScorer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreOutcome, ScriptError> {
        let outcome = self
            .scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request.submission_id.as_str())
            .cloned()
            .unwrap_or_else(Self::default_score);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.log.record(
            "score",
            Some(&request.submission_id),
            outcome.status.as_str(),
        );
        Ok(outcome)
    }
}
