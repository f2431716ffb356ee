//! Ordered record of collaborator calls shared by all mocks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::submission::SubmissionId;

/// A collaborator call, recorded once its effect has happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Operation name, e.g. `"update_status"` or `"validate"`.
    pub action: &'static str,
    pub submission_id: Option<SubmissionId>,
    /// Free-form detail such as the status written.
    pub detail: String,
}

/// Shared, ordered call log.
///
/// Clones share the same log, so every mock in a test can append to one
/// sequence and ordering can be asserted across collaborators.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordedCall>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(
        &self,
        action: &'static str,
        submission_id: Option<&SubmissionId>,
        detail: impl Into<String>,
    ) {
        self.lock().push(RecordedCall {
            action,
            submission_id: submission_id.cloned(),
            detail: detail.into(),
        });
    }

    pub fn entries(&self) -> Vec<RecordedCall> {
        self.lock().clone()
    }

    /// Calls made for one submission, in order.
    pub fn for_submission(&self, id: &str) -> Vec<RecordedCall> {
        self.lock()
            .iter()
            .filter(|c| c.submission_id.as_ref().map(|s| s.as_str()) == Some(id))
            .cloned()
            .collect()
    }

    /// `action` or `action:detail` labels for one submission, in order.
    pub fn actions(&self, id: &str) -> Vec<String> {
        self.for_submission(id)
            .into_iter()
            .map(|c| {
                if c.detail.is_empty() {
                    c.action.to_string()
                } else {
                    format!("{}:{}", c.action, c.detail)
                }
            })
            .collect()
    }

    /// Number of calls with this action for a submission.
    pub fn count(&self, id: &str, action: &str) -> usize {
        self.for_submission(id)
            .iter()
            .filter(|c| c.action == action)
            .count()
    }

    /// Global position of the first matching call.
    pub fn position(&self, id: &str, action: &str) -> Option<usize> {
        self.lock().iter().position(|c| {
            c.action == action && c.submission_id.as_ref().map(|s| s.as_str()) == Some(id)
        })
    }

    /// Global position of the first call with this action and detail.
    pub fn position_of(&self, id: &str, action: &str, detail: &str) -> Option<usize> {
        self.lock().iter().position(|c| {
            c.action == action
                && c.detail == detail
                && c.submission_id.as_ref().map(|s| s.as_str()) == Some(id)
        })
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
