//! Per-submission tracker.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::registry::RegistryClient;
use crate::submission::{SubmissionId, SubmissionStatus};

use super::error::TrackerError;

/// Acknowledgement of a tracker write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The registry accepted the write.
    Applied,
    /// The value was already current; nothing was written.
    Unchanged,
    /// The status would have regressed; nothing was written.
    Skipped,
}

#[derive(Debug)]
struct Tracked {
    status: SubmissionStatus,
    annotations: BTreeMap<String, String>,
}

/// Tracks and writes status and annotations for a single submission.
///
/// All writes go through one lock, so calls for the same submission never
/// interleave. Trackers for different submissions share nothing but the
/// registry client.
pub struct SubmissionTracker {
    id: SubmissionId,
    registry: Arc<dyn RegistryClient>,
    state: Mutex<Tracked>,
}

impl SubmissionTracker {
    /// Creates a tracker seeded with the status the fetcher observed.
    pub fn new(
        id: SubmissionId,
        registry: Arc<dyn RegistryClient>,
        initial_status: SubmissionStatus,
    ) -> Self {
        Self {
            id,
            registry,
            state: Mutex::new(Tracked {
                status: initial_status,
                annotations: BTreeMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &SubmissionId {
        &self.id
    }

    /// Last acknowledged status.
    pub async fn status(&self) -> SubmissionStatus {
        self.state.lock().await.status
    }

    /// Annotations written so far in this run.
    pub async fn annotations(&self) -> BTreeMap<String, String> {
        self.state.lock().await.annotations.clone()
    }

    /// Writes `status` unless it is already current or would regress.
    pub async fn update_status(&self, status: SubmissionStatus) -> Result<Ack, TrackerError> {
        let mut state = self.state.lock().await;

        if state.status == status {
            debug!("Status of {} already {}", self.id, status);
            return Ok(Ack::Unchanged);
        }
        if !state.status.can_advance_to(status) {
            warn!(
                "Skipping status write for {}: {} -> {} would regress",
                self.id, state.status, status
            );
            return Ok(Ack::Skipped);
        }

        self.registry
            .update_status(&self.id, status)
            .await
            .map_err(|source| TrackerError::StatusWrite {
                id: self.id.clone(),
                source,
            })?;

        debug!("Status of {}: {} -> {}", self.id, state.status, status);
        state.status = status;
        Ok(Ack::Applied)
    }

    /// Reads the remote status and, if it already equals `status`, records it
    /// as acknowledged.
    ///
    /// Used before retrying a status write whose outcome is unknown.
    pub async fn confirm_status(&self, status: SubmissionStatus) -> Result<bool, TrackerError> {
        let mut state = self.state.lock().await;
        if state.status == status {
            return Ok(true);
        }

        let remote = self
            .registry
            .get_submission_status(&self.id)
            .await
            .map_err(|source| TrackerError::StatusRead {
                id: self.id.clone(),
                source,
            })?;

        if remote == status {
            debug!("Status of {} already landed as {}", self.id, status);
            state.status = status;
            return Ok(true);
        }
        Ok(false)
    }

    /// Writes the annotations whose values differ from what was written before.
    pub async fn annotate(
        &self,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Ack, TrackerError> {
        let mut state = self.state.lock().await;

        let changed: BTreeMap<String, String> = annotations
            .iter()
            .filter(|(key, value)| state.annotations.get(*key) != Some(*value))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if changed.is_empty() {
            return Ok(Ack::Unchanged);
        }

        self.registry
            .annotate(&self.id, &changed)
            .await
            .map_err(|source| TrackerError::AnnotationWrite {
                id: self.id.clone(),
                source,
            })?;

        debug!("Annotated {} with {} key(s)", self.id, changed.len());
        state.annotations.extend(changed);
        Ok(Ack::Applied)
    }
}
