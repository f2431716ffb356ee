//! Fetching the batch of submissions for a run.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::registry::{RegistryClient, RegistryError};
use crate::stage::{retry_with_backoff, Exhausted, RetryConfig};
use crate::submission::{SubmissionRecord, SubmissionStatus};

use super::dedup::deduplicate_records;

/// Errors from fetching a batch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The status filter is not a recognized status. Fatal to the run.
    #[error("Invalid status filter {filter:?}: {reason}")]
    InvalidQuery { filter: String, reason: String },

    /// The registry stayed unavailable through every attempt.
    #[error("Registry unavailable after {attempts} attempt(s): {source}")]
    TransientRegistry {
        attempts: u32,
        #[source]
        source: RegistryError,
    },

    /// The registry rejected the query outright.
    #[error("Registry rejected the fetch: {0}")]
    Registry(RegistryError),
}

impl FetchError {
    /// Whether a later run could succeed without a configuration change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientRegistry { .. })
    }
}

/// Reads the batch of submissions to process from a registry view.
pub struct SubmissionFetcher {
    registry: Arc<dyn RegistryClient>,
    retry: RetryConfig,
}

impl SubmissionFetcher {
    pub fn new(registry: Arc<dyn RegistryClient>, retry: RetryConfig) -> Self {
        Self { registry, retry }
    }

    /// Parses a status filter string.
    pub fn parse_filter(filter: &str) -> Result<SubmissionStatus, FetchError> {
        filter.parse().map_err(|e: crate::submission::StatusParseError| {
            FetchError::InvalidQuery {
                filter: filter.to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Returns the submissions in `view_id` whose status is `filter`,
    /// deduplicated, in registry order.
    pub async fn fetch(
        &self,
        view_id: &str,
        filter: &str,
    ) -> Result<Vec<SubmissionRecord>, FetchError> {
        let status = Self::parse_filter(filter)?;

        let (records, attempts) = retry_with_backoff(
            &self.retry,
            |_| self.registry.fetch_submissions(view_id, status),
            RegistryError::is_transient,
            |attempt, delay, e| {
                warn!(
                    "Fetch from view {} failed (attempt {}), retrying in {:?}: {}",
                    view_id, attempt, delay, e
                );
            },
        )
        .await
        .map_err(|Exhausted { error, attempts }| match error {
            RegistryError::InvalidQuery(reason) => FetchError::InvalidQuery {
                filter: filter.to_string(),
                reason,
            },
            error if error.is_transient() => FetchError::TransientRegistry {
                attempts,
                source: error,
            },
            error => FetchError::Registry(error),
        })?;

        let fetched = records.len();
        let matching: Vec<SubmissionRecord> = records
            .into_iter()
            .filter(|record| {
                let keep = record.status == status;
                if !keep {
                    debug!(
                        "Dropping {} from batch: status {} does not match {}",
                        record.id, record.status, status
                    );
                }
                keep
            })
            .collect();
        let batch = deduplicate_records(matching);

        info!(
            "Fetched {} submission(s) with status {} from view {} ({} returned, {} attempt(s))",
            batch.len(),
            status,
            view_id,
            fetched,
            attempts
        );
        Ok(batch)
    }
}
