//! Deduplication of fetched records by submission id.

use std::collections::HashSet;

use crate::submission::SubmissionRecord;

/// Drops repeated submission ids, keeping the first occurrence and the
/// registry's order.
pub fn deduplicate_records(records: Vec<SubmissionRecord>) -> Vec<SubmissionRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .collect()
}
