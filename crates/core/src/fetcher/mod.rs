//! Submission fetcher.
//!
//! Lists the submissions in a registry view that currently carry a target
//! status and returns them as an ordered, deduplicated snapshot. The fetch is
//! read-only; an empty batch is a normal result.

mod dedup;
mod submissions;

pub use dedup::deduplicate_records;
pub use submissions::{FetchError, SubmissionFetcher};
