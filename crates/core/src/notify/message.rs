//! Subject and body templates.

use std::collections::BTreeMap;

use crate::submission::{SubmissionId, ValidationStatus};

pub fn compose_subject(
    evaluation_name: &str,
    submission_id: &SubmissionId,
    status: ValidationStatus,
) -> String {
    let verdict = if status.is_valid() { "Success" } else { "Failed" };
    format!(
        "Submission to '{}' {}: {}",
        evaluation_name, verdict, submission_id
    )
}

/// Picks the body template for (validation status, include_score).
pub fn compose_body(
    submission_id: &SubmissionId,
    status: ValidationStatus,
    include_score: bool,
    metrics: &BTreeMap<String, f64>,
    reason: &str,
    link: &str,
) -> String {
    match (status, include_score) {
        (ValidationStatus::Validated, true) => {
            let mut body = format!(
                "Submission {} has been evaluated with the following scores:\n",
                submission_id
            );
            for (metric, value) in metrics {
                body.push_str(&format!("{} : {}\n", metric, value));
            }
            body.push_str(&format!("\nView all your submissions here: {}.", link));
            body
        }
        (ValidationStatus::Validated, false) => format!(
            "Submission {} has been evaluated. Your score will be available after \
             Challenge submissions are closed. Thank you for participating!",
            submission_id
        ),
        (ValidationStatus::Invalid, true) => format!(
            "Evaluation failed for Submission {}.\nReason: '{}'.\n\
             View your submissions here: {}.\n\
             Please contact the organizers for more information.",
            submission_id, reason, link
        ),
        (ValidationStatus::Invalid, false) => format!(
            "Evaluation failed for Submission {}.\nReason: '{}'.\n\
             Please contact the organizers for more information.",
            submission_id, reason
        ),
    }
}
