//! Sends outcome messages through the registry.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::registry::{OutgoingMessage, RegistryClient, RegistryError};
use crate::submission::{Submission, SubmissionId};

use super::config::NotificationConfig;
use super::message::{compose_body, compose_subject};

/// Errors raised while composing or sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("No validation verdict recorded for {0}")]
    MissingVerdict(SubmissionId),

    #[error("No recipient for {0}: record has neither team nor user")]
    NoRecipient(SubmissionId),

    #[error("Failed to send message: {0}")]
    Send(#[from] RegistryError),
}

impl NotifyError {
    /// True only when the message provably never left this process.
    ///
    /// A send that timed out or got an error response may still have been
    /// delivered, so it is not retried.
    pub fn is_undelivered(&self) -> bool {
        match self {
            Self::Send(e) => e.is_undelivered(),
            _ => false,
        }
    }
}

/// Builds and sends the outcome message for a submission.
pub struct NotificationDispatcher {
    registry: Arc<dyn RegistryClient>,
    config: NotificationConfig,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<dyn RegistryClient>, config: NotificationConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Composes the message without sending it.
    pub fn compose(
        &self,
        submission: &Submission,
        include_score: bool,
    ) -> Result<OutgoingMessage, NotifyError> {
        let validation = submission
            .results
            .validation
            .as_ref()
            .ok_or_else(|| NotifyError::MissingVerdict(submission.id.clone()))?;
        let recipient = submission
            .record
            .recipient()
            .ok_or_else(|| NotifyError::NoRecipient(submission.id.clone()))?;

        let record = &submission.record;
        let evaluation_name = record
            .evaluation_name
            .as_deref()
            .unwrap_or(&record.evaluation_id);
        let metrics = submission
            .results
            .score
            .as_ref()
            .map(|s| s.metrics.clone())
            .unwrap_or_default();
        let reason = validation.errors.join("; ");
        let link = self.config.link_for(&record.evaluation_id);

        Ok(OutgoingMessage {
            submission_id: submission.id.clone(),
            recipients: vec![recipient.to_string()],
            subject: compose_subject(evaluation_name, &submission.id, validation.status),
            body: compose_body(
                &submission.id,
                validation.status,
                include_score,
                &metrics,
                &reason,
                &link,
            ),
        })
    }

    /// Composes and sends the message. Returns what was sent.
    pub async fn notify(
        &self,
        submission: &Submission,
        include_score: bool,
    ) -> Result<OutgoingMessage, NotifyError> {
        let message = self.compose(submission, include_score)?;
        self.registry.send_message(&message).await?;
        info!(
            "Sent outcome message for {} to {}",
            submission.id,
            message.recipients.join(", ")
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{ScoreOutcome, SubmissionStatus, ValidationOutcome};
    use crate::testing::{fixtures, CallLog, MockRegistry};
    use std::collections::BTreeMap;

    fn scored_submission() -> Submission {
        let mut submission = Submission::discovered(fixtures::container_record("sub-1"));
        submission.results.record_validation(ValidationOutcome::valid());
        submission.results.record_score(ScoreOutcome {
            status: SubmissionStatus::Accepted,
            metrics: BTreeMap::from([("auc".to_string(), 0.91)]),
            errors: vec![],
        });
        submission
    }

    #[tokio::test]
    async fn test_notify_sends_to_recipient() {
        let registry = Arc::new(MockRegistry::new(CallLog::new()));
        let dispatcher = NotificationDispatcher::new(registry.clone(), NotificationConfig::default());

        let message = dispatcher.notify(&scored_submission(), true).await.unwrap();

        assert!(message.subject.ends_with("Success: sub-1"));
        assert!(message.body.contains("auc : 0.91"));
        let sent = registry.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec![fixtures::TEAM_ID.to_string()]);
    }

    #[test]
    fn test_missing_verdict() {
        let registry = Arc::new(MockRegistry::new(CallLog::new()));
        let dispatcher = NotificationDispatcher::new(registry, NotificationConfig::default());
        let submission = Submission::discovered(fixtures::container_record("sub-1"));

        let err = dispatcher.compose(&submission, false).unwrap_err();
        assert!(matches!(err, NotifyError::MissingVerdict(_)));
        assert!(!err.is_undelivered());
    }

    #[test]
    fn test_undelivered_classification() {
        assert!(NotifyError::Send(RegistryError::Unreachable("refused".into())).is_undelivered());
        assert!(!NotifyError::Send(RegistryError::Timeout).is_undelivered());
    }
}
