//! Notifications are an ambient collaborator: the core only calls
//! [`Notifier::notify`]. The actual email wire format (SMTP, SendGrid, ...)
//! is explicitly out of scope; [`LoggingNotifier`] stands in until a real
//! transport is wired up, the way a development SMTP sink would.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    SubmissionSucceeded,
    SubmissionFailedTerminal,
}

impl std::fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SubmissionSucceeded => "submission_succeeded",
            Self::SubmissionFailedTerminal => "submission_failed_terminal",
        };
        f.write_str(s)
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: NotifyKind, to: &str, metadata: Value) -> anyhow::Result<()>;
}

pub struct LoggingNotifier;

#[async_trait::async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, kind: NotifyKind, to: &str, metadata: Value) -> anyhow::Result<()> {
        tracing::info!(%kind, %to, %metadata, "notification dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_notifier_never_fails() {
        let notifier = LoggingNotifier;
        let result = notifier
            .notify(NotifyKind::SubmissionSucceeded, "staff@example.com", serde_json::json!({}))
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn notify_kind_display_is_snake_case() {
        assert_eq!(NotifyKind::SubmissionSucceeded.to_string(), "submission_succeeded");
        assert_eq!(
            NotifyKind::SubmissionFailedTerminal.to_string(),
            "submission_failed_terminal"
        );
    }
}
