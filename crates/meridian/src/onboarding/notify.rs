use super::domain::{Application, ApplicationSummary};

/// Lifecycle events forwarded to the staff chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Applied(ApplicationSummary),
    Approved {
        summary: ApplicationSummary,
        payment_url: String,
    },
    Denied(ApplicationSummary),
    Activated(ApplicationSummary),
}

/// Outbound alert hook (chat webhook, email digest, ...). Best-effort:
/// callers log failures and never let them abort a transition.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError>;
}

/// Sends the applicant their submission confirmation. Best-effort.
pub trait ConfirmationMailer: Send + Sync {
    fn send_confirmation(&self, application: &Application) -> Result<(), NotifyError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
