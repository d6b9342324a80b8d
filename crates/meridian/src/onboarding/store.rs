use chrono::{DateTime, Utc};

use super::domain::{
    ApplicantProfile, Application, ApplicationId, ApplicationState, PaymentToken, ProfileId,
};

/// Durable record of applications and their lifecycle state.
///
/// `transition` is the only write path for state and state-coupled
/// fields; it is a compare-and-swap so concurrent writers race on the
/// expected source state instead of overwriting each other.
pub trait ApplicationStore: Send + Sync {
    /// Create a new `pending` application. Fails with
    /// [`StoreError::DuplicateActive`] when the contact email already has
    /// an application in a non-terminal-for-intake state
    /// (`pending`/`approved`/`payment_complete`).
    fn create(&self, profile: ApplicantProfile) -> Result<Application, StoreError>;

    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;

    /// Apply `patch` atomically, but only while the stored state equals
    /// `expected`. Returns the updated application, or
    /// [`StoreError::StateConflict`] carrying the state actually found.
    fn transition(
        &self,
        id: &ApplicationId,
        expected: ApplicationState,
        patch: ApplicationPatch,
    ) -> Result<Application, StoreError>;
}

/// Field updates applied together with a state transition.
#[derive(Debug, Clone, Default)]
pub struct ApplicationPatch {
    pub state: Option<ApplicationState>,
    pub token: TokenPatch,
    pub payment_link_sent_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub profile_id: Option<ProfileId>,
}

/// What a transition does to the stored payment token.
#[derive(Debug, Clone, Default)]
pub enum TokenPatch {
    #[default]
    Keep,
    Set(PaymentToken),
    Clear,
}

impl ApplicationPatch {
    pub fn apply(self, application: &mut Application) {
        if let Some(state) = self.state {
            application.state = state;
        }
        match self.token {
            TokenPatch::Keep => {}
            TokenPatch::Set(token) => application.payment_link_token = Some(token),
            TokenPatch::Clear => application.payment_link_token = None,
        }
        if let Some(sent_at) = self.payment_link_sent_at {
            application.payment_link_sent_at = Some(sent_at);
        }
        if let Some(reviewed_at) = self.reviewed_at {
            application.reviewed_at = Some(reviewed_at);
        }
        if let Some(notes) = self.review_notes {
            application.review_notes = Some(notes);
        }
        if let Some(profile_id) = self.profile_id {
            application.profile_id = Some(profile_id);
        }
    }
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an active application already exists for this email")]
    DuplicateActive,
    #[error("application not found")]
    NotFound,
    #[error("application is in state '{}', not the expected state", actual.label())]
    StateConflict { actual: ApplicationState },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Ledger of payment-provider event ids that have been fully processed.
///
/// Ids are recorded only after successful processing, so a failed
/// delivery stays retryable; replay of a successful delivery is caught
/// here first and by the `payment_complete` guard second.
pub trait ProcessedEventLedger: Send + Sync {
    fn contains(&self, event_id: &str) -> Result<bool, StoreError>;

    /// Record `event_id`, returning `false` when it was already present.
    fn record(&self, event_id: &str) -> Result<bool, StoreError>;
}
