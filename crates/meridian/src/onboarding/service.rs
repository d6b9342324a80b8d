use std::sync::Arc;

use tracing::warn;

use super::checkout::{
    BillingInterval, GatewayError, PaymentGateway, PriceSpec, SessionHandle, SessionMetadata,
};
use super::decision::{DecisionEngine, DecisionError};
use super::domain::{
    ApplicantProfile, Application, ApplicationId, ApplicationState, ApplicationSummary, Decision,
};
use super::events::{EventDisposition, EventError, PaymentEventProcessor};
use super::identity::{IdentityError, IdentityProvider};
use super::notify::{ConfirmationMailer, NotificationEvent, NotificationSink};
use super::store::{ApplicationStore, ProcessedEventLedger, StoreError};
use super::token::{TokenError, TokenIssuer};
use crate::config::PaymentConfig;

/// Facade over the application lifecycle core: intake, staff decisions,
/// token-gated checkout, and payment event processing.
///
/// Generic over the store and the four external collaborators so tests
/// and the service binary can plug in their own adapters.
pub struct OnboardingService<S, L, N, C, I, G> {
    store: Arc<S>,
    notifier: Arc<N>,
    mailer: Arc<C>,
    gateway: Arc<G>,
    issuer: TokenIssuer,
    decisions: DecisionEngine<S, N>,
    events: PaymentEventProcessor<S, L, N, I>,
    payment: PaymentConfig,
}

impl<S, L, N, C, I, G> OnboardingService<S, L, N, C, I, G>
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    C: ConfirmationMailer + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(
        store: Arc<S>,
        ledger: Arc<L>,
        notifier: Arc<N>,
        mailer: Arc<C>,
        identity: Arc<I>,
        gateway: Arc<G>,
        payment: PaymentConfig,
    ) -> Self {
        let decisions = DecisionEngine::new(store.clone(), notifier.clone(), payment.clone());
        let events = PaymentEventProcessor::new(
            store.clone(),
            ledger,
            notifier.clone(),
            identity,
            &payment,
        );

        Self {
            store,
            notifier,
            mailer,
            gateway,
            issuer: TokenIssuer,
            decisions,
            events,
            payment,
        }
    }

    /// Submit a new partner application; it enters the `pending` state.
    pub fn submit(&self, profile: ApplicantProfile) -> Result<Application, OnboardingError> {
        validate_profile(&profile)?;

        let application = self.store.create(profile).map_err(|err| match err {
            StoreError::DuplicateActive => OnboardingError::DuplicateActive,
            other => OnboardingError::Store(other),
        })?;

        if let Err(err) = self.mailer.send_confirmation(&application) {
            warn!(application = %application.id.0, error = %err, "confirmation email failed");
        }
        if let Err(err) = self
            .notifier
            .notify(NotificationEvent::Applied(application.summary()))
        {
            warn!(application = %application.id.0, error = %err, "intake notification failed");
        }

        Ok(application)
    }

    /// Fetch the full record for staff review.
    pub fn get(&self, id: &ApplicationId) -> Result<Application, OnboardingError> {
        self.store.get(id)?.ok_or(OnboardingError::NotFound)
    }

    /// Apply a staff decision to a pending application.
    pub fn decide(
        &self,
        id: &ApplicationId,
        decision: Decision,
        notes: Option<String>,
    ) -> Result<Application, OnboardingError> {
        self.decisions
            .decide(id, decision, notes)
            .map_err(|err| match err {
                DecisionError::NotFound => OnboardingError::NotFound,
                DecisionError::InvalidTransition { from } => {
                    OnboardingError::InvalidTransition { from }
                }
                DecisionError::Store(store) => OnboardingError::Store(store),
            })
    }

    /// Resolve a payment link to the application summary the payment
    /// page renders. Fails for anything but a live `approved` token.
    pub fn payment_context(
        &self,
        id: &ApplicationId,
        token: &str,
    ) -> Result<ApplicationSummary, OnboardingError> {
        let application = self.validated(id, token)?;
        Ok(application.summary())
    }

    /// Open a hosted checkout session for a valid payment link.
    ///
    /// `secret` is the applicant's chosen credential material; it rides
    /// only in the session metadata and is never persisted here.
    pub fn start_checkout(
        &self,
        id: &ApplicationId,
        token: &str,
        secret: &str,
    ) -> Result<SessionHandle, OnboardingError> {
        let application = self.validated(id, token).map_err(|err| match err {
            OnboardingError::Token(_) => OnboardingError::InvalidApplication,
            other => other,
        })?;

        let price = PriceSpec {
            currency: self.payment.currency.clone(),
            unit_amount_cents: self.payment.annual_fee_cents,
            interval: BillingInterval::Year,
            product_name: self.payment.product_name.clone(),
            description: format!(
                "Annual membership for {}",
                application.profile.entity_name
            ),
        };
        let metadata = SessionMetadata {
            application_id: application.id.clone(),
            account_type: application.profile.account_type,
            entity_name: application.profile.entity_name.clone(),
            account_secret: secret.to_string(),
        };

        let handle = self.gateway.create_checkout_session(
            &price,
            &application.profile.contact.email,
            &metadata,
        )?;

        Ok(handle)
    }

    /// Verify and process one raw payment-provider event delivery.
    pub fn handle_payment_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<EventDisposition, OnboardingError> {
        self.events
            .handle(payload, signature_header)
            .map_err(|err| match err {
                EventError::InvalidSignature => OnboardingError::InvalidSignature,
                EventError::Provisioning(IdentityError::Conflict(detail)) => {
                    OnboardingError::ProvisioningConflict(detail)
                }
                other => OnboardingError::Event(other),
            })
    }

    fn validated(
        &self,
        id: &ApplicationId,
        token: &str,
    ) -> Result<Application, OnboardingError> {
        let application = self
            .store
            .get(id)?
            .ok_or(OnboardingError::Token(TokenError::ApplicationNotFound))?;
        self.issuer.validate(&application, token)?;
        Ok(application)
    }
}

fn validate_profile(profile: &ApplicantProfile) -> Result<(), OnboardingError> {
    let contact = &profile.contact;
    if contact.email.trim().is_empty() || !contact.email.contains('@') {
        return Err(OnboardingError::Validation(
            "a valid email address is required".to_string(),
        ));
    }
    if contact.first_name.trim().is_empty() || contact.last_name.trim().is_empty() {
        return Err(OnboardingError::Validation(
            "first and last name are required".to_string(),
        ));
    }
    if profile.entity_name.trim().is_empty() {
        return Err(OnboardingError::Validation(format!(
            "{} name is required for {} accounts",
            profile.account_type.label(),
            profile.account_type.label()
        )));
    }
    if profile.intake.motivation.trim().is_empty() {
        return Err(OnboardingError::Validation(
            "motivation is required".to_string(),
        ));
    }
    Ok(())
}

/// Error raised by the onboarding service.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("{0}")]
    Validation(String),
    #[error("an application with this email already exists")]
    DuplicateActive,
    #[error("application not found")]
    NotFound,
    #[error("application already decided (state '{}')", from.label())]
    InvalidTransition { from: ApplicationState },
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("invalid application")]
    InvalidApplication,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("invalid event signature")]
    InvalidSignature,
    #[error("provisioning conflict: {0}")]
    ProvisioningConflict(String),
    #[error(transparent)]
    Event(EventError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
