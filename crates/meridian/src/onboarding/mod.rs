//! Application lifecycle and payment activation.
//!
//! A prospective partner submits an application (`pending`), staff
//! approve or deny it, approval mints a single-use payment token, the
//! token gates a hosted checkout session, and the payment provider's
//! asynchronous event finally provisions the account and moves the
//! application to `payment_complete`. Every state write goes through a
//! compare-and-swap so duplicate clicks and replayed webhook deliveries
//! converge instead of double-firing.

pub mod checkout;
pub mod decision;
pub mod domain;
pub mod events;
pub mod identity;
pub mod notify;
pub mod router;
pub mod service;
pub mod store;
pub mod token;

#[cfg(test)]
mod tests;

pub use checkout::{
    BillingInterval, GatewayError, PaymentGateway, PriceSpec, SessionHandle, SessionMetadata,
};
pub use decision::{DecisionEngine, DecisionError};
pub use domain::{
    AccountType, ApplicantProfile, Application, ApplicationDetail, ApplicationId,
    ApplicationState, ApplicationSummary, ContactInfo, Decision, IntakeDetails, PaymentToken,
    ProfileId,
};
pub use events::{EventDisposition, EventError, PaymentEventProcessor, SignatureVerifier};
pub use identity::{IdentityError, IdentityProvider, ProfileAttrs, SubscriptionStatus};
pub use notify::{ConfirmationMailer, NotificationEvent, NotificationSink, NotifyError};
pub use router::onboarding_router;
pub use service::{OnboardingError, OnboardingService};
pub use store::{
    ApplicationPatch, ApplicationStore, ProcessedEventLedger, StoreError, TokenPatch,
};
pub use token::{TokenError, TokenIssuer};
