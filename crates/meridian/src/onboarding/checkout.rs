use serde::{Deserialize, Serialize};

use super::domain::{AccountType, ApplicationId};

/// Fixed recurring price for the hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceSpec {
    pub currency: String,
    pub unit_amount_cents: u32,
    pub interval: BillingInterval,
    pub product_name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Year,
}

/// Metadata attached to the hosted session so the payment event
/// processor can provision the account without another round-trip to
/// the applicant.
///
/// `account_secret` is the client-chosen credential material. It lives
/// only inside the provider session; it is never written to the
/// application store and the `Debug` impl redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub application_id: ApplicationId,
    pub account_type: AccountType,
    pub entity_name: String,
    pub account_secret: String,
}

impl std::fmt::Debug for SessionMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMetadata")
            .field("application_id", &self.application_id)
            .field("account_type", &self.account_type)
            .field("entity_name", &self.entity_name)
            .field("account_secret", &"..")
            .finish()
    }
}

/// Opaque handle to a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    pub session_id: String,
    pub url: String,
}

/// Hosted-payment provider boundary.
pub trait PaymentGateway: Send + Sync {
    fn create_checkout_session(
        &self,
        price: &PriceSpec,
        customer_email: &str,
        metadata: &SessionMetadata,
    ) -> Result<SessionHandle, GatewayError>;
}

/// Provider-side failure. Never mutates application state; surfaces as
/// a 5xx to the caller.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
    #[error("payment provider rejected the session: {0}")]
    Rejected(String),
}
