use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AccountType, ApplicationId, ProfileId};

/// Subscription standing of a provisioned account profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

/// Profile attributes written when an account is activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileAttrs {
    pub account_type: AccountType,
    pub entity_name: String,
    pub billing_customer_id: String,
    pub billing_subscription_id: String,
    pub subscription_status: SubscriptionStatus,
    pub subscription_end: DateTime<Utc>,
    pub application_id: ApplicationId,
}

/// Account/identity provider boundary.
///
/// `create_or_get_identity` must be idempotent per email so a retried
/// webhook delivery converges on the same identity instead of failing
/// on a duplicate.
pub trait IdentityProvider: Send + Sync {
    fn create_or_get_identity(&self, email: &str, secret: &str)
        -> Result<ProfileId, IdentityError>;

    fn activate_profile(&self, id: &ProfileId, attrs: ProfileAttrs) -> Result<(), IdentityError>;

    /// Update subscription standing on whichever profile carries this
    /// billing subscription id. Unknown ids are a no-op.
    fn update_subscription(
        &self,
        billing_subscription_id: &str,
        status: SubscriptionStatus,
        subscription_end: DateTime<Utc>,
    ) -> Result<(), IdentityError>;
}

/// Identity provider failure.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Partial-failure state worth a provider retry; the caller maps
    /// this to the retryable provisioning-conflict taxonomy.
    #[error("conflicting identity state: {0}")]
    Conflict(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}
