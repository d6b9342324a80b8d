use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use super::checkout::SessionMetadata;
use super::domain::{ApplicationState, ProfileId};
use super::identity::{IdentityError, IdentityProvider, ProfileAttrs, SubscriptionStatus};
use super::notify::{NotificationEvent, NotificationSink};
use super::store::{
    ApplicationPatch, ApplicationStore, ProcessedEventLedger, StoreError, TokenPatch,
};
use crate::config::PaymentConfig;

type HmacSha256 = Hmac<Sha256>;

/// Days of membership granted per completed checkout.
const SUBSCRIPTION_TERM_DAYS: i64 = 365;

/// Verifies `t=<unix>,v1=<hex>` signature headers over
/// `"{t}.{payload}"` with a shared secret, rejecting stale timestamps.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// All failure shapes collapse into `InvalidSignature`; callers get
    /// no hint whether the header, timestamp, or digest was wrong.
    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EventError> {
        let (timestamp, candidate) = parse_signature_header(header)?;

        let age = (now.timestamp() - timestamp).abs();
        if age > self.tolerance_secs {
            return Err(EventError::InvalidSignature);
        }

        let candidate = hex::decode(candidate).map_err(|_| EventError::InvalidSignature)?;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| EventError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice compares digests in constant time.
        mac.verify_slice(&candidate)
            .map_err(|_| EventError::InvalidSignature)
    }

    /// Produce a header this verifier would accept. Used by the demo
    /// binary and the tests to play the provider's role.
    pub fn sign(secret: &str, payload: &[u8], timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let digest = mac.finalize().into_bytes();
        format!("t={timestamp},v1={}", hex::encode(digest))
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, &str), EventError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(t), Some(v1)) => Ok((t, v1)),
        _ => Err(EventError::InvalidSignature),
    }
}

/// How a verified event was ultimately handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDisposition {
    /// Side effects ran; the application advanced.
    Accepted,
    /// Replay of an event that already took effect; no-op success.
    AlreadyProcessed,
    /// Event type or payload the processor does not act on.
    Ignored,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    metadata: Option<SessionMetadata>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    status: String,
    current_period_end: i64,
}

/// Consumes signed asynchronous events from the payment provider and,
/// exactly once per application, provisions the account and finalizes
/// the application state.
pub struct PaymentEventProcessor<S, L, N, I> {
    store: Arc<S>,
    ledger: Arc<L>,
    notifier: Arc<N>,
    identity: Arc<I>,
    verifier: SignatureVerifier,
}

impl<S, L, N, I> PaymentEventProcessor<S, L, N, I>
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    I: IdentityProvider + 'static,
{
    pub fn new(
        store: Arc<S>,
        ledger: Arc<L>,
        notifier: Arc<N>,
        identity: Arc<I>,
        payment: &PaymentConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            identity,
            verifier: SignatureVerifier::new(
                payment.webhook_secret.clone(),
                payment.signature_tolerance_secs,
            ),
        }
    }

    /// Verify and dispatch one raw webhook delivery.
    ///
    /// Errors after signature verification are reported back as
    /// failures so the provider's retry machinery redelivers; every
    /// branch below is safe under redelivery.
    pub fn handle(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<EventDisposition, EventError> {
        self.verifier.verify(payload, signature_header, Utc::now())?;

        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|err| EventError::Malformed(err.to_string()))?;

        match envelope.kind.as_str() {
            "checkout.session.completed" => self.on_checkout_completed(envelope),
            "customer.subscription.updated" | "customer.subscription.deleted" => {
                self.on_subscription_event(envelope)
            }
            other => {
                info!(kind = other, "ignoring unhandled payment event type");
                Ok(EventDisposition::Ignored)
            }
        }
    }

    fn on_checkout_completed(
        &self,
        envelope: EventEnvelope,
    ) -> Result<EventDisposition, EventError> {
        let session: CheckoutSessionObject = serde_json::from_value(envelope.data.object)
            .map_err(|err| EventError::Malformed(err.to_string()))?;

        let Some(ref metadata) = session.metadata else {
            warn!(event = %envelope.id, "checkout completion without session metadata");
            return Ok(EventDisposition::Ignored);
        };

        if self.ledger.contains(&envelope.id)? {
            return Ok(EventDisposition::AlreadyProcessed);
        }

        let application = self
            .store
            .get(&metadata.application_id)?
            .ok_or(EventError::ApplicationNotFound)?;

        if application.state == ApplicationState::PaymentComplete {
            // Replay that slipped past the ledger; the guard makes it a
            // no-op success rather than a duplicate provisioning run.
            let _ = self.ledger.record(&envelope.id);
            return Ok(EventDisposition::AlreadyProcessed);
        }

        let profile_id = self.provision(&application.profile.contact.email, &metadata, &session)?;

        let patch = ApplicationPatch {
            state: Some(ApplicationState::PaymentComplete),
            token: TokenPatch::Clear,
            payment_link_sent_at: None,
            reviewed_at: None,
            review_notes: None,
            profile_id: Some(profile_id),
        };
        let finalized = match self.store.transition(
            &metadata.application_id,
            ApplicationState::Approved,
            patch,
        ) {
            Ok(updated) => updated,
            Err(StoreError::StateConflict {
                actual: ApplicationState::PaymentComplete,
            }) => {
                // A concurrent delivery finalized first; provisioning is
                // convergent, so this delivery simply lost the race.
                let _ = self.ledger.record(&envelope.id);
                return Ok(EventDisposition::AlreadyProcessed);
            }
            Err(other) => return Err(other.into()),
        };

        if let Err(err) = self.ledger.record(&envelope.id) {
            // The payment_complete guard covers replays if this is lost.
            warn!(event = %envelope.id, error = %err, "failed to record processed event id");
        }

        info!(
            application = %finalized.id.0,
            profile = ?finalized.profile_id,
            "application payment complete, account provisioned"
        );

        if let Err(err) = self
            .notifier
            .notify(NotificationEvent::Activated(finalized.summary()))
        {
            warn!(application = %finalized.id.0, error = %err, "activation notification failed");
        }

        Ok(EventDisposition::Accepted)
    }

    fn provision(
        &self,
        email: &str,
        metadata: &SessionMetadata,
        session: &CheckoutSessionObject,
    ) -> Result<ProfileId, EventError> {
        // create-or-get keeps retried deliveries convergent: a retry
        // after a partial failure lands on the same identity instead of
        // erroring on a duplicate.
        let profile_id = self
            .identity
            .create_or_get_identity(email, &metadata.account_secret)?;

        let attrs = ProfileAttrs {
            account_type: metadata.account_type,
            entity_name: metadata.entity_name.clone(),
            billing_customer_id: session.customer.clone().unwrap_or_default(),
            billing_subscription_id: session.subscription.clone().unwrap_or_default(),
            subscription_status: SubscriptionStatus::Active,
            subscription_end: Utc::now() + Duration::days(SUBSCRIPTION_TERM_DAYS),
            application_id: metadata.application_id.clone(),
        };
        self.identity.activate_profile(&profile_id, attrs)?;

        Ok(profile_id)
    }

    fn on_subscription_event(
        &self,
        envelope: EventEnvelope,
    ) -> Result<EventDisposition, EventError> {
        let subscription: SubscriptionObject = serde_json::from_value(envelope.data.object)
            .map_err(|err| EventError::Malformed(err.to_string()))?;

        let status = match subscription.status.as_str() {
            "canceled" | "unpaid" => SubscriptionStatus::Cancelled,
            "active" => SubscriptionStatus::Active,
            other => {
                info!(status = other, "ignoring subscription status");
                return Ok(EventDisposition::Ignored);
            }
        };

        let period_end = Utc
            .timestamp_opt(subscription.current_period_end, 0)
            .single()
            .ok_or_else(|| {
                EventError::Malformed("current_period_end out of range".to_string())
            })?;

        // Touches only the provisioned profile; application state is
        // terminal by now and stays put.
        self.identity
            .update_subscription(&subscription.id, status, period_end)?;

        Ok(EventDisposition::Accepted)
    }
}

/// Error raised by the payment event processor.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid event signature")]
    InvalidSignature,
    #[error("malformed event payload: {0}")]
    Malformed(String),
    #[error("application referenced by event not found")]
    ApplicationNotFound,
    #[error(transparent)]
    Provisioning(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
