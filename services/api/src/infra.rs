use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use meridian::onboarding::{
    ApplicantProfile, Application, ApplicationId, ApplicationPatch, ApplicationState,
    ApplicationStore, ConfirmationMailer, GatewayError, IdentityError, IdentityProvider,
    NotificationEvent, NotificationSink, NotifyError, PaymentGateway, PriceSpec,
    ProcessedEventLedger, ProfileAttrs, ProfileId, SessionHandle, SessionMetadata, StoreError,
    SubscriptionStatus,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mutex-map store backing the service until a managed database lands.
#[derive(Default)]
pub(crate) struct InMemoryApplicationStore {
    records: Mutex<HashMap<ApplicationId, Application>>,
    sequence: AtomicU64,
}

impl ApplicationStore for InMemoryApplicationStore {
    fn create(&self, profile: ApplicantProfile) -> Result<Application, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let duplicate = guard.values().any(|existing| {
            existing.profile.contact.email == profile.contact.email && existing.state.is_active()
        });
        if duplicate {
            return Err(StoreError::DuplicateActive);
        }

        let id = ApplicationId(format!(
            "app-{:06}",
            self.sequence.fetch_add(1, Ordering::Relaxed) + 1
        ));
        let application = Application {
            id: id.clone(),
            profile,
            state: ApplicationState::Pending,
            payment_link_token: None,
            payment_link_sent_at: None,
            created_at: Utc::now(),
            reviewed_at: None,
            review_notes: None,
            profile_id: None,
        };
        guard.insert(id, application.clone());
        Ok(application)
    }

    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn transition(
        &self,
        id: &ApplicationId,
        expected: ApplicationState,
        patch: ApplicationPatch,
    ) -> Result<Application, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let application = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        if application.state != expected {
            return Err(StoreError::StateConflict {
                actual: application.state,
            });
        }
        patch.apply(application);
        Ok(application.clone())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryEventLedger {
    seen: Mutex<HashSet<String>>,
}

impl ProcessedEventLedger for InMemoryEventLedger {
    fn contains(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .seen
            .lock()
            .expect("ledger mutex poisoned")
            .contains(event_id))
    }

    fn record(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .seen
            .lock()
            .expect("ledger mutex poisoned")
            .insert(event_id.to_string()))
    }
}

/// Log-backed stand-in for the staff chat webhook; carries the
/// configured channel URL so the real transport slots in here.
#[derive(Default)]
pub(crate) struct TracingNotificationSink {
    chat_webhook_url: Option<String>,
}

impl TracingNotificationSink {
    pub(crate) fn new(chat_webhook_url: Option<String>) -> Self {
        Self { chat_webhook_url }
    }

    fn channel(&self) -> &str {
        self.chat_webhook_url.as_deref().unwrap_or("log-only")
    }
}

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        let channel = self.channel();
        match event {
            NotificationEvent::Applied(summary) => {
                info!(
                    application = %summary.application_id.0,
                    account_type = summary.account_type.label(),
                    entity = %summary.entity_name,
                    channel,
                    "new application received"
                );
            }
            NotificationEvent::Approved {
                summary,
                payment_url,
            } => {
                info!(
                    application = %summary.application_id.0,
                    email = %summary.email,
                    payment_url = %payment_url,
                    channel,
                    "application approved, payment link issued"
                );
            }
            NotificationEvent::Denied(summary) => {
                info!(application = %summary.application_id.0, channel, "application denied");
            }
            NotificationEvent::Activated(summary) => {
                info!(
                    application = %summary.application_id.0,
                    email = %summary.email,
                    channel,
                    "new paid member activated"
                );
            }
        }
        Ok(())
    }
}

/// Log-backed stand-in for the transactional email provider.
#[derive(Default)]
pub(crate) struct TracingMailer;

impl ConfirmationMailer for TracingMailer {
    fn send_confirmation(&self, application: &Application) -> Result<(), NotifyError> {
        info!(
            application = %application.id.0,
            email = %application.profile.contact.email,
            "confirmation email queued"
        );
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryIdentityProvider {
    identities: Mutex<HashMap<String, ProfileId>>,
    profiles: Mutex<HashMap<ProfileId, ProfileAttrs>>,
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn create_or_get_identity(
        &self,
        email: &str,
        _secret: &str,
    ) -> Result<ProfileId, IdentityError> {
        let mut guard = self.identities.lock().expect("identity mutex poisoned");
        let next = ProfileId(format!("profile-{:04}", guard.len() + 1));
        Ok(guard.entry(email.to_string()).or_insert(next).clone())
    }

    fn activate_profile(&self, id: &ProfileId, attrs: ProfileAttrs) -> Result<(), IdentityError> {
        self.profiles
            .lock()
            .expect("identity mutex poisoned")
            .insert(id.clone(), attrs);
        Ok(())
    }

    fn update_subscription(
        &self,
        billing_subscription_id: &str,
        status: SubscriptionStatus,
        subscription_end: DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        let mut guard = self.profiles.lock().expect("identity mutex poisoned");
        for attrs in guard.values_mut() {
            if attrs.billing_subscription_id == billing_subscription_id {
                attrs.subscription_status = status;
                attrs.subscription_end = subscription_end;
            }
        }
        Ok(())
    }
}

/// Hands out fake hosted sessions; replaced by the real provider client
/// in deployment.
pub(crate) struct StubPaymentGateway {
    base_url: String,
    sequence: AtomicU64,
}

impl StubPaymentGateway {
    pub(crate) fn new(base_url: String) -> Self {
        Self {
            base_url,
            sequence: AtomicU64::new(0),
        }
    }
}

impl PaymentGateway for StubPaymentGateway {
    fn create_checkout_session(
        &self,
        price: &PriceSpec,
        customer_email: &str,
        metadata: &SessionMetadata,
    ) -> Result<SessionHandle, GatewayError> {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let session_id = format!("cs_local_{n:06}");
        info!(
            session = %session_id,
            application = %metadata.application_id.0,
            email = %customer_email,
            amount_cents = price.unit_amount_cents,
            "hosted checkout session created"
        );
        Ok(SessionHandle {
            url: format!("{}/checkout/{session_id}", self.base_url),
            session_id,
        })
    }
}
