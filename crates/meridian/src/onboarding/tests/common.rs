use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::config::PaymentConfig;
use crate::onboarding::checkout::{
    GatewayError, PaymentGateway, PriceSpec, SessionHandle, SessionMetadata,
};
use crate::onboarding::domain::{
    AccountType, ApplicantProfile, Application, ApplicationId, ApplicationState, ContactInfo,
    IntakeDetails, ProfileId,
};
use crate::onboarding::events::SignatureVerifier;
use crate::onboarding::identity::{
    IdentityError, IdentityProvider, ProfileAttrs, SubscriptionStatus,
};
use crate::onboarding::notify::{
    ConfirmationMailer, NotificationEvent, NotificationSink, NotifyError,
};
use crate::onboarding::service::OnboardingService;
use crate::onboarding::store::{
    ApplicationPatch, ApplicationStore, ProcessedEventLedger, StoreError,
};

pub(super) const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub(super) type TestService = OnboardingService<
    MemoryStore,
    MemoryLedger,
    RecordingNotifier,
    RecordingMailer,
    MemoryIdentity,
    StubGateway,
>;

pub(super) struct TestHarness {
    pub(super) service: Arc<TestService>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) ledger: Arc<MemoryLedger>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) mailer: Arc<RecordingMailer>,
    pub(super) identity: Arc<MemoryIdentity>,
    pub(super) gateway: Arc<StubGateway>,
}

pub(super) fn harness() -> TestHarness {
    let store = Arc::new(MemoryStore::default());
    let ledger = Arc::new(MemoryLedger::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(RecordingMailer::default());
    let identity = Arc::new(MemoryIdentity::default());
    let gateway = Arc::new(StubGateway::default());
    let service = Arc::new(OnboardingService::new(
        store.clone(),
        ledger.clone(),
        notifier.clone(),
        mailer.clone(),
        identity.clone(),
        gateway.clone(),
        payment_config(),
    ));
    TestHarness {
        service,
        store,
        ledger,
        notifier,
        mailer,
        identity,
        gateway,
    }
}

pub(super) fn payment_config() -> PaymentConfig {
    PaymentConfig {
        webhook_secret: WEBHOOK_SECRET.to_string(),
        annual_fee_cents: 5900,
        currency: "usd".to_string(),
        product_name: "Meridian Annual Membership".to_string(),
        base_url: "https://meridian.test".to_string(),
        signature_tolerance_secs: 300,
    }
}

pub(super) fn artist_profile(email: &str) -> ApplicantProfile {
    ApplicantProfile {
        account_type: AccountType::Artist,
        contact: ContactInfo {
            email: email.to_string(),
            first_name: "Nora".to_string(),
            last_name: "Vale".to_string(),
            phone: Some("+1 515 555 0145".to_string()),
        },
        entity_name: "Northern Signal".to_string(),
        country: Some("CA".to_string()),
        intake: IntakeDetails {
            catalog_size: Some("25-50 tracks".to_string()),
            current_distributor: Some("self-released".to_string()),
            distribution_goals: Some("editorial playlists".to_string()),
            marketing_budget: None,
            team_size: Some("2".to_string()),
            revenue_sources: vec!["streaming".to_string(), "sync".to_string()],
            motivation: "Looking for a partner that handles rights properly.".to_string(),
            additional_info: None,
        },
    }
}

pub(super) fn label_profile(email: &str) -> ApplicantProfile {
    let mut profile = artist_profile(email);
    profile.account_type = AccountType::Label;
    profile.entity_name = "Quiet Harbor Records".to_string();
    profile
}

/// Drive an application to `approved` and hand back the live token.
pub(super) fn approved_application(h: &TestHarness, email: &str) -> (ApplicationId, String) {
    let application = h
        .service
        .submit(artist_profile(email))
        .expect("submission succeeds");
    h.service
        .decide(
            &application.id,
            crate::onboarding::domain::Decision::Approve,
            None,
        )
        .expect("approval succeeds");
    let token = stored_token(&h.store, &application.id);
    (application.id, token)
}

pub(super) fn stored_token(store: &MemoryStore, id: &ApplicationId) -> String {
    store
        .get(id)
        .expect("store reachable")
        .expect("application present")
        .payment_link_token
        .expect("token present")
        .0
}

pub(super) fn checkout_completed_payload(
    event_id: &str,
    application_id: &ApplicationId,
    secret: &str,
) -> Vec<u8> {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_001",
                "customer": "cus_test_001",
                "subscription": "sub_test_001",
                "metadata": {
                    "application_id": application_id.0,
                    "account_type": "artist",
                    "entity_name": "Northern Signal",
                    "account_secret": secret,
                },
            },
        },
    })
    .to_string()
    .into_bytes()
}

pub(super) fn subscription_payload(event_id: &str, subscription_id: &str, status: &str) -> Vec<u8> {
    json!({
        "id": event_id,
        "type": "customer.subscription.updated",
        "data": {
            "object": {
                "id": subscription_id,
                "status": status,
                "current_period_end": Utc::now().timestamp() + 86_400,
            },
        },
    })
    .to_string()
    .into_bytes()
}

pub(super) fn sign(payload: &[u8]) -> String {
    SignatureVerifier::sign(WEBHOOK_SECRET, payload, Utc::now().timestamp())
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("body is json")
}

#[derive(Default)]
pub(super) struct MemoryStore {
    records: Mutex<HashMap<ApplicationId, Application>>,
    sequence: AtomicU64,
}

impl ApplicationStore for MemoryStore {
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
pub(super) struct MemoryLedger {
    seen: Mutex<HashSet<String>>,
}

impl ProcessedEventLedger for MemoryLedger {
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

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    pub(super) fail: AtomicBool,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(NotifyError::Transport("chat webhook down".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingMailer {
    confirmations: Mutex<Vec<ApplicationId>>,
    pub(super) fail: AtomicBool,
}

impl RecordingMailer {
    pub(super) fn confirmations(&self) -> Vec<ApplicationId> {
        self.confirmations
            .lock()
            .expect("mailer mutex poisoned")
            .clone()
    }
}

impl ConfirmationMailer for RecordingMailer {
    fn send_confirmation(&self, application: &Application) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(NotifyError::Transport("smtp relay down".to_string()));
        }
        self.confirmations
            .lock()
            .expect("mailer mutex poisoned")
            .push(application.id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryIdentity {
    identities: Mutex<HashMap<String, ProfileId>>,
    profiles: Mutex<HashMap<ProfileId, ProfileAttrs>>,
    create_calls: AtomicU64,
    pub(super) fail_activation: AtomicBool,
}

impl MemoryIdentity {
    pub(super) fn identity_count(&self) -> usize {
        self.identities
            .lock()
            .expect("identity mutex poisoned")
            .len()
    }

    pub(super) fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::Relaxed)
    }

    pub(super) fn profile(&self, id: &ProfileId) -> Option<ProfileAttrs> {
        self.profiles
            .lock()
            .expect("identity mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(super) fn profile_by_subscription(&self, subscription_id: &str) -> Option<ProfileAttrs> {
        self.profiles
            .lock()
            .expect("identity mutex poisoned")
            .values()
            .find(|attrs| attrs.billing_subscription_id == subscription_id)
            .cloned()
    }
}

impl IdentityProvider for MemoryIdentity {
    fn create_or_get_identity(
        &self,
        email: &str,
        _secret: &str,
    ) -> Result<ProfileId, IdentityError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.identities.lock().expect("identity mutex poisoned");
        let next = ProfileId(format!("profile-{:04}", guard.len() + 1));
        let id = guard.entry(email.to_string()).or_insert(next);
        Ok(id.clone())
    }

    fn activate_profile(&self, id: &ProfileId, attrs: ProfileAttrs) -> Result<(), IdentityError> {
        if self.fail_activation.load(Ordering::Relaxed) {
            return Err(IdentityError::Conflict(
                "profile row locked by another writer".to_string(),
            ));
        }
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

#[derive(Default)]
pub(super) struct StubGateway {
    sessions: Mutex<Vec<SessionMetadata>>,
    sequence: AtomicU64,
    pub(super) fail: AtomicBool,
}

impl StubGateway {
    pub(super) fn sessions(&self) -> Vec<SessionMetadata> {
        self.sessions.lock().expect("gateway mutex poisoned").clone()
    }
}

impl PaymentGateway for StubGateway {
    fn create_checkout_session(
        &self,
        _price: &PriceSpec,
        _customer_email: &str,
        metadata: &SessionMetadata,
    ) -> Result<SessionHandle, GatewayError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(GatewayError::Unavailable("provider timeout".to_string()));
        }
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions
            .lock()
            .expect("gateway mutex poisoned")
            .push(metadata.clone());
        Ok(SessionHandle {
            session_id: format!("cs_test_{n:03}"),
            url: format!("https://checkout.test/session/cs_test_{n:03}"),
        })
    }
}
