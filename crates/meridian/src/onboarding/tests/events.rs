use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};

use super::common::*;
use crate::onboarding::domain::ApplicationState;
use crate::onboarding::events::EventDisposition;
use crate::onboarding::identity::SubscriptionStatus;
use crate::onboarding::service::OnboardingError;
use crate::onboarding::store::ApplicationStore;

#[test]
fn completed_checkout_provisions_and_finalizes() {
    let h = harness();
    let (id, token) = approved_application(&h, "nora@northernsignal.ca");
    let payload = checkout_completed_payload("evt_001", &id, "pw-material");

    let disposition = h
        .service
        .handle_payment_event(&payload, &sign(&payload))
        .expect("event processes");
    assert_eq!(disposition, EventDisposition::Accepted);

    let stored = h
        .store
        .get(&id)
        .expect("store reachable")
        .expect("record present");
    assert_eq!(stored.state, ApplicationState::PaymentComplete);
    assert!(stored.payment_link_token.is_none(), "token is consumed");
    let profile_id = stored.profile_id.expect("profile linked");

    let attrs = h.identity.profile(&profile_id).expect("profile written");
    assert_eq!(attrs.billing_customer_id, "cus_test_001");
    assert_eq!(attrs.billing_subscription_id, "sub_test_001");
    assert_eq!(attrs.subscription_status, SubscriptionStatus::Active);
    assert!(attrs.subscription_end > Utc::now() + Duration::days(364));
    assert_eq!(attrs.application_id, id);

    // The consumed link no longer resolves a payment context.
    assert!(matches!(
        h.service.payment_context(&id, &token),
        Err(OnboardingError::Token(_))
    ));
}

#[test]
fn duplicate_delivery_provisions_exactly_once() {
    let h = harness();
    let (id, _token) = approved_application(&h, "nora@northernsignal.ca");
    let payload = checkout_completed_payload("evt_001", &id, "pw-material");

    let first = h
        .service
        .handle_payment_event(&payload, &sign(&payload))
        .expect("first delivery");
    let second = h
        .service
        .handle_payment_event(&payload, &sign(&payload))
        .expect("second delivery is a no-op success");

    assert_eq!(first, EventDisposition::Accepted);
    assert_eq!(second, EventDisposition::AlreadyProcessed);
    assert_eq!(h.identity.identity_count(), 1);
    assert_eq!(h.identity.create_calls(), 1);

    let stored = h
        .store
        .get(&id)
        .expect("store reachable")
        .expect("record present");
    assert_eq!(stored.state, ApplicationState::PaymentComplete);
}

#[test]
fn replay_with_fresh_event_id_still_converges() {
    let h = harness();
    let (id, _token) = approved_application(&h, "nora@northernsignal.ca");

    let payload = checkout_completed_payload("evt_001", &id, "pw-material");
    h.service
        .handle_payment_event(&payload, &sign(&payload))
        .expect("first delivery");

    // Same session, different event id: the ledger misses, but the
    // payment_complete guard still makes it a no-op.
    let replay = checkout_completed_payload("evt_002", &id, "pw-material");
    let disposition = h
        .service
        .handle_payment_event(&replay, &sign(&replay))
        .expect("replay is a no-op success");
    assert_eq!(disposition, EventDisposition::AlreadyProcessed);
    assert_eq!(h.identity.identity_count(), 1);
}

#[test]
fn forged_signature_is_rejected_without_side_effects() {
    let h = harness();
    let (id, _token) = approved_application(&h, "nora@northernsignal.ca");
    let payload = checkout_completed_payload("evt_001", &id, "pw-material");

    let forged =
        crate::onboarding::events::SignatureVerifier::sign("whsec_wrong", &payload, Utc::now().timestamp());
    match h.service.handle_payment_event(&payload, &forged) {
        Err(OnboardingError::InvalidSignature) => {}
        other => panic!("expected invalid signature, got {other:?}"),
    }

    assert_eq!(h.identity.identity_count(), 0);
    let stored = h
        .store
        .get(&id)
        .expect("store reachable")
        .expect("record present");
    assert_eq!(stored.state, ApplicationState::Approved);
}

#[test]
fn provisioning_failure_leaves_application_retryable() {
    let h = harness();
    let (id, token) = approved_application(&h, "nora@northernsignal.ca");
    let payload = checkout_completed_payload("evt_001", &id, "pw-material");

    h.identity.fail_activation.store(true, Ordering::Relaxed);
    match h.service.handle_payment_event(&payload, &sign(&payload)) {
        Err(OnboardingError::ProvisioningConflict(_)) => {}
        other => panic!("expected provisioning conflict, got {other:?}"),
    }

    // Still approved, token still live, so the provider's retry can win.
    let stored = h
        .store
        .get(&id)
        .expect("store reachable")
        .expect("record present");
    assert_eq!(stored.state, ApplicationState::Approved);
    h.service
        .payment_context(&id, &token)
        .expect("token still valid after failed provisioning");

    h.identity.fail_activation.store(false, Ordering::Relaxed);
    let disposition = h
        .service
        .handle_payment_event(&payload, &sign(&payload))
        .expect("redelivery succeeds");
    assert_eq!(disposition, EventDisposition::Accepted);
    assert_eq!(h.identity.identity_count(), 1, "no duplicate identity");

    let stored = h
        .store
        .get(&id)
        .expect("store reachable")
        .expect("record present");
    assert_eq!(stored.state, ApplicationState::PaymentComplete);
}

#[test]
fn subscription_events_touch_only_the_profile() {
    let h = harness();
    let (id, _token) = approved_application(&h, "nora@northernsignal.ca");
    let payload = checkout_completed_payload("evt_001", &id, "pw-material");
    h.service
        .handle_payment_event(&payload, &sign(&payload))
        .expect("provisioning succeeds");

    let cancel = subscription_payload("evt_002", "sub_test_001", "canceled");
    let disposition = h
        .service
        .handle_payment_event(&cancel, &sign(&cancel))
        .expect("cancellation processes");
    assert_eq!(disposition, EventDisposition::Accepted);

    let attrs = h
        .identity
        .profile_by_subscription("sub_test_001")
        .expect("profile present");
    assert_eq!(attrs.subscription_status, SubscriptionStatus::Cancelled);

    // Application state stays terminal and untouched.
    let stored = h
        .store
        .get(&id)
        .expect("store reachable")
        .expect("record present");
    assert_eq!(stored.state, ApplicationState::PaymentComplete);

    let reactivate = subscription_payload("evt_003", "sub_test_001", "active");
    h.service
        .handle_payment_event(&reactivate, &sign(&reactivate))
        .expect("reactivation processes");
    let attrs = h
        .identity
        .profile_by_subscription("sub_test_001")
        .expect("profile present");
    assert_eq!(attrs.subscription_status, SubscriptionStatus::Active);
}

#[test]
fn unknown_event_types_are_ignored() {
    let h = harness();
    let payload = br#"{"id":"evt_900","type":"invoice.paid","data":{"object":{}}}"#.to_vec();
    let disposition = h
        .service
        .handle_payment_event(&payload, &sign(&payload))
        .expect("unknown type is accepted as a no-op");
    assert_eq!(disposition, EventDisposition::Ignored);
}

#[test]
fn completion_without_metadata_is_ignored() {
    let h = harness();
    let payload =
        br#"{"id":"evt_901","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#
            .to_vec();
    let disposition = h
        .service
        .handle_payment_event(&payload, &sign(&payload))
        .expect("metadata-less session is skipped");
    assert_eq!(disposition, EventDisposition::Ignored);
}

#[test]
fn completion_for_unknown_application_reports_failure() {
    let h = harness();
    let missing = crate::onboarding::domain::ApplicationId("app-654321".to_string());
    let payload = checkout_completed_payload("evt_902", &missing, "pw");
    assert!(h
        .service
        .handle_payment_event(&payload, &sign(&payload))
        .is_err());
}
