use std::sync::Arc;

use chrono::Utc;
use clap::Args;

use crate::infra::{
    InMemoryApplicationStore, InMemoryEventLedger, InMemoryIdentityProvider, StubPaymentGateway,
    TracingMailer, TracingNotificationSink,
};
use meridian::config::AppConfig;
use meridian::error::AppError;
use meridian::onboarding::{
    AccountType, ApplicantProfile, ApplicationStore, ContactInfo, Decision, IntakeDetails,
    OnboardingService, SignatureVerifier,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Email used for the demo application
    #[arg(long, default_value = "demo@meridian.example")]
    pub(crate) email: String,
}

fn demo_err(err: impl std::fmt::Display) -> AppError {
    AppError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        err.to_string(),
    ))
}

/// Drive the full lifecycle against in-memory adapters, printing each
/// step, including the provider webhook we sign ourselves.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = Arc::new(InMemoryApplicationStore::default());
    let service = Arc::new(OnboardingService::new(
        store.clone(),
        Arc::new(InMemoryEventLedger::default()),
        Arc::new(TracingNotificationSink::new(
            config.notify.chat_webhook_url.clone(),
        )),
        Arc::new(TracingMailer),
        Arc::new(InMemoryIdentityProvider::default()),
        Arc::new(StubPaymentGateway::new(config.payment.base_url.clone())),
        config.payment.clone(),
    ));

    let profile = ApplicantProfile {
        account_type: AccountType::Artist,
        contact: ContactInfo {
            email: args.email.clone(),
            first_name: "Demo".to_string(),
            last_name: "Applicant".to_string(),
            phone: None,
        },
        entity_name: "Demo Signal".to_string(),
        country: Some("US".to_string()),
        intake: IntakeDetails {
            motivation: "Exploring the onboarding flow end to end.".to_string(),
            ..Default::default()
        },
    };

    let application = service.submit(profile).map_err(demo_err)?;
    println!(
        "submitted application {} ({})",
        application.id.0,
        application.state.label()
    );

    let approved = service
        .decide(
            &application.id,
            Decision::Approve,
            Some("demo approval".to_string()),
        )
        .map_err(demo_err)?;
    println!("approved -> state {}", approved.state.label());

    let token = store
        .get(&application.id)
        .map_err(demo_err)?
        .and_then(|record| record.payment_link_token)
        .ok_or_else(|| demo_err("approved application carries no token"))?;
    println!(
        "payment link: {}",
        config.payment.payment_url(&application.id.0, &token.0)
    );

    let summary = service
        .payment_context(&application.id, &token.0)
        .map_err(demo_err)?;
    println!("payment page resolves for {}", summary.entity_name);

    let handle = service
        .start_checkout(&application.id, &token.0, "demo-password")
        .map_err(demo_err)?;
    println!("checkout session {} at {}", handle.session_id, handle.url);

    let payload = serde_json::json!({
        "id": "evt_demo_001",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": handle.session_id,
                "customer": "cus_demo_001",
                "subscription": "sub_demo_001",
                "metadata": {
                    "application_id": application.id.0,
                    "account_type": "artist",
                    "entity_name": "Demo Signal",
                    "account_secret": "demo-password",
                },
            },
        },
    })
    .to_string()
    .into_bytes();
    let signature = SignatureVerifier::sign(
        &config.payment.webhook_secret,
        &payload,
        Utc::now().timestamp(),
    );

    let disposition = service
        .handle_payment_event(&payload, &signature)
        .map_err(demo_err)?;
    println!("webhook processed: {disposition:?}");

    let finalized = store
        .get(&application.id)
        .map_err(demo_err)?
        .ok_or_else(|| demo_err("application disappeared"))?;
    println!(
        "final state {} with profile {:?}",
        finalized.state.label(),
        finalized.profile_id.map(|p| p.0)
    );

    Ok(())
}
