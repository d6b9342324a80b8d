use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::checkout::PaymentGateway;
use super::domain::{ApplicationId, ApplicantProfile, Decision};
use super::identity::IdentityProvider;
use super::notify::{ConfirmationMailer, NotificationSink};
use super::service::{OnboardingError, OnboardingService};
use super::store::{ApplicationStore, ProcessedEventLedger};

/// Request body for the staff decision endpoint.
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request body for resolving a payment link.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub application_id: String,
    pub token: String,
}

/// Request body for opening a hosted checkout session.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub application_id: String,
    pub token: String,
    pub password: String,
}

/// Router builder exposing the onboarding lifecycle endpoints.
pub fn onboarding_router<S, L, N, C, I, G>(
    service: Arc<OnboardingService<S, L, N, C, I, G>>,
) -> Router
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    C: ConfirmationMailer + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            post(submit_handler::<S, L, N, C, I, G>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(get_handler::<S, L, N, C, I, G>),
        )
        .route(
            "/api/v1/applications/:application_id/decision",
            post(decision_handler::<S, L, N, C, I, G>),
        )
        .route(
            "/api/v1/payment/validate",
            post(validate_handler::<S, L, N, C, I, G>),
        )
        .route(
            "/api/v1/payment/checkout",
            post(checkout_handler::<S, L, N, C, I, G>),
        )
        .route(
            "/api/v1/payment/webhook",
            post(webhook_handler::<S, L, N, C, I, G>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<S, L, N, C, I, G>(
    State(service): State<Arc<OnboardingService<S, L, N, C, I, G>>>,
    axum::Json(profile): axum::Json<ApplicantProfile>,
) -> Response
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    C: ConfirmationMailer + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
{
    match service.submit(profile) {
        Ok(application) => {
            (StatusCode::CREATED, axum::Json(application.summary())).into_response()
        }
        Err(OnboardingError::Validation(message)) => {
            let payload = json!({ "error": message });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(OnboardingError::DuplicateActive) => {
            let payload = json!({
                "error": "an application with this email already exists",
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn get_handler<S, L, N, C, I, G>(
    State(service): State<Arc<OnboardingService<S, L, N, C, I, G>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    C: ConfirmationMailer + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
{
    let id = ApplicationId(application_id);
    match service.get(&id) {
        // Staff review needs the full record, not the applicant summary.
        Ok(application) => (StatusCode::OK, axum::Json(application.detail())).into_response(),
        Err(OnboardingError::NotFound) => {
            let payload = json!({ "error": "application not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn decision_handler<S, L, N, C, I, G>(
    State(service): State<Arc<OnboardingService<S, L, N, C, I, G>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<DecisionRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    C: ConfirmationMailer + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
{
    let id = ApplicationId(application_id);
    match service.decide(&id, request.decision, request.notes) {
        Ok(application) => (StatusCode::OK, axum::Json(application.summary())).into_response(),
        Err(OnboardingError::NotFound) => {
            let payload = json!({ "error": "application not found" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(OnboardingError::InvalidTransition { .. }) => {
            let payload = json!({ "error": "application already decided" });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn validate_handler<S, L, N, C, I, G>(
    State(service): State<Arc<OnboardingService<S, L, N, C, I, G>>>,
    axum::Json(request): axum::Json<ValidateRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    C: ConfirmationMailer + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
{
    let id = ApplicationId(request.application_id);
    match service.payment_context(&id, &request.token) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        // One generic message regardless of which check failed.
        Err(OnboardingError::Token(_)) => {
            let payload = json!({ "error": "invalid or expired payment link" });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn checkout_handler<S, L, N, C, I, G>(
    State(service): State<Arc<OnboardingService<S, L, N, C, I, G>>>,
    axum::Json(request): axum::Json<CheckoutRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    C: ConfirmationMailer + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
{
    let id = ApplicationId(request.application_id);
    match service.start_checkout(&id, &request.token, &request.password) {
        Ok(handle) => (StatusCode::OK, axum::Json(handle)).into_response(),
        Err(OnboardingError::InvalidApplication) => {
            let payload = json!({ "error": "invalid application" });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(OnboardingError::Gateway(err)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn webhook_handler<S, L, N, C, I, G>(
    State(service): State<Arc<OnboardingService<S, L, N, C, I, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: ApplicationStore + 'static,
    L: ProcessedEventLedger + 'static,
    N: NotificationSink + 'static,
    C: ConfirmationMailer + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
{
    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
    else {
        let payload = json!({ "error": "missing signature header" });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    };

    match service.handle_payment_event(&body, signature) {
        Ok(disposition) => {
            let payload = json!({ "received": true, "disposition": disposition });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(OnboardingError::InvalidSignature) => {
            let payload = json!({ "error": "invalid signature" });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        // Anything after signature verification is reported as a
        // failure so the provider redelivers.
        Err(other) => internal_error(other),
    }
}

fn internal_error(err: OnboardingError) -> Response {
    let payload = json!({ "error": err.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
