use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryApplicationStore, InMemoryEventLedger, InMemoryIdentityProvider,
    StubPaymentGateway, TracingMailer, TracingNotificationSink,
};
use crate::routes::with_onboarding_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use meridian::config::AppConfig;
use meridian::error::AppError;
use meridian::onboarding::OnboardingService;
use meridian::telemetry;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryApplicationStore::default());
    let ledger = Arc::new(InMemoryEventLedger::default());
    let notifier = Arc::new(TracingNotificationSink::new(
        config.notify.chat_webhook_url.clone(),
    ));
    let mailer = Arc::new(TracingMailer);
    let identity = Arc::new(InMemoryIdentityProvider::default());
    let gateway = Arc::new(StubPaymentGateway::new(config.payment.base_url.clone()));
    let service = Arc::new(OnboardingService::new(
        store,
        ledger,
        notifier,
        mailer,
        identity,
        gateway,
        config.payment.clone(),
    ));

    let app = with_onboarding_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "partner onboarding service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
