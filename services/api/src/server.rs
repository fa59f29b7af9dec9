use crate::cli::ServeArgs;
use crate::infra::{AppState, SeedData, TracingNotifier};
use crate::routes::{with_operational_routes, workflow_routes};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rentwise::access::{InMemoryAccessTokens, InMemoryUserDirectory};
use rentwise::clock::{Clock, SystemClock};
use rentwise::config::AppConfig;
use rentwise::error::AppError;
use rentwise::telemetry;
use rentwise::workflows::payments::{
    CheckoutSettings, HttpPaymentGateway, InMemoryPaymentRepository, PaymentReconciler,
};
use rentwise::workflows::rental::{InMemoryRentalRepository, RentalApplicationService};
use rentwise::workflows::verification::{
    AuthorizationUrlBuilder, HttpIdentityProvider, IdentityVerificationService,
    InMemorySessionStore,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = Arc::new(TracingNotifier);
    let users = Arc::new(InMemoryUserDirectory::default());
    let tokens = Arc::new(InMemoryAccessTokens::default());
    let rental_store = Arc::new(InMemoryRentalRepository::default());

    if let Some(path) = args.seed.take() {
        SeedData::from_path(&path)?.apply(&users, &*rental_store, &tokens)?;
    }

    let verification = Arc::new(IdentityVerificationService::new(
        Arc::new(InMemorySessionStore::default()),
        Arc::new(HttpIdentityProvider::new(&config.identity)?),
        AuthorizationUrlBuilder::new(&config.identity),
        users.clone(),
        tokens.clone(),
        clock.clone(),
    ));
    let rentals = Arc::new(RentalApplicationService::new(
        rental_store,
        notifier.clone(),
        clock.clone(),
    ));
    let payments = Arc::new(PaymentReconciler::new(
        Arc::new(InMemoryPaymentRepository::default()),
        Arc::new(HttpPaymentGateway::new(&config.gateway)?),
        rentals.clone(),
        users,
        notifier,
        clock,
        CheckoutSettings::from_config(&config.gateway),
    ));

    let app = with_operational_routes(workflow_routes(verification, rentals, payments, tokens))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "rentwise api ready");

    axum::serve(listener, app).await?;
    Ok(())
}
