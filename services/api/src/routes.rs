use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use rentwise::access::{AccessGate, AccessTokenStore};
use rentwise::notify::Notifier;
use rentwise::workflows::payments::{
    payment_router, PaymentGateway, PaymentReconciler, PaymentRepository,
};
use rentwise::workflows::rental::{rental_router, RentalApplicationService, RentalRepository};
use rentwise::workflows::verification::{
    verification_router, IdentityProvider, IdentityVerificationService, SessionStore,
};
use serde_json::json;
use std::sync::Arc;

/// The three workflow routers behind one access gate.
pub(crate) fn workflow_routes<S, P, R, N, Q, G>(
    verification: Arc<IdentityVerificationService<S, P>>,
    rentals: Arc<RentalApplicationService<R, N>>,
    payments: Arc<PaymentReconciler<Q, G>>,
    tokens: Arc<dyn AccessTokenStore>,
) -> Router
where
    S: SessionStore + 'static,
    P: IdentityProvider + 'static,
    R: RentalRepository + 'static,
    N: Notifier + 'static,
    Q: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
{
    verification_router(verification)
        .merge(rental_router(rentals))
        .merge(payment_router(payments))
        .layer(Extension(AccessGate::new(tokens)))
}

pub(crate) fn with_operational_routes(router: Router) -> Router {
    router
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
