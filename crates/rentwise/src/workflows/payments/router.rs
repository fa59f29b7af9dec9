use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{error, warn};

use super::domain::{InitializePayment, TransactionRef};
use super::gateway::PaymentGateway;
use super::reconciler::{PaymentError, PaymentReconciler, VerificationError};
use super::repository::PaymentRepository;
use super::webhook::{WebhookEvent, SIGNATURE_HEADER};
use crate::access::Authenticated;
use crate::repository::RepositoryError;

/// Router builder exposing checkout, verification, refund and the gateway webhook.
pub fn payment_router<R, G>(reconciler: Arc<PaymentReconciler<R, G>>) -> Router
where
    R: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
{
    Router::new()
        .route("/api/v1/payments/initialize", post(initialize_handler::<R, G>))
        .route("/api/v1/payments/verify/:tx_ref", post(verify_handler::<R, G>))
        .route("/api/v1/payments/:tx_ref/refund", post(refund_handler::<R, G>))
        .route("/api/v1/payments/webhook", post(webhook_handler::<R, G>))
        .with_state(reconciler)
}

pub(crate) async fn initialize_handler<R, G>(
    State(reconciler): State<Arc<PaymentReconciler<R, G>>>,
    Authenticated(actor): Authenticated,
    Json(request): Json<InitializePayment>,
) -> Response
where
    R: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
{
    match reconciler.initialize(&actor, request).await {
        Ok(intent) => (StatusCode::CREATED, Json(intent)).into_response(),
        Err(err) => payment_error(err),
    }
}

pub(crate) async fn verify_handler<R, G>(
    State(reconciler): State<Arc<PaymentReconciler<R, G>>>,
    Authenticated(actor): Authenticated,
    Path(tx_ref): Path<String>,
) -> Response
where
    R: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
{
    match reconciler.verify_as(&actor, &TransactionRef(tx_ref)).await {
        Ok(payment) => (StatusCode::OK, Json(payment)).into_response(),
        Err(err) => {
            let status = match &err {
                VerificationError::NotFound(_) => StatusCode::NOT_FOUND,
                VerificationError::Forbidden => StatusCode::FORBIDDEN,
                VerificationError::Gateway(_) => StatusCode::BAD_GATEWAY,
                VerificationError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if status.is_server_error() {
                error!(error = %err, "payment verification failed");
            }
            (status, Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}

pub(crate) async fn refund_handler<R, G>(
    State(reconciler): State<Arc<PaymentReconciler<R, G>>>,
    Authenticated(actor): Authenticated,
    Path(tx_ref): Path<String>,
) -> Response
where
    R: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
{
    match reconciler.refund(&actor, &TransactionRef(tx_ref)) {
        Ok(payment) => (StatusCode::OK, Json(payment)).into_response(),
        Err(err) => payment_error(err),
    }
}

pub(crate) async fn webhook_handler<R, G>(
    State(reconciler): State<Arc<PaymentReconciler<R, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    R: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if !reconciler.authenticate_webhook(&body, signature) {
        warn!("webhook signature rejected");
        let payload = json!({ "error": "invalid signature" });
        return (StatusCode::UNAUTHORIZED, Json(payload)).into_response();
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "unparsable webhook body");
            let payload = json!({ "error": "invalid webhook payload" });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };

    match reconciler.handle_webhook(event) {
        Ok(outcome) => {
            let payload = json!({ "received": true, "outcome": outcome });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => {
            error!(error = %err, "webhook could not be stored");
            let payload = json!({ "error": "temporarily unavailable" });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
    }
}

fn payment_error(err: PaymentError) -> Response {
    let status = match &err {
        PaymentError::InvalidAmount => StatusCode::UNPROCESSABLE_ENTITY,
        PaymentError::IdentityNotVerified | PaymentError::Forbidden(_) => StatusCode::FORBIDDEN,
        PaymentError::RentalNotFound(_)
        | PaymentError::NotFound(_)
        | PaymentError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        PaymentError::NotPayable { .. }
        | PaymentError::NotRefundable { .. }
        | PaymentError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        PaymentError::Gateway(_) => StatusCode::BAD_GATEWAY,
        PaymentError::Rental(_) | PaymentError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!(error = %err, "payment request failed");
    }

    let message = match &err {
        PaymentError::Gateway(_) => "payment provider unavailable, try again".to_string(),
        other => other.to_string(),
    };
    (status, Json(json!({ "error": message }))).into_response()
}
