use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::exchange::IdentityProvider;
use super::service::{IdentityVerificationService, VerificationFlowError};
use super::session::{SessionError, SessionStore};
use crate::access::Authenticated;

/// Body posted by the client once the provider redirected back.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackRequest {
    pub code: String,
    pub state: String,
}

/// Router builder exposing the authorize and callback endpoints.
pub fn verification_router<S, P>(service: Arc<IdentityVerificationService<S, P>>) -> Router
where
    S: SessionStore + 'static,
    P: IdentityProvider + 'static,
{
    Router::new()
        .route(
            "/api/v1/identity/authorize",
            get(authorize_handler::<S, P>),
        )
        .route("/api/v1/identity/callback", post(callback_handler::<S, P>))
        .with_state(service)
}

pub(crate) async fn authorize_handler<S, P>(
    State(service): State<Arc<IdentityVerificationService<S, P>>>,
    Authenticated(actor): Authenticated,
) -> Response
where
    S: SessionStore + 'static,
    P: IdentityProvider + 'static,
{
    match service.authorize(&actor) {
        Ok(redirect) => (StatusCode::OK, Json(redirect)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn callback_handler<S, P>(
    State(service): State<Arc<IdentityVerificationService<S, P>>>,
    Json(request): Json<CallbackRequest>,
) -> Response
where
    S: SessionStore + 'static,
    P: IdentityProvider + 'static,
{
    if request.code.trim().is_empty() || request.state.trim().is_empty() {
        let payload = json!({ "error": "code and state are required" });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
    }

    match service.callback(&request.code, &request.state).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: VerificationFlowError) -> Response {
    let (status, kind) = match &err {
        VerificationFlowError::Session(SessionError::Store(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable")
        }
        VerificationFlowError::Session(session) => {
            let status = match session {
                SessionError::NotFound => StatusCode::NOT_FOUND,
                SessionError::Expired => StatusCode::GONE,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, session.kind())
        }
        VerificationFlowError::Exchange(exchange) => (StatusCode::BAD_GATEWAY, exchange.kind()),
        VerificationFlowError::UnknownUser(_) => (StatusCode::NOT_FOUND, "unknown_user"),
        VerificationFlowError::Repository(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable")
        }
    };

    if status.is_server_error() {
        error!(error = %err, "verification request failed");
    }

    let message = match &err {
        VerificationFlowError::Exchange(_) => "verification failed, try again".to_string(),
        other => other.to_string(),
    };
    let payload = json!({ "error": message, "kind": kind });
    (status, Json(payload)).into_response()
}
