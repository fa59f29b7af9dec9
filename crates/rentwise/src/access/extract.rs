use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use super::accounts::Actor;
use super::tokens::AccessTokenStore;

/// Request extension carrying the token store consulted by [`Authenticated`].
#[derive(Clone)]
pub struct AccessGate {
    tokens: Arc<dyn AccessTokenStore>,
}

impl AccessGate {
    pub fn new(tokens: Arc<dyn AccessTokenStore>) -> Self {
        Self { tokens }
    }
}

/// Extractor resolving `Authorization: Bearer <token>` into the calling [`Actor`].
#[derive(Debug, Clone)]
pub struct Authenticated(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(gate) = parts.extensions.get::<AccessGate>().cloned() else {
            error!("access gate extension missing from router");
            return Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "authentication unavailable"));
        };

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "missing bearer token"))?;

        match gate.tokens.resolve(token) {
            Ok(Some(actor)) => Ok(Authenticated(actor)),
            Ok(None) => Err(reject(StatusCode::UNAUTHORIZED, "invalid bearer token")),
            Err(err) => {
                error!(error = %err, "token store lookup failed");
                Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "authentication unavailable"))
            }
        }
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}
