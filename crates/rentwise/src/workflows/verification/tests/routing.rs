use super::common::*;
use crate::access::{AccessGate, Actor, Role};
use crate::workflows::verification::verification_router;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::{Extension, Router};
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;

fn router(harness: &Harness) -> Router {
    harness
        .tokens
        .grant("tenant-token", Actor::new("tenant-1", Role::Tenant));
    verification_router(harness.service.clone())
        .layer(Extension(AccessGate::new(harness.tokens.clone())))
}

async fn read_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

fn authorize_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get("/api/v1/identity/authorize");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

fn callback_request(body: Value) -> Request<Body> {
    Request::post("/api/v1/identity/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("json")))
        .expect("request")
}

#[tokio::test]
async fn authorize_requires_a_bearer_token() {
    let harness = harness();
    let response = router(&harness)
        .oneshot(authorize_request(None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router(&harness)
        .oneshot(authorize_request(Some("nope")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authorize_then_callback_round_trip() {
    let harness = harness();
    let app = router(&harness);

    let response = app
        .clone()
        .oneshot(authorize_request(Some("tenant-token")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let url = body["authorization_url"].as_str().expect("url").to_string();
    let state = body["state"].as_str().expect("state").to_string();
    harness
        .provider
        .approve("code-1", &query_param(&url, "code_challenge"));

    let response = app
        .oneshot(callback_request(json!({ "code": "code-1", "state": state })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["user"]["identity"]["status"], "VERIFIED");
    assert!(body["session_token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn callback_maps_session_errors_to_client_errors() {
    let harness = harness();
    let app = router(&harness);

    let response = app
        .clone()
        .oneshot(callback_request(json!({ "code": "c", "state": "unknown" })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["kind"], "mismatch");

    let redirect = harness
        .service
        .authorize(&Actor::new("tenant-1", Role::Tenant))
        .expect("authorize");
    harness.clock.advance(Duration::minutes(31));
    let response = app
        .oneshot(callback_request(
            json!({ "code": "c", "state": redirect.state }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(read_json(response).await["kind"], "expired");
}

#[tokio::test]
async fn callback_reports_exchange_failures_as_bad_gateway() {
    let harness = harness();
    let redirect = harness
        .service
        .authorize(&Actor::new("tenant-1", Role::Tenant))
        .expect("authorize");

    let response = router(&harness)
        .oneshot(callback_request(
            json!({ "code": "never-issued", "state": redirect.state }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "token_exchange_failed");
    assert_eq!(body["error"], "verification failed, try again");
}

#[tokio::test]
async fn callback_rejects_blank_and_unknown_fields() {
    let harness = harness();
    let response = router(&harness)
        .oneshot(callback_request(json!({ "code": " ", "state": "s" })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router(&harness)
        .oneshot(callback_request(
            json!({ "code": "c", "state": "s", "user_id": "tenant-1" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
