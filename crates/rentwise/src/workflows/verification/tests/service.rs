use super::common::*;
use crate::access::{AccessTokenStore, Actor, Role, UserDirectory, UserId};
use crate::workflows::verification::{
    ExchangeError, KycStatus, SessionError, SessionStore, VerificationFlowError,
    VerificationSessions,
};
use chrono::Duration;
use serde_json::json;

fn actor() -> Actor {
    Actor::new("tenant-1", Role::Tenant)
}

#[tokio::test]
async fn completes_the_handshake_and_records_the_identity() {
    let harness = harness();
    let redirect = harness.service.authorize(&actor()).expect("authorize");
    let challenge = query_param(&redirect.authorization_url, "code_challenge");
    assert_eq!(query_param(&redirect.authorization_url, "state"), redirect.state);
    harness.provider.approve("code-1", &challenge);

    harness.clock.advance(Duration::minutes(5));
    let outcome = harness
        .service
        .callback("code-1", &redirect.state)
        .await
        .expect("callback succeeds");

    let identity = outcome.user.identity.clone().expect("identity stored");
    assert_eq!(identity.status, KycStatus::Verified);
    assert_eq!(identity.external_id.as_deref(), Some("ext-4827"));
    assert_eq!(identity.verified_at, start() + Duration::minutes(5));
    assert_eq!(outcome.user.display_name.as_deref(), Some("Abebe Kebede"));

    let stored = harness
        .users
        .fetch(&tenant_id())
        .expect("directory readable")
        .expect("user present");
    assert!(stored.is_verified());

    assert_eq!(
        harness.tokens.resolve(&outcome.session_token).expect("resolve"),
        Some(actor())
    );
    assert!(harness.sessions.is_empty(), "session cleared after success");
}

#[tokio::test]
async fn verifier_reaches_the_provider_unchanged() {
    let harness = harness();
    let redirect = harness.service.authorize(&actor()).expect("authorize");
    let stored = harness
        .sessions
        .get(&tenant_id())
        .expect("readable")
        .expect("session");
    harness
        .provider
        .approve("code-1", &query_param(&redirect.authorization_url, "code_challenge"));

    harness
        .service
        .callback("code-1", &redirect.state)
        .await
        .expect("callback succeeds");

    let received = harness.provider.received_verifiers.lock().expect("stub").clone();
    assert_eq!(received, vec![stored.code_verifier]);
}

#[tokio::test]
async fn tampered_verifier_fails_token_exchange() {
    let harness = harness();
    let redirect = harness.service.authorize(&actor()).expect("authorize");
    // The provider saw a different challenge than the one bound to our verifier.
    harness.provider.approve("code-1", "tampered-challenge");

    let result = harness.service.callback("code-1", &redirect.state).await;
    assert!(matches!(
        result,
        Err(VerificationFlowError::Exchange(
            ExchangeError::TokenExchangeFailed(_)
        ))
    ));
    assert_eq!(harness.provider.userinfo_calls(), 0);
    assert!(!harness.sessions.is_empty(), "session kept for a retry");
    let user = harness.users.fetch(&tenant_id()).expect("ok").expect("user");
    assert!(user.identity.is_none());
}

#[tokio::test]
async fn failed_exchange_can_be_retried_with_the_same_session() {
    let harness = harness_with(StubProvider::default());
    let redirect = harness.service.authorize(&actor()).expect("authorize");
    let challenge = query_param(&redirect.authorization_url, "code_challenge");
    harness.provider.approve("code-1", &challenge);

    let first = harness.service.callback("code-1", &redirect.state).await;
    assert!(matches!(
        first,
        Err(VerificationFlowError::Exchange(ExchangeError::UserInfoFailed(_)))
    ));

    *harness.provider.userinfo.lock().expect("stub") = Some(verified_claims());
    harness.provider.approve("code-2", &challenge);
    harness
        .service
        .callback("code-2", &redirect.state)
        .await
        .expect("retry with a fresh code succeeds");
}

#[tokio::test]
async fn expired_session_leaves_identity_untouched() {
    let harness = harness();
    let redirect = harness.service.authorize(&actor()).expect("authorize");
    harness
        .provider
        .approve("code-1", &query_param(&redirect.authorization_url, "code_challenge"));

    harness.clock.advance(Duration::minutes(31));
    let result = harness.service.callback("code-1", &redirect.state).await;

    assert!(matches!(
        result,
        Err(VerificationFlowError::Session(SessionError::Expired))
    ));
    assert!(harness.provider.received_verifiers.lock().expect("stub").is_empty());
    let user = harness.users.fetch(&tenant_id()).expect("ok").expect("user");
    assert!(user.identity.is_none());
}

#[tokio::test]
async fn expiry_is_reported_after_another_user_begins() {
    let harness = harness();
    let redirect = harness.service.authorize(&actor()).expect("authorize");
    harness
        .provider
        .approve("code-1", &query_param(&redirect.authorization_url, "code_challenge"));

    harness.clock.advance(Duration::minutes(31));
    harness
        .service
        .authorize(&Actor::new("tenant-2", Role::Tenant))
        .expect("other user starts");
    let result = harness.service.callback("code-1", &redirect.state).await;

    assert!(matches!(
        result,
        Err(VerificationFlowError::Session(SessionError::Expired))
    ));
    let user = harness.users.fetch(&tenant_id()).expect("ok").expect("user");
    assert!(user.identity.is_none());
}

#[tokio::test]
async fn restart_during_exchange_rejects_the_in_flight_callback() {
    let harness = harness();
    let redirect = harness.service.authorize(&actor()).expect("authorize");
    harness
        .provider
        .approve("code-1", &query_param(&redirect.authorization_url, "code_challenge"));
    let restart = VerificationSessions::new(harness.sessions.clone());
    harness.provider.before_exchange(move || {
        restart.begin(&tenant_id(), start()).expect("restart");
    });

    let result = harness.service.callback("code-1", &redirect.state).await;

    assert!(matches!(
        result,
        Err(VerificationFlowError::Session(SessionError::Mismatch))
    ));
    let user = harness.users.fetch(&tenant_id()).expect("ok").expect("user");
    assert!(user.identity.is_none());
    let live = harness
        .sessions
        .get(&tenant_id())
        .expect("readable")
        .expect("restarted session kept");
    assert_ne!(live.state, redirect.state);
}

#[tokio::test]
async fn superseded_session_callback_is_rejected() {
    let harness = harness();
    let first = harness.service.authorize(&actor()).expect("authorize");
    harness
        .provider
        .approve("code-1", &query_param(&first.authorization_url, "code_challenge"));
    let _second = harness.service.authorize(&actor()).expect("restart");

    let result = harness.service.callback("code-1", &first.state).await;
    assert!(matches!(
        result,
        Err(VerificationFlowError::Session(SessionError::Mismatch))
    ));
}

#[tokio::test]
async fn nonce_mismatch_is_treated_as_failed_identity_lookup() {
    let mut claims = verified_claims();
    claims["nonce"] = json!("someone-elses-nonce");
    let harness = harness_with(StubProvider::with_claims(claims));
    let redirect = harness.service.authorize(&actor()).expect("authorize");
    harness
        .provider
        .approve("code-1", &query_param(&redirect.authorization_url, "code_challenge"));

    let result = harness.service.callback("code-1", &redirect.state).await;
    assert!(matches!(
        result,
        Err(VerificationFlowError::Exchange(ExchangeError::UserInfoFailed(_)))
    ));
}

#[tokio::test]
async fn unknown_user_is_reported() {
    let harness = harness();
    let ghost = Actor::new("ghost", Role::Tenant);
    let redirect = harness.service.authorize(&ghost).expect("authorize");
    harness
        .provider
        .approve("code-1", &query_param(&redirect.authorization_url, "code_challenge"));

    match harness.service.callback("code-1", &redirect.state).await {
        Err(VerificationFlowError::UnknownUser(id)) => {
            assert_eq!(id, UserId("ghost".to_string()))
        }
        other => panic!("expected unknown user, got {other:?}"),
    }
}
