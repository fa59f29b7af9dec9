use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use url::Url;

use crate::access::{InMemoryAccessTokens, InMemoryUserDirectory, Role, UserAccount, UserId};
use crate::clock::ManualClock;
use crate::config::{IdentityProviderConfig, Secret};
use crate::workflows::verification::exchange::{IdentityProvider, ProviderError, ProviderTokens};
use crate::workflows::verification::pkce::s256_challenge;
use crate::workflows::verification::{
    AuthorizationUrlBuilder, IdentityVerificationService, InMemorySessionStore,
};

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap()
}

pub(super) fn provider_config() -> IdentityProviderConfig {
    IdentityProviderConfig {
        client_id: "rentwise".to_string(),
        client_secret: Secret::new("idp-secret"),
        authorize_url: Url::parse("https://id.example.test/authorize").expect("valid url"),
        token_url: Url::parse("https://id.example.test/token").expect("valid url"),
        userinfo_url: Url::parse("https://id.example.test/userinfo").expect("valid url"),
        redirect_uri: Url::parse("https://rentwise.test/verify/callback").expect("valid url"),
        scopes: vec!["openid".to_string(), "profile".to_string(), "phone".to_string()],
        acr_values: None,
        timeout: Duration::from_secs(5),
    }
}

pub(super) fn tenant_id() -> UserId {
    UserId("tenant-1".to_string())
}

pub(super) fn tenant() -> UserAccount {
    UserAccount {
        id: tenant_id(),
        role: Role::Tenant,
        display_name: Some("Abebe K.".to_string()),
        phone: Some("+251911000000".to_string()),
        identity: None,
    }
}

pub(super) fn verified_claims() -> Value {
    json!({
        "sub": "ext-4827",
        "name": "Abebe Kebede",
        "phone_number": "+251911223344",
    })
}

/// Provider double that enforces PKCE and single-use codes the way a real provider does.
#[derive(Default)]
pub(super) struct StubProvider {
    challenges: Mutex<HashMap<String, String>>,
    consumed: Mutex<HashSet<String>>,
    pub(super) received_verifiers: Mutex<Vec<String>>,
    pub(super) userinfo: Mutex<Option<Value>>,
    pub(super) userinfo_calls: Mutex<u32>,
    before_exchange: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl StubProvider {
    pub(super) fn with_claims(claims: Value) -> Self {
        let provider = Self::default();
        *provider.userinfo.lock().expect("stub mutex") = Some(claims);
        provider
    }

    /// Simulate the user approving the request: the provider binds `code` to the
    /// challenge it saw on the authorization redirect.
    pub(super) fn approve(&self, code: &str, code_challenge: &str) {
        self.challenges
            .lock()
            .expect("stub mutex")
            .insert(code.to_string(), code_challenge.to_string());
    }

    /// Run `hook` inside the next token exchange, while the callback is awaiting it.
    pub(super) fn before_exchange(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.before_exchange.lock().expect("stub mutex") = Some(Box::new(hook));
    }

    pub(super) fn userinfo_calls(&self) -> u32 {
        *self.userinfo_calls.lock().expect("stub mutex")
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderTokens, ProviderError> {
        self.received_verifiers
            .lock()
            .expect("stub mutex")
            .push(code_verifier.to_string());
        if let Some(hook) = self.before_exchange.lock().expect("stub mutex").take() {
            hook();
        }

        if !self.consumed.lock().expect("stub mutex").insert(code.to_string()) {
            return Err(invalid_grant("code already used"));
        }
        let challenge = self
            .challenges
            .lock()
            .expect("stub mutex")
            .get(code)
            .cloned()
            .ok_or_else(|| invalid_grant("unknown code"))?;
        if s256_challenge(code_verifier) != challenge {
            return Err(invalid_grant("code_verifier mismatch"));
        }

        Ok(ProviderTokens {
            access_token: format!("at-{code}"),
            id_token: None,
        })
    }

    async fn fetch_userinfo(&self, _access_token: &str) -> Result<Value, ProviderError> {
        *self.userinfo_calls.lock().expect("stub mutex") += 1;
        self.userinfo
            .lock()
            .expect("stub mutex")
            .clone()
            .ok_or(ProviderError::Status {
                status: 503,
                body: "userinfo unavailable".to_string(),
            })
    }
}

fn invalid_grant(reason: &str) -> ProviderError {
    ProviderError::Status {
        status: 400,
        body: format!("{{\"error\":\"invalid_grant\",\"error_description\":\"{reason}\"}}"),
    }
}

pub(super) type StubService = IdentityVerificationService<InMemorySessionStore, StubProvider>;

pub(super) struct Harness {
    pub(super) service: Arc<StubService>,
    pub(super) sessions: Arc<InMemorySessionStore>,
    pub(super) provider: Arc<StubProvider>,
    pub(super) users: Arc<InMemoryUserDirectory>,
    pub(super) tokens: Arc<InMemoryAccessTokens>,
    pub(super) clock: ManualClock,
}

pub(super) fn harness_with(provider: StubProvider) -> Harness {
    let sessions = Arc::new(InMemorySessionStore::default());
    let provider = Arc::new(provider);
    let users = Arc::new(InMemoryUserDirectory::default());
    users.insert(tenant());
    let tokens = Arc::new(InMemoryAccessTokens::default());
    let clock = ManualClock::new(start());

    let service = Arc::new(IdentityVerificationService::new(
        sessions.clone(),
        provider.clone(),
        AuthorizationUrlBuilder::new(&provider_config()),
        users.clone(),
        tokens.clone(),
        Arc::new(clock.clone()),
    ));

    Harness {
        service,
        sessions,
        provider,
        users,
        tokens,
        clock,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(StubProvider::with_claims(verified_claims()))
}

pub(super) fn query_param(url: &str, name: &str) -> String {
    Url::parse(url)
        .expect("valid url")
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| panic!("missing query parameter {name}"))
}
