use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::{IdentityProviderConfig, Secret};

/// Tokens returned by the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub id_token: Option<String>,
}

/// Identity attributes exactly as the provider returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIdentity {
    pub claims: Value,
}

impl RawIdentity {
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Failure talking to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider unreachable: {0}")]
    Transport(String),
    #[error("provider answered HTTP {status}")]
    Status { status: u16, body: String },
    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

/// The two calls of the back channel. Implementations must forward the verifier
/// untouched; verifier checks happen at the provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderTokens, ProviderError>;

    async fn fetch_userinfo(&self, access_token: &str) -> Result<Value, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

/// OpenID provider reached over HTTPS with a bounded request timeout.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client_id: String,
    client_secret: Secret,
    token_url: Url,
    userinfo_url: Url,
    redirect_uri: Url,
    http: Client,
}

impl HttpIdentityProvider {
    pub fn new(config: &IdentityProviderConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
            redirect_uri: config.redirect_uri.clone(),
            http,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderTokens, ProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: TokenEndpointResponse = response.json().await?;
        Ok(ProviderTokens {
            access_token: tokens.access_token,
            id_token: tokens.id_token,
        })
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// Surfaced to the user as "verification failed, try again". Never retried here: the
/// authorization code is single use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("authorization code exchange failed: {0}")]
    TokenExchangeFailed(ProviderError),
    #[error("identity lookup failed: {0}")]
    UserInfoFailed(ProviderError),
}

impl ExchangeError {
    pub const fn kind(&self) -> &'static str {
        match self {
            ExchangeError::TokenExchangeFailed(_) => "token_exchange_failed",
            ExchangeError::UserInfoFailed(_) => "user_info_failed",
        }
    }
}

/// Runs the code-for-token and token-for-identity calls in sequence.
pub struct TokenExchangeClient<P> {
    provider: Arc<P>,
}

impl<P> Clone for TokenExchangeClient<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P> TokenExchangeClient<P>
where
    P: IdentityProvider + 'static,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<RawIdentity, ExchangeError> {
        let tokens = self
            .provider
            .exchange_code(code, code_verifier)
            .await
            .map_err(|err| {
                warn!(error = %err, "authorization code exchange rejected");
                ExchangeError::TokenExchangeFailed(err)
            })?;

        let claims = self
            .provider
            .fetch_userinfo(&tokens.access_token)
            .await
            .map_err(|err| {
                warn!(error = %err, "userinfo request failed");
                ExchangeError::UserInfoFailed(err)
            })?;

        if !claims.is_object() {
            return Err(ExchangeError::UserInfoFailed(ProviderError::Decode(
                "userinfo is not a JSON object".to_string(),
            )));
        }

        debug!(id_token = tokens.id_token.is_some(), "identity exchange completed");
        Ok(RawIdentity { claims })
    }
}
