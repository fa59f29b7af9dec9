use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::authorize::AuthorizationUrlBuilder;
use super::exchange::{ExchangeError, IdentityProvider, ProviderError, TokenExchangeClient};
use super::identity::map_identity;
use super::session::{SessionError, SessionStore, VerificationSessions};
use crate::access::{AccessTokenStore, Actor, UserAccount, UserDirectory, UserId};
use crate::clock::Clock;
use crate::repository::RepositoryError;

/// Redirect handed to the client when a verification starts.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationRedirect {
    pub authorization_url: String,
    pub state: String,
}

/// Result of a completed handshake: the updated account and a fresh access token.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackOutcome {
    pub user: UserAccount,
    pub session_token: String,
}

/// Service composing the session store, redirect builder, exchange client and user
/// directory into the full verification handshake.
pub struct IdentityVerificationService<S, P> {
    sessions: VerificationSessions<S>,
    urls: AuthorizationUrlBuilder,
    exchange: TokenExchangeClient<P>,
    users: Arc<dyn UserDirectory>,
    tokens: Arc<dyn AccessTokenStore>,
    clock: Arc<dyn Clock>,
}

impl<S, P> IdentityVerificationService<S, P>
where
    S: SessionStore + 'static,
    P: IdentityProvider + 'static,
{
    pub fn new(
        sessions: Arc<S>,
        provider: Arc<P>,
        urls: AuthorizationUrlBuilder,
        users: Arc<dyn UserDirectory>,
        tokens: Arc<dyn AccessTokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: VerificationSessions::new(sessions),
            urls,
            exchange: TokenExchangeClient::new(provider),
            users,
            tokens,
            clock,
        }
    }

    pub fn sessions(&self) -> &VerificationSessions<S> {
        &self.sessions
    }

    /// Begin (or restart) verification for the calling user.
    pub fn authorize(
        &self,
        actor: &Actor,
    ) -> Result<AuthorizationRedirect, VerificationFlowError> {
        let handle = self.sessions.begin(&actor.user_id, self.clock.now())?;
        let url = self.urls.build(&handle);
        info!(
            user_id = %actor.user_id,
            expires_at = %handle.expires_at,
            "verification session started"
        );
        Ok(AuthorizationRedirect {
            authorization_url: url.into(),
            state: handle.state,
        })
    }

    /// Complete the handshake for the provider callback carrying `code` and `state`.
    ///
    /// The session is consumed only once the exchange succeeded, so a failed exchange
    /// can be retried against the same session. A session replaced while the exchange
    /// was in flight fails the callback with `Mismatch`.
    pub async fn callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<CallbackOutcome, VerificationFlowError> {
        let owner = self
            .sessions
            .owner_of(state)?
            .ok_or(SessionError::Mismatch)
            .inspect_err(|_| warn!("verification callback for unknown or superseded state"))?;

        let session = self
            .sessions
            .validate(&owner, state, self.clock.now())
            .inspect_err(|err| {
                warn!(user_id = %owner, error = %err, "verification session rejected")
            })?;

        let raw = self
            .exchange
            .exchange(code, &session.code_verifier)
            .await
            .inspect_err(|err| {
                warn!(user_id = %owner, kind = err.kind(), "identity exchange failed")
            })?;

        if let Some(nonce) = raw.claim("nonce") {
            if nonce != session.nonce {
                warn!(user_id = %owner, "identity response nonce does not match session");
                return Err(ExchangeError::UserInfoFailed(ProviderError::Decode(
                    "nonce mismatch".to_string(),
                ))
                .into());
            }
        }

        // The user may have restarted verification while the exchange was in flight.
        if !self.sessions.clear(&owner, state)? {
            warn!(user_id = %owner, "verification session superseded during exchange");
            return Err(SessionError::Mismatch.into());
        }

        let account = self
            .users
            .fetch(&owner)?
            .ok_or_else(|| VerificationFlowError::UnknownUser(owner.clone()))?;

        let identity = map_identity(&raw, &account, self.clock.now());
        let user = self.users.record_identity(&owner, identity)?;

        let session_token = self.tokens.issue(&user.actor())?;
        info!(user_id = %owner, "identity verified");

        Ok(CallbackOutcome {
            user,
            session_token,
        })
    }
}

/// Error raised by the verification service.
#[derive(Debug, thiserror::Error)]
pub enum VerificationFlowError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("user {0} does not exist")]
    UnknownUser(UserId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
