use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::pkce::{random_token, PkcePair};
use crate::access::UserId;
use crate::repository::RepositoryError;

/// Sessions older than this are rejected regardless of whether they are still stored.
pub const SESSION_TTL_MINUTES: i64 = 30;

const STATE_BYTES: usize = 32;
const NONCE_BYTES: usize = 16;

/// Short-lived handshake state for one user. Holds the PKCE verifier, so it never
/// leaves the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSession {
    pub user_id: UserId,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub created_at: DateTime<Utc>,
}

impl VerificationSession {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::minutes(SESSION_TTL_MINUTES)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::minutes(SESSION_TTL_MINUTES)
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: self.state.clone(),
            nonce: self.nonce.clone(),
            code_challenge: self.code_challenge.clone(),
            expires_at: self.expires_at(),
        }
    }
}

/// Public half of a session: everything the authorization redirect needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    pub state: String,
    pub nonce: String,
    pub code_challenge: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no verification session in progress")]
    NotFound,
    #[error("state does not match the active verification session")]
    Mismatch,
    #[error("verification session expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl SessionError {
    pub const fn kind(&self) -> &'static str {
        match self {
            SessionError::NotFound => "not_found",
            SessionError::Mismatch => "mismatch",
            SessionError::Expired => "expired",
            SessionError::Store(_) => "store_unavailable",
        }
    }
}

/// Keyed storage for verification sessions, at most one per user.
pub trait SessionStore: Send + Sync {
    /// Store `session`, replacing the user's previous one. The replaced session's state
    /// token stops resolving.
    fn put(&self, session: VerificationSession) -> Result<(), RepositoryError>;
    fn get(&self, user_id: &UserId) -> Result<Option<VerificationSession>, RepositoryError>;
    fn owner_of(&self, state: &str) -> Result<Option<UserId>, RepositoryError>;
    /// Remove the user's session only if it still carries `state`.
    fn remove(&self, user_id: &UserId, state: &str) -> Result<bool, RepositoryError>;
}

#[derive(Default)]
struct SessionTable {
    by_user: HashMap<UserId, VerificationSession>,
    owners: HashMap<String, UserId>,
}

/// Process-local session store. Both indexes live behind one lock so a state token
/// never resolves to a user whose stored session carries a different token.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    table: Arc<Mutex<SessionTable>>,
}

impl InMemorySessionStore {
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .expect("session mutex poisoned")
            .by_user
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn put(&self, session: VerificationSession) -> Result<(), RepositoryError> {
        let mut table = self.table.lock().expect("session mutex poisoned");
        if let Some(previous) = table.by_user.remove(&session.user_id) {
            table.owners.remove(&previous.state);
        }
        table
            .owners
            .insert(session.state.clone(), session.user_id.clone());
        table.by_user.insert(session.user_id.clone(), session);
        Ok(())
    }

    fn get(&self, user_id: &UserId) -> Result<Option<VerificationSession>, RepositoryError> {
        let table = self.table.lock().expect("session mutex poisoned");
        Ok(table.by_user.get(user_id).cloned())
    }

    fn owner_of(&self, state: &str) -> Result<Option<UserId>, RepositoryError> {
        let table = self.table.lock().expect("session mutex poisoned");
        Ok(table.owners.get(state).cloned())
    }

    fn remove(&self, user_id: &UserId, state: &str) -> Result<bool, RepositoryError> {
        let mut table = self.table.lock().expect("session mutex poisoned");
        let matches = table
            .by_user
            .get(user_id)
            .is_some_and(|session| session.state == state);
        if matches {
            table.by_user.remove(user_id);
            table.owners.remove(state);
        }
        Ok(matches)
    }
}

/// Session lifecycle on top of a [`SessionStore`]: begin, validate, clear.
pub struct VerificationSessions<S> {
    store: Arc<S>,
}

impl<S> Clone for VerificationSessions<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> VerificationSessions<S>
where
    S: SessionStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Start a fresh session for `user_id`, superseding any session already in flight.
    /// Sessions of other users stay in place, expired or not, so a late callback still
    /// resolves to its owner.
    pub fn begin(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<SessionHandle, SessionError> {
        let pkce = PkcePair::generate();
        let session = VerificationSession {
            user_id: user_id.clone(),
            state: random_token(STATE_BYTES),
            nonce: random_token(NONCE_BYTES),
            code_verifier: pkce.verifier,
            code_challenge: pkce.challenge,
            created_at: now,
        };
        let handle = session.handle();
        self.store.put(session)?;
        Ok(handle)
    }

    /// Check that `state` belongs to the live session of `user_id`. The session stays in
    /// place so a failed token exchange can be retried against it.
    pub fn validate(
        &self,
        user_id: &UserId,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationSession, SessionError> {
        let session = self.store.get(user_id)?.ok_or(SessionError::NotFound)?;
        if !constant_time_eq(session.state.as_bytes(), state.as_bytes()) {
            return Err(SessionError::Mismatch);
        }
        if session.is_expired(now) {
            return Err(SessionError::Expired);
        }
        Ok(session)
    }

    /// Resolve a callback's state token to the user who started the session.
    pub fn owner_of(&self, state: &str) -> Result<Option<UserId>, SessionError> {
        Ok(self.store.owner_of(state)?)
    }

    pub fn clear(&self, user_id: &UserId, state: &str) -> Result<bool, SessionError> {
        Ok(self.store.remove(user_id, state)?)
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
