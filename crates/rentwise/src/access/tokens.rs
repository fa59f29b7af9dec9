use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use super::accounts::Actor;
use crate::repository::RepositoryError;

const TOKEN_BYTES: usize = 32;

/// Opaque bearer tokens handed out after a successful verification handshake.
pub trait AccessTokenStore: Send + Sync {
    fn issue(&self, actor: &Actor) -> Result<String, RepositoryError>;
    fn resolve(&self, token: &str) -> Result<Option<Actor>, RepositoryError>;
}

#[derive(Default, Clone)]
pub struct InMemoryAccessTokens {
    tokens: Arc<Mutex<HashMap<String, Actor>>>,
}

impl InMemoryAccessTokens {
    /// Register a token minted elsewhere, e.g. from seed data.
    pub fn grant(&self, token: impl Into<String>, actor: Actor) {
        self.tokens
            .lock()
            .expect("token mutex poisoned")
            .insert(token.into(), actor);
    }
}

impl AccessTokenStore for InMemoryAccessTokens {
    fn issue(&self, actor: &Actor) -> Result<String, RepositoryError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        self.tokens
            .lock()
            .expect("token mutex poisoned")
            .insert(token.clone(), actor.clone());
        Ok(token)
    }

    fn resolve(&self, token: &str) -> Result<Option<Actor>, RepositoryError> {
        let guard = self.tokens.lock().expect("token mutex poisoned");
        Ok(guard.get(token).cloned())
    }
}
