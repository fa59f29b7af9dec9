//! Three-legged identity verification against an external OpenID provider.
//!
//! A verification begins with a per-user session holding the state token, nonce and PKCE
//! verifier. The provider redirects back with an authorization code which is exchanged,
//! together with the stored verifier, for identity attributes that end up on the user
//! account as a [`VerifiedIdentity`].

pub mod authorize;
pub mod exchange;
pub mod identity;
pub mod pkce;
pub mod router;
pub mod service;
pub mod session;

#[cfg(test)]
mod tests;

pub use authorize::AuthorizationUrlBuilder;
pub use exchange::{
    ExchangeError, HttpIdentityProvider, IdentityProvider, ProviderError, ProviderTokens,
    RawIdentity, TokenExchangeClient,
};
pub use identity::{map_identity, KycStatus, VerifiedIdentity};
pub use pkce::PkcePair;
pub use router::verification_router;
pub use service::{
    AuthorizationRedirect, CallbackOutcome, IdentityVerificationService, VerificationFlowError,
};
pub use session::{
    InMemorySessionStore, SessionError, SessionHandle, SessionStore, VerificationSession,
    VerificationSessions, SESSION_TTL_MINUTES,
};
