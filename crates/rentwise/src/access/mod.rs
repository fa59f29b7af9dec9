//! Who is calling: user accounts, bearer access tokens, and the axum extractor that
//! resolves one into the other.
//!
//! Account management itself lives outside this crate; only the narrow surface the
//! workflows depend on is modelled here.

pub mod accounts;
pub mod extract;
pub mod tokens;

pub use accounts::{Actor, InMemoryUserDirectory, Role, UserAccount, UserDirectory, UserId};
pub use extract::{AccessGate, Authenticated};
pub use tokens::{AccessTokenStore, InMemoryAccessTokens};
