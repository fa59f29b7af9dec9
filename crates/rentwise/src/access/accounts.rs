use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::repository::RepositoryError;
use crate::workflows::verification::identity::{KycStatus, VerifiedIdentity};

/// Identifier wrapper for platform users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Tenant,
    Landlord,
    Admin,
}

/// Authenticated caller of a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The slice of a user record the workflows read and write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub role: Role,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub identity: Option<VerifiedIdentity>,
}

impl UserAccount {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id.clone(),
            role: self.role,
        }
    }

    pub fn kyc_status(&self) -> KycStatus {
        self.identity
            .as_ref()
            .map(|identity| identity.status)
            .unwrap_or(KycStatus::Pending)
    }

    pub fn is_verified(&self) -> bool {
        self.kyc_status() == KycStatus::Verified
    }
}

/// Storage abstraction over the user records owned by the account service.
pub trait UserDirectory: Send + Sync {
    fn fetch(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError>;

    /// Replace the user's verified identity, mirroring verified name and phone onto the
    /// account. Only the verification handshake calls this.
    fn record_identity(
        &self,
        id: &UserId,
        identity: VerifiedIdentity,
    ) -> Result<UserAccount, RepositoryError>;
}

#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    accounts: Arc<Mutex<HashMap<UserId, UserAccount>>>,
}

impl InMemoryUserDirectory {
    pub fn insert(&self, account: UserAccount) {
        self.accounts
            .lock()
            .expect("directory mutex poisoned")
            .insert(account.id.clone(), account);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn fetch(&self, id: &UserId) -> Result<Option<UserAccount>, RepositoryError> {
        let guard = self.accounts.lock().expect("directory mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn record_identity(
        &self,
        id: &UserId,
        identity: VerifiedIdentity,
    ) -> Result<UserAccount, RepositoryError> {
        let mut guard = self.accounts.lock().expect("directory mutex poisoned");
        let account = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if identity.full_name.is_some() {
            account.display_name = identity.full_name.clone();
        }
        if identity.phone.is_some() {
            account.phone = identity.phone.clone();
        }
        account.identity = Some(identity);
        Ok(account.clone())
    }
}
