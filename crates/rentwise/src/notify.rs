use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::access::UserId;

/// Trait describing outbound notification hooks (e-mail, SMS, push adapters).
pub trait Notifier: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Notification payload addressed to a single platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub recipient: UserId,
    pub reference: String,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(template: &str, recipient: UserId, reference: impl Into<String>) -> Self {
        Self {
            template: template.to_string(),
            recipient,
            reference: reference.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
