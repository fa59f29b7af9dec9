use metrics_exporter_prometheus::PrometheusHandle;
use rentwise::access::{Actor, InMemoryAccessTokens, InMemoryUserDirectory, UserAccount};
use rentwise::error::AppError;
use rentwise::notify::{Notification, Notifier, NotifyError};
use rentwise::workflows::rental::{PropertyListing, RentalRepository};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notifier that only records the delivery request in the log. Real adapters (SMS,
/// e-mail) plug in behind the same trait.
#[derive(Default, Clone)]
pub(crate) struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            template = %notification.template,
            recipient = %notification.recipient,
            reference = %notification.reference,
            details = ?notification.details,
            "notification queued"
        );
        Ok(())
    }
}

/// Notifier used by the demo so the walkthrough can print what would have been sent.
#[derive(Default, Clone)]
pub(crate) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl Notifier for RecordingNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut guard = self.sent.lock().expect("notifier mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

impl RecordingNotifier {
    pub(crate) fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().expect("notifier mutex poisoned"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SeedToken {
    pub(crate) token: String,
    pub(crate) actor: Actor,
}

/// Accounts, catalog entries and bearer tokens loaded at startup. The account and
/// catalog services own this data in production.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SeedData {
    #[serde(default)]
    pub(crate) users: Vec<UserAccount>,
    #[serde(default)]
    pub(crate) properties: Vec<PropertyListing>,
    #[serde(default)]
    pub(crate) tokens: Vec<SeedToken>,
}

impl SeedData {
    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|reason| AppError::Seed(format!("{}: {reason}", path.display())))
    }

    pub(crate) fn from_json(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|err| err.to_string())
    }

    pub(crate) fn apply<R>(
        self,
        users: &InMemoryUserDirectory,
        rentals: &R,
        tokens: &InMemoryAccessTokens,
    ) -> Result<(), AppError>
    where
        R: RentalRepository,
    {
        let counts = (self.users.len(), self.properties.len(), self.tokens.len());
        for account in self.users {
            users.insert(account);
        }
        for property in self.properties {
            let id = property.id.clone();
            rentals
                .upsert_property(property)
                .map_err(|err| AppError::Seed(format!("property {id}: {err}")))?;
        }
        for SeedToken { token, actor } in self.tokens {
            tokens.grant(token, actor);
        }
        info!(
            users = counts.0,
            properties = counts.1,
            tokens = counts.2,
            "seed data loaded"
        );
        Ok(())
    }
}
