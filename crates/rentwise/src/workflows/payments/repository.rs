use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::domain::{Payment, PaymentStatus, TransactionRef};
use crate::repository::RepositoryError;

/// A terminal status write.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub to: PaymentStatus,
    pub at: DateTime<Utc>,
    pub gateway_response: Option<Value>,
}

/// Result of a compare-and-set on a payment's status.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusWrite {
    /// This caller's write landed.
    Applied(Payment),
    /// Another writer got there first; carries the stored payment.
    Stale(Payment),
}

pub trait PaymentRepository: Send + Sync {
    fn insert(&self, payment: Payment) -> Result<Payment, RepositoryError>;
    fn fetch(&self, tx_ref: &TransactionRef) -> Result<Option<Payment>, RepositoryError>;
    fn attach_checkout(
        &self,
        tx_ref: &TransactionRef,
        checkout_url: String,
        gateway_response: Value,
    ) -> Result<Payment, RepositoryError>;
    /// Write `update` only if the stored status still equals `expected`.
    fn transition(
        &self,
        tx_ref: &TransactionRef,
        expected: PaymentStatus,
        update: StatusUpdate,
    ) -> Result<StatusWrite, RepositoryError>;
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    payments: Arc<Mutex<HashMap<TransactionRef, Payment>>>,
}

impl PaymentRepository for InMemoryPaymentRepository {
    fn insert(&self, payment: Payment) -> Result<Payment, RepositoryError> {
        let mut guard = self.payments.lock().expect("repository mutex poisoned");
        if guard.contains_key(&payment.tx_ref) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(payment.tx_ref.clone(), payment.clone());
        Ok(payment)
    }

    fn fetch(&self, tx_ref: &TransactionRef) -> Result<Option<Payment>, RepositoryError> {
        let guard = self.payments.lock().expect("repository mutex poisoned");
        Ok(guard.get(tx_ref).cloned())
    }

    fn attach_checkout(
        &self,
        tx_ref: &TransactionRef,
        checkout_url: String,
        gateway_response: Value,
    ) -> Result<Payment, RepositoryError> {
        let mut guard = self.payments.lock().expect("repository mutex poisoned");
        let payment = guard.get_mut(tx_ref).ok_or(RepositoryError::NotFound)?;
        payment.checkout_url = Some(checkout_url);
        if payment.status.is_pending() {
            payment.gateway_response = Some(gateway_response);
        }
        Ok(payment.clone())
    }

    fn transition(
        &self,
        tx_ref: &TransactionRef,
        expected: PaymentStatus,
        update: StatusUpdate,
    ) -> Result<StatusWrite, RepositoryError> {
        let mut guard = self.payments.lock().expect("repository mutex poisoned");
        let payment = guard.get_mut(tx_ref).ok_or(RepositoryError::NotFound)?;
        if payment.status != expected || !expected.can_become(update.to) {
            return Ok(StatusWrite::Stale(payment.clone()));
        }

        payment.status = update.to;
        match update.to {
            PaymentStatus::Completed => payment.paid_at = Some(update.at),
            PaymentStatus::Refunded => payment.refunded_at = Some(update.at),
            PaymentStatus::Pending | PaymentStatus::Failed => {}
        }
        if let Some(response) = update.gateway_response {
            payment.gateway_response = Some(response);
        }
        Ok(StatusWrite::Applied(payment.clone()))
    }
}
