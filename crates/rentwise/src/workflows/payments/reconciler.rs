use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    CheckoutIntent, InitializePayment, Payment, PaymentStatus, PaymentType, TransactionRef,
};
use super::gateway::{
    CheckoutCustomization, CheckoutRequest, GatewayError, GatewayStatus, PaymentGateway,
};
use super::repository::{PaymentRepository, StatusUpdate, StatusWrite};
use super::webhook::{verify_signature, WebhookEvent};
use crate::access::{Actor, UserAccount, UserDirectory};
use crate::clock::Clock;
use crate::config::{GatewayConfig, Secret};
use crate::notify::{Notification, Notifier};
use crate::repository::RepositoryError;
use crate::workflows::rental::{
    ApplicationId, ApplicationStatus, RentalPayments, RentalServiceError,
};

/// Merchant settings applied to every checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub callback_url: String,
    pub return_url: String,
    pub webhook_secret: Option<Secret>,
}

impl CheckoutSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            currency: config.currency.clone(),
            callback_url: config.callback_url.to_string(),
            return_url: config.return_url.to_string(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

/// What a webhook delivery did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    AlreadySettled,
    Unknown,
    Ignored,
}

/// Which path observed the settlement first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementSource {
    Verification,
    Webhook,
    Admin,
}

impl SettlementSource {
    const fn label(self) -> &'static str {
        match self {
            SettlementSource::Verification => "verification",
            SettlementSource::Webhook => "webhook",
            SettlementSource::Admin => "admin",
        }
    }
}

/// Keeps local payments in step with the gateway. Verification and webhooks may race;
/// the repository's compare-and-set picks one winner and only the winner runs the
/// settlement side effects.
pub struct PaymentReconciler<R, G> {
    payments: Arc<R>,
    gateway: Arc<G>,
    rentals: Arc<dyn RentalPayments>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: CheckoutSettings,
}

impl<R, G> PaymentReconciler<R, G>
where
    R: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(
        payments: Arc<R>,
        gateway: Arc<G>,
        rentals: Arc<dyn RentalPayments>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            payments,
            gateway,
            rentals,
            users,
            notifier,
            clock,
            settings,
        }
    }

    /// Create a pending payment and a hosted checkout for it.
    pub async fn initialize(
        &self,
        actor: &Actor,
        request: InitializePayment,
    ) -> Result<CheckoutIntent, PaymentError> {
        if request.amount == 0 {
            return Err(PaymentError::InvalidAmount);
        }

        let account = self
            .users
            .fetch(&actor.user_id)?
            .ok_or(PaymentError::IdentityNotVerified)?;
        if !account.is_verified() {
            return Err(PaymentError::IdentityNotVerified);
        }

        let rental = self
            .rentals
            .rental(&request.rental_id)?
            .ok_or_else(|| PaymentError::RentalNotFound(request.rental_id.clone()))?;
        if rental.applicant_id != actor.user_id {
            return Err(PaymentError::Forbidden("only the applicant pays for a rental"));
        }
        let payable = match rental.status() {
            ApplicationStatus::Approved | ApplicationStatus::ContractPending => true,
            ApplicationStatus::Completed => request.payment_type != PaymentType::Deposit,
            _ => false,
        };
        if !payable {
            return Err(PaymentError::NotPayable {
                status: rental.status(),
            });
        }

        let payment = self.payments.insert(Payment {
            tx_ref: TransactionRef::generate(),
            application_id: rental.id.clone(),
            payer_id: actor.user_id.clone(),
            landlord_id: rental.landlord_id.clone(),
            amount: request.amount,
            currency: self.settings.currency.clone(),
            payment_type: request.payment_type,
            status: PaymentStatus::Pending,
            checkout_url: None,
            gateway_response: None,
            created_at: self.clock.now(),
            due_date: request.due_date,
            paid_at: None,
            refunded_at: None,
        })?;

        let checkout = self.checkout_request(&payment, &account);
        let created = self
            .gateway
            .initialize(&checkout)
            .await
            .inspect_err(|err| {
                warn!(tx_ref = %payment.tx_ref, error = %err, "gateway checkout failed");
            })?;
        let payment = self.payments.attach_checkout(
            &payment.tx_ref,
            created.checkout_url,
            created.raw,
        )?;

        info!(
            tx_ref = %payment.tx_ref,
            application_id = %payment.application_id,
            amount = payment.amount,
            "checkout initialized"
        );
        Ok(CheckoutIntent {
            checkout_url: payment.checkout_url.clone().unwrap_or_default(),
            tx_ref: payment.tx_ref,
            amount: payment.amount,
            currency: payment.currency,
        })
    }

    /// Verification requested by a party to the payment.
    pub async fn verify_as(
        &self,
        actor: &Actor,
        tx_ref: &TransactionRef,
    ) -> Result<Payment, VerificationError> {
        let payment = self.load(tx_ref)?;
        if !actor.is_admin() && !payment.is_party(&actor.user_id) {
            return Err(VerificationError::Forbidden);
        }
        self.reconcile(payment).await
    }

    /// Pull the gateway's view of `tx_ref` and apply it to a pending payment.
    pub async fn verify(&self, tx_ref: &TransactionRef) -> Result<Payment, VerificationError> {
        let payment = self.load(tx_ref)?;
        self.reconcile(payment).await
    }

    async fn reconcile(&self, payment: Payment) -> Result<Payment, VerificationError> {
        if !payment.status().is_pending() {
            return Ok(payment);
        }

        let verification = self
            .gateway
            .verify(&payment.tx_ref)
            .await
            .inspect_err(|err| {
                warn!(tx_ref = %payment.tx_ref, error = %err, "gateway verification failed");
            })?;

        let target = match verification.status {
            Some(GatewayStatus::Success) => PaymentStatus::Completed,
            Some(GatewayStatus::Failed) => PaymentStatus::Failed,
            _ => return Ok(payment),
        };
        let write = self.payments.transition(
            &payment.tx_ref,
            PaymentStatus::Pending,
            StatusUpdate {
                to: target,
                at: self.clock.now(),
                gateway_response: Some(verification.raw),
            },
        )?;

        Ok(match write {
            StatusWrite::Applied(payment) => {
                self.settled(&payment, SettlementSource::Verification);
                payment
            }
            StatusWrite::Stale(payment) => payment,
        })
    }

    /// Whether a webhook body carries a valid signature. Always true without a
    /// configured secret.
    pub fn authenticate_webhook(&self, body: &[u8], signature: Option<&str>) -> bool {
        match (&self.settings.webhook_secret, signature) {
            (None, _) => true,
            (Some(secret), Some(signature)) => verify_signature(secret, body, signature),
            (Some(_), None) => false,
        }
    }

    /// Apply a gateway push notification. Duplicates and late arrivals are no-ops.
    pub fn handle_webhook(&self, event: WebhookEvent) -> Result<WebhookOutcome, RepositoryError> {
        let Some(payment) = self.payments.fetch(&event.tx_ref)? else {
            warn!(tx_ref = %event.tx_ref, "webhook for unknown transaction dropped");
            return Ok(WebhookOutcome::Unknown);
        };
        let Some(reported) = event.gateway_status() else {
            info!(
                tx_ref = %event.tx_ref,
                status = ?event.status,
                "webhook status not actionable"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        let (expected, target) = match reported {
            GatewayStatus::Success => (PaymentStatus::Pending, PaymentStatus::Completed),
            GatewayStatus::Failed => (PaymentStatus::Pending, PaymentStatus::Failed),
            GatewayStatus::Refunded => (PaymentStatus::Completed, PaymentStatus::Refunded),
            GatewayStatus::Pending => return Ok(WebhookOutcome::Ignored),
        };
        if payment.status() != expected {
            let settled = payment.status() == target
                || (expected.is_pending() && !payment.status().is_pending());
            let outcome = if settled {
                WebhookOutcome::AlreadySettled
            } else {
                WebhookOutcome::Ignored
            };
            info!(
                tx_ref = %payment.tx_ref,
                status = %payment.status(),
                ?outcome,
                "webhook not applied"
            );
            return Ok(outcome);
        }

        let write = self.payments.transition(
            &payment.tx_ref,
            expected,
            StatusUpdate {
                to: target,
                at: self.clock.now(),
                gateway_response: Some(event.raw),
            },
        )?;
        match write {
            StatusWrite::Applied(payment) => {
                self.settled(&payment, SettlementSource::Webhook);
                Ok(WebhookOutcome::Applied)
            }
            StatusWrite::Stale(payment) => {
                info!(
                    tx_ref = %payment.tx_ref,
                    status = %payment.status(),
                    "webhook lost the race"
                );
                Ok(WebhookOutcome::AlreadySettled)
            }
        }
    }

    /// Record a refund issued to the payer. Admin only.
    pub fn refund(&self, actor: &Actor, tx_ref: &TransactionRef) -> Result<Payment, PaymentError> {
        if !actor.is_admin() {
            return Err(PaymentError::Forbidden("only admins record refunds"));
        }
        let payment = self
            .payments
            .fetch(tx_ref)?
            .ok_or_else(|| PaymentError::NotFound(tx_ref.clone()))?;
        if payment.status() != PaymentStatus::Completed {
            return Err(PaymentError::NotRefundable {
                status: payment.status(),
            });
        }

        let write = self.payments.transition(
            tx_ref,
            PaymentStatus::Completed,
            StatusUpdate {
                to: PaymentStatus::Refunded,
                at: self.clock.now(),
                gateway_response: None,
            },
        )?;
        match write {
            StatusWrite::Applied(payment) => {
                self.settled(&payment, SettlementSource::Admin);
                Ok(payment)
            }
            StatusWrite::Stale(payment) => Err(PaymentError::NotRefundable {
                status: payment.status(),
            }),
        }
    }

    fn load(&self, tx_ref: &TransactionRef) -> Result<Payment, VerificationError> {
        self.payments
            .fetch(tx_ref)?
            .ok_or_else(|| VerificationError::NotFound(tx_ref.clone()))
    }

    fn checkout_request(&self, payment: &Payment, payer: &UserAccount) -> CheckoutRequest {
        let name = payer
            .identity
            .as_ref()
            .and_then(|identity| identity.full_name.clone())
            .or_else(|| payer.display_name.clone());
        let (first_name, last_name) = match name.as_deref().map(str::trim) {
            Some(name) => match name.split_once(' ') {
                Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
                None => (Some(name.to_string()), None),
            },
            None => (None, None),
        };

        CheckoutRequest {
            tx_ref: payment.tx_ref.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            first_name,
            last_name,
            phone_number: payer.phone.clone(),
            callback_url: self.settings.callback_url.clone(),
            return_url: self.settings.return_url.clone(),
            customization: CheckoutCustomization {
                title: "Rentwise".to_string(),
                description: format!("Payment for application {}", payment.application_id),
            },
        }
    }

    /// Side effects owed by the single writer that moved a payment out of its state.
    fn settled(&self, payment: &Payment, source: SettlementSource) {
        let at = self.clock.now();
        let notification = match payment.status() {
            PaymentStatus::Completed => {
                info!(
                    tx_ref = %payment.tx_ref,
                    amount = payment.amount,
                    source = source.label(),
                    "payment completed"
                );
                if let Err(err) = self.rentals.payment_completed(&payment.application_id, at) {
                    warn!(
                        tx_ref = %payment.tx_ref,
                        application_id = %payment.application_id,
                        error = %err,
                        "first payment milestone not recorded"
                    );
                }
                Notification::new(
                    "payment_received",
                    payment.landlord_id.clone(),
                    payment.tx_ref.0.clone(),
                )
            }
            PaymentStatus::Failed => {
                info!(tx_ref = %payment.tx_ref, source = source.label(), "payment failed");
                Notification::new(
                    "payment_failed",
                    payment.payer_id.clone(),
                    payment.tx_ref.0.clone(),
                )
            }
            PaymentStatus::Refunded => {
                info!(tx_ref = %payment.tx_ref, source = source.label(), "payment refunded");
                Notification::new(
                    "payment_refunded",
                    payment.payer_id.clone(),
                    payment.tx_ref.0.clone(),
                )
            }
            PaymentStatus::Pending => return,
        };

        let notification = notification
            .with_detail("application_id", payment.application_id.0.clone())
            .with_detail("amount", payment.amount.to_string())
            .with_detail("currency", payment.currency.clone())
            .with_detail("source", source.label());
        if let Err(err) = self.notifier.publish(notification) {
            warn!(tx_ref = %payment.tx_ref, error = %err, "notification dropped");
        }
    }
}

/// Error raised while starting or administering a payment.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("payer identity is not verified")]
    IdentityNotVerified,
    #[error("rental application {0} not found")]
    RentalNotFound(ApplicationId),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("application in status {status} does not accept this payment")]
    NotPayable { status: ApplicationStatus },
    #[error("payment {0} not found")]
    NotFound(TransactionRef),
    #[error("payment in status {status} cannot be refunded")]
    NotRefundable { status: PaymentStatus },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Rental(#[from] RentalServiceError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Error raised while verifying a payment against the gateway.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("payment {0} not found")]
    NotFound(TransactionRef),
    #[error("forbidden: not a party to this payment")]
    Forbidden,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
