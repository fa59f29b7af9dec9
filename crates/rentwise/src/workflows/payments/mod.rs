//! Payment reconciliation against a hosted-checkout gateway.
//!
//! Payments start `PENDING` when a checkout is created and settle exactly once, either
//! when the payer's client asks for verification or when the gateway pushes a webhook,
//! whichever lands first.

pub mod domain;
pub mod gateway;
pub mod reconciler;
pub mod repository;
pub mod router;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use domain::{
    CheckoutIntent, InitializePayment, Payment, PaymentStatus, PaymentType, TransactionRef,
};
pub use gateway::{
    CheckoutCustomization, CheckoutRequest, GatewayCheckout, GatewayError, GatewayStatus,
    GatewayVerification, HttpPaymentGateway, PaymentGateway,
};
pub use reconciler::{
    CheckoutSettings, PaymentError, PaymentReconciler, SettlementSource, VerificationError,
    WebhookOutcome,
};
pub use repository::{InMemoryPaymentRepository, PaymentRepository, StatusUpdate, StatusWrite};
pub use router::payment_router;
pub use webhook::{sign_body, verify_signature, WebhookEvent, SIGNATURE_HEADER};
