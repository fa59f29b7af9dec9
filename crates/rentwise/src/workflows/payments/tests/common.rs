use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

use crate::access::{Actor, InMemoryUserDirectory, Role, UserAccount, UserId};
use crate::clock::ManualClock;
use crate::config::Secret;
use crate::notify::{Notification, Notifier, NotifyError};
use crate::workflows::payments::{
    CheckoutRequest, CheckoutSettings, GatewayCheckout, GatewayError, GatewayStatus,
    GatewayVerification, InMemoryPaymentRepository, InitializePayment, PaymentGateway,
    PaymentReconciler, PaymentType, TransactionRef,
};
use crate::workflows::rental::{
    ApplicationStatus, ApplicationSubmission, InMemoryRentalRepository, PropertyId,
    PropertyListing, PropertyStatus, ProposedTerms, RentalApplication, RentalApplicationService,
    RentalRepository,
};
use crate::workflows::verification::{KycStatus, VerifiedIdentity};

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 1, 8, 30, 0).unwrap()
}

pub(super) fn tenant() -> Actor {
    Actor::new("tenant-1", Role::Tenant)
}

pub(super) fn landlord() -> Actor {
    Actor::new("landlord-1", Role::Landlord)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin)
}

pub(super) fn outsider() -> Actor {
    Actor::new("tenant-9", Role::Tenant)
}

fn account(actor: &Actor, name: &str, verified: bool) -> UserAccount {
    UserAccount {
        id: actor.user_id.clone(),
        role: actor.role,
        display_name: Some(name.to_string()),
        phone: Some("+251911223344".to_string()),
        identity: verified.then(|| VerifiedIdentity {
            external_id: Some(format!("ext-{}", actor.user_id)),
            full_name: Some(name.to_string()),
            phone: Some("+251911223344".to_string()),
            status: KycStatus::Verified,
            raw: json!({ "sub": format!("ext-{}", actor.user_id) }),
            verified_at: start(),
        }),
    }
}

fn listing() -> PropertyListing {
    PropertyListing {
        id: PropertyId("prop-kazanchis-4".to_string()),
        landlord_id: UserId("landlord-1".to_string()),
        title: "Studio off Kazanchis".to_string(),
        monthly_rent: 18_000,
        status: PropertyStatus::Available,
        available: true,
    }
}

fn submission() -> ApplicationSubmission {
    ApplicationSubmission {
        property_id: listing().id,
        terms: ProposedTerms {
            monthly_rent: 18_000,
            deposit: 36_000,
            currency: "ETB".to_string(),
            lease_months: 12,
            move_in: NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid date"),
        },
        message: None,
    }
}

pub(super) fn rent(rental: &RentalApplication, amount: u64) -> InitializePayment {
    InitializePayment {
        rental_id: rental.id.clone(),
        amount,
        payment_type: PaymentType::Rent,
        due_date: None,
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    pub(super) sent: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub(super) fn count(&self, template: &str) -> usize {
        self.sent
            .lock()
            .expect("notifier mutex")
            .iter()
            .filter(|notification| notification.template == template)
            .count()
    }
}

impl Notifier for MemoryNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().expect("notifier mutex").push(notification);
        Ok(())
    }
}

/// Gateway double: hands out checkout URLs and answers verification with whatever
/// status the test configured.
#[derive(Default)]
pub(super) struct StubGateway {
    pub(super) verify_status: Mutex<Option<GatewayStatus>>,
    pub(super) fail_initialize: Mutex<bool>,
    pub(super) fail_verify: Mutex<bool>,
    pub(super) checkouts: Mutex<Vec<CheckoutRequest>>,
    pub(super) verify_calls: Mutex<u32>,
}

impl StubGateway {
    pub(super) fn report(&self, status: GatewayStatus) {
        *self.verify_status.lock().expect("stub mutex") = Some(status);
    }

    pub(super) fn verify_calls(&self) -> u32 {
        *self.verify_calls.lock().expect("stub mutex")
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError> {
        if *self.fail_initialize.lock().expect("stub mutex") {
            return Err(GatewayError::Timeout);
        }
        self.checkouts
            .lock()
            .expect("stub mutex")
            .push(request.clone());
        Ok(GatewayCheckout {
            checkout_url: format!("https://checkout.example.test/pay/{}", request.tx_ref),
            raw: json!({ "status": "success" }),
        })
    }

    async fn verify(&self, tx_ref: &TransactionRef) -> Result<GatewayVerification, GatewayError> {
        *self.verify_calls.lock().expect("stub mutex") += 1;
        if *self.fail_verify.lock().expect("stub mutex") {
            return Err(GatewayError::Transport("connection reset".to_string()));
        }
        let status = *self.verify_status.lock().expect("stub mutex");
        let label = match status {
            Some(GatewayStatus::Success) => "success",
            Some(GatewayStatus::Failed) => "failed",
            Some(GatewayStatus::Refunded) => "refunded",
            Some(GatewayStatus::Pending) | None => "pending",
        };
        Ok(GatewayVerification {
            status: status.or(Some(GatewayStatus::Pending)),
            raw: json!({ "data": { "status": label, "tx_ref": tx_ref.0 } }),
        })
    }
}

pub(super) type StubReconciler = PaymentReconciler<InMemoryPaymentRepository, StubGateway>;
pub(super) type RentalService = RentalApplicationService<InMemoryRentalRepository, MemoryNotifier>;

pub(super) struct Harness {
    pub(super) reconciler: Arc<StubReconciler>,
    pub(super) payments: Arc<InMemoryPaymentRepository>,
    pub(super) gateway: Arc<StubGateway>,
    pub(super) rentals: Arc<RentalService>,
    pub(super) rental_store: Arc<InMemoryRentalRepository>,
    pub(super) users: Arc<InMemoryUserDirectory>,
    pub(super) notifier: MemoryNotifier,
    pub(super) clock: ManualClock,
}

pub(super) fn settings(webhook_secret: Option<&str>) -> CheckoutSettings {
    CheckoutSettings {
        currency: "ETB".to_string(),
        callback_url: "https://rentwise.test/api/v1/payments/webhook".to_string(),
        return_url: "https://rentwise.test/payments/done".to_string(),
        webhook_secret: webhook_secret.map(Secret::new),
    }
}

pub(super) fn harness_with(settings: CheckoutSettings) -> Harness {
    let clock = ManualClock::new(start());
    let notifier = MemoryNotifier::default();

    let users = Arc::new(InMemoryUserDirectory::default());
    users.insert(account(&tenant(), "Abebe Kebede", true));
    users.insert(account(&landlord(), "Sara Tesfaye", true));
    users.insert(account(&outsider(), "Unverified Person", false));

    let rental_store = Arc::new(InMemoryRentalRepository::default());
    rental_store.upsert_property(listing()).expect("seed property");
    let rentals = Arc::new(RentalApplicationService::new(
        rental_store.clone(),
        Arc::new(notifier.clone()),
        Arc::new(clock.clone()),
    ));

    let payments = Arc::new(InMemoryPaymentRepository::default());
    let gateway = Arc::new(StubGateway::default());
    let reconciler = Arc::new(PaymentReconciler::new(
        payments.clone(),
        gateway.clone(),
        rentals.clone(),
        users.clone(),
        Arc::new(notifier.clone()),
        Arc::new(clock.clone()),
        settings,
    ));

    Harness {
        reconciler,
        payments,
        gateway,
        rentals,
        rental_store,
        users,
        notifier,
        clock,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(settings(None))
}

pub(super) fn approved_rental(harness: &Harness) -> RentalApplication {
    let application = harness
        .rentals
        .submit(&tenant(), submission())
        .expect("submit");
    harness
        .rentals
        .transition(&landlord(), &application.id, ApplicationStatus::UnderReview, None)
        .expect("review");
    harness
        .rentals
        .transition(&landlord(), &application.id, ApplicationStatus::Approved, None)
        .expect("approve")
}

pub(super) fn webhook_body(tx_ref: &TransactionRef, status: &str) -> Value {
    json!({
        "event": format!("charge.{status}"),
        "tx_ref": tx_ref.0,
        "status": status,
        "amount": "18000.00",
        "currency": "ETB",
        "reference": "APx9Qe7a",
    })
}
