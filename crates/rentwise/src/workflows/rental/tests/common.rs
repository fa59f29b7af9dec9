use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::access::{Actor, Role, UserId};
use crate::clock::ManualClock;
use crate::notify::{Notification, Notifier, NotifyError};
use crate::workflows::rental::{
    ApplicationId, ApplicationStatus, ApplicationSubmission, InMemoryRentalRepository, Milestone,
    PropertyId, PropertyListing, PropertyStatus, ProposedTerms, RentalApplication,
    RentalApplicationService, RentalRepository,
};

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap()
}

pub(super) fn tenant() -> Actor {
    Actor::new("tenant-1", Role::Tenant)
}

pub(super) fn other_tenant() -> Actor {
    Actor::new("tenant-2", Role::Tenant)
}

pub(super) fn landlord() -> Actor {
    Actor::new("landlord-1", Role::Landlord)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin)
}

pub(super) fn property_id() -> PropertyId {
    PropertyId("prop-bole-12".to_string())
}

pub(super) fn listing() -> PropertyListing {
    PropertyListing {
        id: property_id(),
        landlord_id: UserId("landlord-1".to_string()),
        title: "Two bedroom near Bole Medhanialem".to_string(),
        monthly_rent: 18_000,
        status: PropertyStatus::Available,
        available: true,
    }
}

pub(super) fn submission() -> ApplicationSubmission {
    ApplicationSubmission {
        property_id: property_id(),
        terms: ProposedTerms {
            monthly_rent: 18_000,
            deposit: 36_000,
            currency: "ETB".to_string(),
            lease_months: 12,
            move_in: NaiveDate::from_ymd_opt(2025, 11, 1).expect("valid date"),
        },
        message: Some("Quiet household, references available".to_string()),
    }
}

/// Builds an application directly in `status`, bypassing the service.
pub(super) fn application_in(status: ApplicationStatus) -> RentalApplication {
    let mut application = RentalApplication::new(
        ApplicationId("app-fixture".to_string()),
        &listing(),
        tenant().user_id,
        submission(),
        start(),
    );
    application.status = status;
    application
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    pub(super) sent: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub(super) fn templates(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("notifier mutex")
            .iter()
            .map(|notification| notification.template.clone())
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().expect("notifier mutex").push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn publish(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("sms gateway down".to_string()))
    }
}

pub(super) type MemoryService = RentalApplicationService<InMemoryRentalRepository, MemoryNotifier>;

pub(super) struct Harness {
    pub(super) service: Arc<MemoryService>,
    pub(super) repository: Arc<InMemoryRentalRepository>,
    pub(super) notifier: MemoryNotifier,
    pub(super) clock: ManualClock,
}

pub(super) fn harness() -> Harness {
    let repository = Arc::new(InMemoryRentalRepository::default());
    repository
        .upsert_property(listing())
        .expect("seed property");
    let notifier = MemoryNotifier::default();
    let clock = ManualClock::new(start());
    let service = Arc::new(RentalApplicationService::new(
        repository.clone(),
        Arc::new(notifier.clone()),
        Arc::new(clock.clone()),
    ));
    Harness {
        service,
        repository,
        notifier,
        clock,
    }
}

/// Drives a fresh submission to `APPROVED` through the service.
pub(super) fn approved(harness: &Harness) -> RentalApplication {
    let application = harness
        .service
        .submit(&tenant(), submission())
        .expect("submit");
    harness
        .service
        .transition(&landlord(), &application.id, ApplicationStatus::UnderReview, None)
        .expect("review");
    harness
        .service
        .transition(&landlord(), &application.id, ApplicationStatus::Approved, None)
        .expect("approve")
}

/// Drives a fresh submission to `CONTRACT_PENDING` with every hand-over milestone set.
pub(super) fn ready_to_complete(harness: &Harness) -> RentalApplication {
    let application = approved(harness);
    harness
        .service
        .transition(
            &landlord(),
            &application.id,
            ApplicationStatus::ContractPending,
            None,
        )
        .expect("contract pending");
    harness
        .service
        .record_milestone(&tenant(), &application.id, Milestone::ContractSigned)
        .expect("contract signed");
    harness
        .service
        .record_milestone(&tenant(), &application.id, Milestone::AgreementAccepted)
        .expect("agreement accepted");
    harness
        .service
        .record_milestone(&landlord(), &application.id, Milestone::KeysHandedOver)
        .expect("keys handed over");
    harness
        .service
        .first_payment_completed(&application.id, start())
        .expect("first payment")
}
