use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{
    ApplicationId, ApplicationStatus, ApplicationSubmission, Milestone, PropertyId,
    PropertyListing, RentalApplication,
};
use super::machine::{permits, permits_milestone, MilestoneError, TransitionError};
use super::repository::{PropertyWrite, RentalCommit, RentalRepository};
use crate::access::{Actor, Role};
use crate::clock::Clock;
use crate::notify::{Notification, Notifier};
use crate::repository::RepositoryError;

/// Optimistic writes are retried this many times before surfacing `Conflict`.
const COMMIT_ATTEMPTS: usize = 3;

/// Service driving rental applications through their lifecycle.
pub struct RentalApplicationService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
}

fn next_application_id() -> ApplicationId {
    ApplicationId(format!("app-{}", Uuid::new_v4().simple()))
}

/// Statuses in which the application keeps its property rented.
fn holds_property(status: ApplicationStatus) -> bool {
    matches!(
        status,
        ApplicationStatus::Approved | ApplicationStatus::ContractPending
    )
}

impl<R, N> RentalApplicationService<R, N>
where
    R: RentalRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            notifier,
            clock,
        }
    }

    /// Submit a new application from a tenant for an available property.
    pub fn submit(
        &self,
        actor: &Actor,
        submission: ApplicationSubmission,
    ) -> Result<RentalApplication, RentalServiceError> {
        if actor.role != Role::Tenant {
            return Err(RentalServiceError::Forbidden(
                "only tenants submit rental applications",
            ));
        }
        if submission.terms.monthly_rent == 0 || submission.terms.lease_months == 0 {
            return Err(RentalServiceError::InvalidTerms);
        }

        let property = self.load_property(&submission.property_id)?;
        if !property.is_available() {
            return Err(RentalServiceError::PropertyUnavailable(property.id));
        }
        if property.landlord_id == actor.user_id {
            return Err(RentalServiceError::Forbidden(
                "landlords cannot apply to their own property",
            ));
        }

        let application = RentalApplication::new(
            next_application_id(),
            &property,
            actor.user_id.clone(),
            submission,
            self.clock.now(),
        );
        let stored = self.repository.insert(application)?;

        info!(
            application_id = %stored.id,
            property_id = %stored.property_id,
            "rental application submitted"
        );
        self.notify(
            Notification::new(
                "application_submitted",
                stored.landlord_id.clone(),
                stored.id.0.clone(),
            )
            .with_detail("property_id", stored.property_id.0.clone())
            .with_detail("applicant_id", stored.applicant_id.0.clone()),
        );
        Ok(stored)
    }

    /// Fetch an application visible to `actor`.
    pub fn get(
        &self,
        actor: &Actor,
        id: &ApplicationId,
    ) -> Result<RentalApplication, RentalServiceError> {
        let application = self.load(id)?;
        if !actor.is_admin() && !application.is_party(&actor.user_id) {
            return Err(RentalServiceError::Forbidden("not a party to this application"));
        }
        Ok(application)
    }

    /// Apply a status transition requested by `actor`.
    ///
    /// Approval marks the property rented in the same commit and fails if another
    /// application already took it. Rejecting or cancelling an application that held
    /// the property puts it back on the market in that same commit.
    pub fn transition(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        next: ApplicationStatus,
        note: Option<String>,
    ) -> Result<RentalApplication, RentalServiceError> {
        for _ in 0..COMMIT_ATTEMPTS {
            let mut application = self.load(id)?;
            if !permits(actor, &application, next) {
                return Err(RentalServiceError::Forbidden(
                    "actor may not request this status change",
                ));
            }

            let expected_version = application.version;
            let change =
                application.transition(next, &actor.user_id, self.clock.now(), note.clone())?;

            let property = match next {
                ApplicationStatus::Approved => {
                    let mut listing = self.load_property(&application.property_id)?;
                    if !listing.is_available() {
                        return Err(RentalServiceError::PropertyUnavailable(listing.id));
                    }
                    listing.mark_rented();
                    Some(PropertyWrite {
                        listing,
                        require_available: true,
                    })
                }
                ApplicationStatus::Rejected | ApplicationStatus::Cancelled
                    if holds_property(change.from) =>
                {
                    let mut listing = self.load_property(&application.property_id)?;
                    listing.mark_available();
                    Some(PropertyWrite {
                        listing,
                        require_available: false,
                    })
                }
                _ => None,
            };

            match self.repository.commit(RentalCommit {
                expected_version,
                application,
                property,
            }) {
                Ok(stored) => {
                    info!(
                        application_id = %stored.id,
                        from = %change.from,
                        to = %change.to,
                        actor = %actor.user_id,
                        "application status changed"
                    );
                    self.notify(
                        Notification::new(
                            "application_status_changed",
                            stored.applicant_id.clone(),
                            stored.id.0.clone(),
                        )
                        .with_detail("from", change.from.label())
                        .with_detail("to", change.to.label()),
                    );
                    return Ok(stored);
                }
                Err(RepositoryError::Conflict) => {
                    warn!(application_id = %id, "concurrent application update, retrying");
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(RepositoryError::Conflict.into())
    }

    /// Record a hand-over milestone on behalf of `actor`.
    pub fn record_milestone(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        milestone: Milestone,
    ) -> Result<RentalApplication, RentalServiceError> {
        let application = self.load(id)?;
        if !permits_milestone(actor, &application, milestone) {
            return Err(RentalServiceError::Forbidden(
                "actor may not record this milestone",
            ));
        }
        self.set_milestone(id, milestone, self.clock.now())
    }

    /// Mark the first payment of an application as completed. Called by payment
    /// reconciliation once a payment reached `COMPLETED`.
    pub fn first_payment_completed(
        &self,
        id: &ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<RentalApplication, RentalServiceError> {
        let application = self.load(id)?;
        if application.milestones().first_payment_completed {
            return Ok(application);
        }
        self.set_milestone(id, Milestone::FirstPaymentCompleted, at)
    }

    fn set_milestone(
        &self,
        id: &ApplicationId,
        milestone: Milestone,
        at: DateTime<Utc>,
    ) -> Result<RentalApplication, RentalServiceError> {
        for _ in 0..COMMIT_ATTEMPTS {
            let mut application = self.load(id)?;
            let expected_version = application.version;
            if !application.record_milestone(milestone, at)? {
                return Ok(application);
            }

            match self.repository.commit(RentalCommit {
                expected_version,
                application,
                property: None,
            }) {
                Ok(stored) => {
                    info!(application_id = %stored.id, ?milestone, "milestone recorded");
                    return Ok(stored);
                }
                Err(RepositoryError::Conflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Err(RepositoryError::Conflict.into())
    }

    fn load(&self, id: &ApplicationId) -> Result<RentalApplication, RentalServiceError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| RentalServiceError::NotFound(id.clone()))
    }

    fn load_property(&self, id: &PropertyId) -> Result<PropertyListing, RentalServiceError> {
        self.repository
            .property(id)?
            .ok_or_else(|| RentalServiceError::PropertyNotFound(id.clone()))
    }

    fn notify(&self, notification: Notification) {
        let template = notification.template.clone();
        if let Err(err) = self.notifier.publish(notification) {
            warn!(%template, error = %err, "notification dropped");
        }
    }
}

/// Hook the payment reconciler uses to read rentals and report settled payments.
pub trait RentalPayments: Send + Sync {
    fn rental(&self, id: &ApplicationId) -> Result<Option<RentalApplication>, RentalServiceError>;
    fn payment_completed(
        &self,
        id: &ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<(), RentalServiceError>;
}

impl<R, N> RentalPayments for RentalApplicationService<R, N>
where
    R: RentalRepository + 'static,
    N: Notifier + 'static,
{
    fn rental(&self, id: &ApplicationId) -> Result<Option<RentalApplication>, RentalServiceError> {
        Ok(self.repository.fetch(id)?)
    }

    fn payment_completed(
        &self,
        id: &ApplicationId,
        at: DateTime<Utc>,
    ) -> Result<(), RentalServiceError> {
        self.first_payment_completed(id, at).map(|_| ())
    }
}

/// Error raised by the rental application service.
#[derive(Debug, thiserror::Error)]
pub enum RentalServiceError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("property {0} not found")]
    PropertyNotFound(PropertyId),
    #[error("property {0} is no longer available")]
    PropertyUnavailable(PropertyId),
    #[error("proposed terms must have a positive rent and lease length")]
    InvalidTerms,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Milestone(#[from] MilestoneError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
