//! Transition table and guards for the rental application lifecycle.
//!
//! ```text
//! PENDING            -> DOCUMENTS_REQUIRED | UNDER_REVIEW
//! DOCUMENTS_REQUIRED -> UNDER_REVIEW
//! UNDER_REVIEW       -> DOCUMENTS_REQUIRED | APPROVED
//! APPROVED           -> CONTRACT_PENDING
//! CONTRACT_PENDING   -> COMPLETED (all hand-over milestones set)
//! any non-terminal   -> REJECTED | CANCELLED
//! ```

use chrono::{DateTime, Utc};

use super::domain::{ApplicationStatus, Milestone, RentalApplication, StatusChange};
use crate::access::{Actor, UserId};

impl ApplicationStatus {
    /// Whether the lifecycle has an edge from `self` to `next`. Milestone and
    /// permission checks come on top of this.
    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Rejected | Cancelled) => true,
            (Pending, DocumentsRequired | UnderReview) => true,
            (DocumentsRequired, UnderReview) => true,
            (UnderReview, DocumentsRequired | Approved) => true,
            (Approved, ContractPending) => true,
            (ContractPending, Completed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move application from {current} to {requested}")]
    InvalidTransition {
        current: ApplicationStatus,
        requested: ApplicationStatus,
        /// Milestones still outstanding when `requested` is `COMPLETED`.
        missing: Vec<Milestone>,
    },
}

impl TransitionError {
    pub fn current(&self) -> ApplicationStatus {
        match self {
            TransitionError::InvalidTransition { current, .. } => *current,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MilestoneError {
    #[error("milestone {milestone:?} cannot be recorded while the application is {status}")]
    NotAllowed {
        milestone: Milestone,
        status: ApplicationStatus,
    },
}

/// Whether `actor` may request `next` on `application`.
///
/// Review decisions and contract steps belong to the owning landlord or an admin; the
/// applicant may only withdraw.
pub fn permits(actor: &Actor, application: &RentalApplication, next: ApplicationStatus) -> bool {
    if actor.is_admin() {
        return true;
    }
    let is_landlord = actor.user_id == application.landlord_id;
    match next {
        ApplicationStatus::Cancelled => {
            is_landlord || actor.user_id == application.applicant_id
        }
        ApplicationStatus::Pending => false,
        _ => is_landlord,
    }
}

/// Whether `actor` may record `milestone` by hand. The first payment is only ever
/// recorded by payment reconciliation.
pub fn permits_milestone(
    actor: &Actor,
    application: &RentalApplication,
    milestone: Milestone,
) -> bool {
    let is_applicant = actor.user_id == application.applicant_id;
    let is_landlord = actor.user_id == application.landlord_id;
    match milestone {
        Milestone::FirstPaymentCompleted => false,
        _ if actor.is_admin() => true,
        Milestone::DocumentsSubmitted | Milestone::AgreementAccepted => is_applicant,
        Milestone::ContractSigned => is_applicant || is_landlord,
        Milestone::KeysHandedOver => is_landlord,
    }
}

impl RentalApplication {
    /// Move to `next`, appending the audit entry. On error nothing changes.
    pub fn transition(
        &mut self,
        next: ApplicationStatus,
        actor: &UserId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<StatusChange, TransitionError> {
        let current = self.status;
        if !current.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                current,
                requested: next,
                missing: Vec::new(),
            });
        }
        if next == ApplicationStatus::Completed {
            let missing = self.milestones.missing_for_completion();
            if !missing.is_empty() {
                return Err(TransitionError::InvalidTransition {
                    current,
                    requested: next,
                    missing,
                });
            }
        }

        let change = StatusChange {
            from: current,
            to: next,
            actor: actor.clone(),
            at,
            note,
        };
        self.status = next;
        self.updated_at = at;
        self.history.push(change.clone());
        Ok(change)
    }

    /// Set a milestone flag. Returns `false` when it was already set.
    pub fn record_milestone(
        &mut self,
        milestone: Milestone,
        at: DateTime<Utc>,
    ) -> Result<bool, MilestoneError> {
        use ApplicationStatus::*;

        let allowed = match milestone {
            Milestone::DocumentsSubmitted => matches!(
                self.status,
                Pending | DocumentsRequired | UnderReview | Approved | ContractPending
            ),
            _ => matches!(self.status, Approved | ContractPending),
        };
        if !allowed {
            return Err(MilestoneError::NotAllowed {
                milestone,
                status: self.status,
            });
        }

        let changed = self.milestones.set(milestone);
        if changed {
            self.updated_at = at;
        }
        Ok(changed)
    }
}
