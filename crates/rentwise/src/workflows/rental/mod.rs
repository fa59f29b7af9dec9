//! Rental application lifecycle: submission, review decisions, contract hand-over and
//! completion, with the property taken off the market in the same step as approval.

pub mod domain;
pub mod machine;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationId, ApplicationStatus, ApplicationSubmission, Milestone, Milestones, PropertyId,
    PropertyListing, PropertyStatus, ProposedTerms, RentalApplication, StatusChange,
};
pub use machine::{permits, permits_milestone, MilestoneError, TransitionError};
pub use repository::{InMemoryRentalRepository, PropertyWrite, RentalCommit, RentalRepository};
pub use router::rental_router;
pub use service::{RentalApplicationService, RentalPayments, RentalServiceError};
