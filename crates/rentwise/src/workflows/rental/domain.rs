use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::access::UserId;

/// Identifier wrapper for rental applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for catalog properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyStatus {
    Available,
    Rented,
}

/// The catalog's view of a property, reduced to what the application workflow touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyListing {
    pub id: PropertyId,
    pub landlord_id: UserId,
    pub title: String,
    pub monthly_rent: u64,
    pub status: PropertyStatus,
    pub available: bool,
}

impl PropertyListing {
    pub fn is_available(&self) -> bool {
        self.available && self.status == PropertyStatus::Available
    }

    pub fn mark_rented(&mut self) {
        self.status = PropertyStatus::Rented;
        self.available = false;
    }

    pub fn mark_available(&mut self) {
        self.status = PropertyStatus::Available;
        self.available = true;
    }
}

/// Financial terms proposed by the tenant at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedTerms {
    pub monthly_rent: u64,
    pub deposit: u64,
    pub currency: String,
    pub lease_months: u16,
    pub move_in: NaiveDate,
}

/// Request body for a new application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationSubmission {
    pub property_id: PropertyId,
    pub terms: ProposedTerms,
    #[serde(default)]
    pub message: Option<String>,
}

/// Lifecycle status of a rental application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    DocumentsRequired,
    UnderReview,
    Approved,
    ContractPending,
    Completed,
    Rejected,
    Cancelled,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 8] = [
        ApplicationStatus::Pending,
        ApplicationStatus::DocumentsRequired,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Approved,
        ApplicationStatus::ContractPending,
        ApplicationStatus::Completed,
        ApplicationStatus::Rejected,
        ApplicationStatus::Cancelled,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::DocumentsRequired => "DOCUMENTS_REQUIRED",
            ApplicationStatus::UnderReview => "UNDER_REVIEW",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::ContractPending => "CONTRACT_PENDING",
            ApplicationStatus::Completed => "COMPLETED",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Completed | ApplicationStatus::Rejected | ApplicationStatus::Cancelled
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One-way flags tracking the hand-over checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    DocumentsSubmitted,
    ContractSigned,
    AgreementAccepted,
    FirstPaymentCompleted,
    KeysHandedOver,
}

impl Milestone {
    /// Milestones that must all be set before an application can complete.
    pub const REQUIRED_FOR_COMPLETION: [Milestone; 4] = [
        Milestone::ContractSigned,
        Milestone::AgreementAccepted,
        Milestone::FirstPaymentCompleted,
        Milestone::KeysHandedOver,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestones {
    pub documents_submitted: bool,
    pub contract_signed: bool,
    pub agreement_accepted: bool,
    pub first_payment_completed: bool,
    pub keys_handed_over: bool,
}

impl Milestones {
    pub fn is_set(&self, milestone: Milestone) -> bool {
        match milestone {
            Milestone::DocumentsSubmitted => self.documents_submitted,
            Milestone::ContractSigned => self.contract_signed,
            Milestone::AgreementAccepted => self.agreement_accepted,
            Milestone::FirstPaymentCompleted => self.first_payment_completed,
            Milestone::KeysHandedOver => self.keys_handed_over,
        }
    }

    /// Set a milestone. Returns `false` when it was already set; flags never reset.
    pub(crate) fn set(&mut self, milestone: Milestone) -> bool {
        let flag = match milestone {
            Milestone::DocumentsSubmitted => &mut self.documents_submitted,
            Milestone::ContractSigned => &mut self.contract_signed,
            Milestone::AgreementAccepted => &mut self.agreement_accepted,
            Milestone::FirstPaymentCompleted => &mut self.first_payment_completed,
            Milestone::KeysHandedOver => &mut self.keys_handed_over,
        };
        let changed = !*flag;
        *flag = true;
        changed
    }

    pub fn missing_for_completion(&self) -> Vec<Milestone> {
        Milestone::REQUIRED_FOR_COMPLETION
            .into_iter()
            .filter(|milestone| !self.is_set(*milestone))
            .collect()
    }
}

/// Audit entry appended on every status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub actor: UserId,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Rental application record. Status and history only change through
/// [`RentalApplication::transition`]; the history is append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalApplication {
    pub id: ApplicationId,
    pub property_id: PropertyId,
    pub applicant_id: UserId,
    pub landlord_id: UserId,
    pub terms: ProposedTerms,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub(crate) status: ApplicationStatus,
    pub(crate) milestones: Milestones,
    pub(crate) history: Vec<StatusChange>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the repository on every commit.
    pub version: u64,
}

impl RentalApplication {
    pub fn new(
        id: ApplicationId,
        property: &PropertyListing,
        applicant_id: UserId,
        submission: ApplicationSubmission,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            property_id: property.id.clone(),
            applicant_id,
            landlord_id: property.landlord_id.clone(),
            terms: submission.terms,
            message: submission.message,
            status: ApplicationStatus::Pending,
            milestones: Milestones::default(),
            history: Vec::new(),
            submitted_at: at,
            updated_at: at,
            version: 0,
        }
    }

    pub fn status(&self) -> ApplicationStatus {
        self.status
    }

    pub fn milestones(&self) -> &Milestones {
        &self.milestones
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn is_party(&self, user_id: &UserId) -> bool {
        &self.applicant_id == user_id || &self.landlord_id == user_id
    }
}
