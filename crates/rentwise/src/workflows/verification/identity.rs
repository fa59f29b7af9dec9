use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::exchange::RawIdentity;
use crate::access::UserAccount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Pending,
    Verified,
    Rejected,
    Expired,
}

/// Provider-confirmed identity attached to a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub external_id: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub status: KycStatus,
    pub raw: Value,
    pub verified_at: DateTime<Utc>,
}

/// Normalize provider claims into the platform identity record.
///
/// Attributes the provider leaves out fall back to what the account already holds.
/// Only reached after both back-channel calls succeeded, so the result is always
/// `VERIFIED`.
pub fn map_identity(
    raw: &RawIdentity,
    previous: &UserAccount,
    verified_at: DateTime<Utc>,
) -> VerifiedIdentity {
    let external_id = first_claim(raw, &["sub", "individual_id", "id"]);

    let full_name = first_claim(raw, &["name", "full_name"])
        .or_else(|| {
            let given = raw.claim("given_name");
            let family = raw.claim("family_name");
            match (given, family) {
                (Some(given), Some(family)) => Some(format!("{given} {family}")),
                (Some(given), None) => Some(given.to_string()),
                (None, Some(family)) => Some(family.to_string()),
                (None, None) => None,
            }
        })
        .or_else(|| previous.display_name.clone());

    let phone = first_claim(raw, &["phone_number", "phone", "mobile"])
        .map(|phone| normalize_phone(&phone))
        .or_else(|| previous.phone.clone());

    VerifiedIdentity {
        external_id,
        full_name,
        phone,
        status: KycStatus::Verified,
        raw: raw.claims.clone(),
        verified_at,
    }
}

fn first_claim(raw: &RawIdentity, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| raw.claim(name))
        .map(str::to_string)
}

fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '+')
        .collect()
}
