use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use super::domain::TransactionRef;
use super::gateway::GatewayStatus;
use crate::config::Secret;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(alias = "trx_ref")]
    tx_ref: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    event: Option<String>,
}

/// Asynchronous payment notification pushed by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub tx_ref: TransactionRef,
    pub status: Option<String>,
    pub event: Option<String>,
    /// Payload exactly as received; stored on the payment when the event applies.
    pub raw: Value,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_slice(body)?;
        let parsed = WebhookBody::deserialize(&raw)?;
        Ok(Self {
            tx_ref: TransactionRef(parsed.tx_ref.trim().to_string()),
            status: parsed.status,
            event: parsed.event,
            raw,
        })
    }

    /// Outcome reported by the event. An explicit `status` wins over the suffix of an
    /// event name such as `charge.success`.
    pub fn gateway_status(&self) -> Option<GatewayStatus> {
        self.status
            .as_deref()
            .and_then(GatewayStatus::parse)
            .or_else(|| {
                self.event
                    .as_deref()
                    .and_then(|event| event.rsplit('.').next())
                    .and_then(GatewayStatus::parse)
            })
    }
}

pub fn sign_body(secret: &Secret, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.expose().as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of `signature` (hex) against the body's HMAC.
pub fn verify_signature(secret: &Secret, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret.expose().as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
