use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::domain::TransactionRef;
use crate::config::{GatewayConfig, Secret};

/// Status vocabulary of the gateway, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
    Refunded,
}

impl GatewayStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" | "successful" | "completed" | "paid" => Some(Self::Success),
            "failed" | "failure" | "cancelled" | "canceled" | "declined" => Some(Self::Failed),
            "pending" | "processing" | "created" => Some(Self::Pending),
            "refunded" | "reversed" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// Checkout creation request sent to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub tx_ref: TransactionRef,
    /// Whole currency units, rendered as a decimal string on the wire.
    #[serde(serialize_with = "amount_as_string")]
    pub amount: u64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub callback_url: String,
    pub return_url: String,
    pub customization: CheckoutCustomization,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutCustomization {
    pub title: String,
    pub description: String,
}

fn amount_as_string<S: serde::Serializer>(amount: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&amount.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCheckout {
    pub checkout_url: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayVerification {
    /// `None` when the gateway reported a status this crate does not recognise.
    pub status: Option<GatewayStatus>,
    pub raw: Value,
}

/// Failure talking to the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway unreachable: {0}")]
    Transport(String),
    #[error("gateway rejected the request with HTTP {status}")]
    Rejected { status: u16, body: String },
    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError>;
    async fn verify(&self, tx_ref: &TransactionRef) -> Result<GatewayVerification, GatewayError>;
}

/// Hosted-checkout gateway reached over HTTPS with the merchant secret as bearer token.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    base_url: Url,
    secret_key: Secret,
    http: Client,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            secret_key: config.secret_key.clone(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn read(response: reqwest::Response) -> Result<Value, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError> {
        let url = self.endpoint("transaction/initialize")?;
        debug!(tx_ref = %request.tx_ref, "creating gateway checkout");

        let response = self
            .http
            .post(url)
            .bearer_auth(self.secret_key.expose())
            .json(request)
            .send()
            .await?;
        let raw = Self::read(response).await?;

        let checkout_url = raw
            .pointer("/data/checkout_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| GatewayError::Decode("checkout_url missing".to_string()))?
            .to_string();
        Ok(GatewayCheckout { checkout_url, raw })
    }

    async fn verify(&self, tx_ref: &TransactionRef) -> Result<GatewayVerification, GatewayError> {
        let url = self.endpoint(&format!("transaction/verify/{}", tx_ref.0))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.secret_key.expose())
            .send()
            .await?;
        let raw = Self::read(response).await?;

        let status = raw
            .pointer("/data/status")
            .and_then(Value::as_str)
            .and_then(GatewayStatus::parse);
        debug!(%tx_ref, ?status, "gateway verification answered");

        Ok(GatewayVerification { status, raw })
    }
}
