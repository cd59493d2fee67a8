//! Mobile-Money Payment Gateway Client
//!
//! Thin HTTP client for the third-party payment proxy:
//! - `POST /process-payment {amount, phoneNumber}` starts a debit
//! - `GET /check-payment-status?internal_reference=` reports its outcome
//!
//! Both calls carry a bearer token. No retries: every failure is returned
//! to the caller as-is, classified into the portal's error codes.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{AppError, AppResult, GatewayConfig};
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

// ============================================
// Wire types
// ============================================

/// Debit request body sent to the gateway
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub phone_number: String,
}

/// Gateway acknowledgement of a pending debit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebitAccepted {
    pub internal_reference: String,
    #[serde(default)]
    pub customer_reference: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Transaction state as seen by the portal.
/// Gateway `pending` (and anything unrecognised) is `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Processing,
    Success,
    Failed,
}

impl GatewayStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" | "successful" | "completed" => Self::Success,
            "failed" | "failure" | "rejected" | "cancelled" => Self::Failed,
            "pending" | "processing" => Self::Processing,
            other => {
                warn!("⚠️ Unrecognised gateway status '{}', treating as processing", other);
                Self::Processing
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// Result of one status lookup
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: GatewayStatus,
    /// Gateway payload passed through untouched
    pub data: Value,
}

impl StatusReport {
    /// Best-effort human reason from the gateway payload
    pub fn reason(&self) -> Option<String> {
        ["message", "reason", "error", "description"]
            .iter()
            .find_map(|k| self.data.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    }

    /// Customer-facing reference, when the gateway includes one
    pub fn customer_reference(&self) -> Option<String> {
        self.data
            .get("customerReference")
            .or_else(|| self.data.get("customer_reference"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    status: String,
    #[serde(default)]
    data: Value,
}

// ============================================
// Gateway abstraction
// ============================================

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submit a debit; returns the references identifying it
    async fn process_payment(&self, request: &DebitRequest, bearer: &str)
        -> AppResult<DebitAccepted>;

    /// Look up the current state of a debit
    async fn check_status(&self, internal_reference: &str, bearer: &str)
        -> AppResult<StatusReport>;
}

/// reqwest-backed gateway client
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> AppResult<Self> {
        Ok(Self {
            client: Self::build_client(config.timeout)?,
            base_url: config.base_url.clone(),
        })
    }

    fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| AppError::server(format!("Failed to build gateway client: {}", e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn process_payment(
        &self,
        request: &DebitRequest,
        bearer: &str,
    ) -> AppResult<DebitAccepted> {
        info!(amount = %request.amount, "📤 Submitting debit to gateway");

        let response = self
            .client
            .post(self.url("process-payment"))
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(status, &body, |m| AppError::payment_failed(m)));
        }

        let accepted = parse_accepted(&body)?;
        info!(
            internal_reference = %accepted.internal_reference,
            provider = accepted.provider.as_deref().unwrap_or("unknown"),
            "✅ Gateway accepted debit"
        );
        Ok(accepted)
    }

    async fn check_status(
        &self,
        internal_reference: &str,
        bearer: &str,
    ) -> AppResult<StatusReport> {
        let response = self
            .client
            .get(self.url("check-payment-status"))
            .query(&[("internal_reference", internal_reference)])
            .bearer_auth(bearer)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(status, &body, |m| AppError::status_check_failed(m)));
        }

        let report = parse_status(&body)?;
        debug!(internal_reference, status = ?report.status, "🔎 Gateway status");
        Ok(report)
    }
}

// ============================================
// Response handling
// ============================================

/// 401 from the gateway is the caller's problem; any other non-2xx becomes
/// the endpoint-specific failure carrying the gateway's own message.
fn classify_failure(
    status: StatusCode,
    body: &str,
    on_failure: fn(String) -> AppError,
) -> AppError {
    let message = gateway_message(body).unwrap_or_else(|| {
        format!("Gateway responded with HTTP {}", status.as_u16())
    });
    warn!(http_status = status.as_u16(), "❌ Gateway error: {}", message);

    if status == StatusCode::UNAUTHORIZED {
        AppError::unauthorized(message)
    } else {
        on_failure(message)
    }
}

/// Pull `message` / `error` out of a JSON error body, or use the raw text
fn gateway_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => ["message", "error", "detail"]
            .iter()
            .find_map(|k| json.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| Some(trimmed.to_string())),
        Err(_) => Some(trimmed.to_string()),
    }
}

/// Accepts the bare `{internalReference, ...}` shape as well as one wrapped
/// in a `data` envelope.
pub fn parse_accepted(body: &str) -> AppResult<DebitAccepted> {
    let json: Value = serde_json::from_str(body)
        .map_err(|_| AppError::payment_failed("Gateway returned a non-JSON response"))?;
    let payload = match json.get("data") {
        Some(inner) if inner.get("internalReference").is_some() => inner.clone(),
        _ => json,
    };
    serde_json::from_value(payload)
        .map_err(|_| AppError::payment_failed("Gateway response is missing internalReference"))
}

pub fn parse_status(body: &str) -> AppResult<StatusReport> {
    let raw: RawStatus = serde_json::from_str(body)
        .map_err(|_| AppError::status_check_failed("Gateway returned an unreadable status"))?;
    Ok(StatusReport {
        status: GatewayStatus::from_wire(&raw.status),
        data: raw.data,
    })
}
