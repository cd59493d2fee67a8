//! API Request/Response Types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Payment, Registrant, Registration};

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiError, latency_ms: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// API Error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub message: String,
}

impl MessageData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================
// Auth
// ============================================

#[derive(Debug, Deserialize)]
pub struct RequestOtpBody {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpBody {
    pub email: Option<String>,
    pub otp: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub token: String,
    pub expires_in: u64,
    pub registrant: Registrant,
}

// ============================================
// Registrations
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationDetail {
    pub registration: Registration,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationFilter {
    pub payment_status: Option<String>,
}

// ============================================
// Payments
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentBody {
    pub amount: Option<Decimal>,
    pub phone_number: Option<String>,
    /// When set, the server follows the debit and settles it itself
    pub registration_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentData {
    pub internal_reference: String,
    pub customer_reference: Option<String>,
    pub provider: Option<String>,
    pub tracking: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub internal_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePaymentBody {
    pub registration_id: Option<i64>,
    pub amount: Option<Decimal>,
    pub transaction_reference: Option<String>,
    pub customer_reference: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPaymentEmailBody {
    pub payment_id: Option<i64>,
}

// ============================================
// Liquidations
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct ReviewBody {
    pub note: Option<String>,
}

// ============================================
// Health Check
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_payment_trackers: usize,
}
