//! Centralized Error Handling Module
//!
//! Every failure surfaced to a caller carries a coarse string code and an
//! HTTP status. Codes are the contract with the browser client; messages are
//! for humans and may change.
//!
//! - UNAUTHORIZED / FORBIDDEN: session problems
//! - VALIDATION_ERROR / NOT_FOUND: bad input
//! - PAYMENT_FAILED / STATUS_CHECK_FAILED: gateway said no
//! - SERVER_ERROR: everything else

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use tracing::error;

use crate::api::types::{ApiError, ApiResponse};

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Error code surfaced to clients
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error codes returned in the `error.code` field of API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Missing, expired or invalid session / OTP
    Unauthorized,
    /// Authenticated but not allowed
    Forbidden,
    /// Missing or malformed input
    ValidationError,
    /// Resource not found
    NotFound,
    /// Status change not allowed from the current state
    InvalidTransition,
    /// Transaction reference already settled (only when rejection is enabled)
    DuplicateSettlement,
    /// Liquidation exceeds available funds
    InsufficientFunds,
    /// Too many requests
    RateLimited,
    /// Gateway refused or failed the debit
    PaymentFailed,
    /// Gateway status lookup failed
    StatusCheckFailed,
    /// Mail provider rejected the message
    MailFailed,
    /// Anything else
    ServerError,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::DuplicateSettlement => "DUPLICATE_SETTLEMENT",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::RateLimited => "RATE_LIMITED",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::StatusCheckFailed => "STATUS_CHECK_FAILED",
            Self::MailFailed => "MAIL_FAILED",
            Self::ServerError => "SERVER_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::InvalidTransition | Self::DuplicateSettlement | Self::InsufficientFunds => 409,
            Self::RateLimited => 429,
            Self::PaymentFailed | Self::StatusCheckFailed | Self::MailFailed => 502,
            Self::ServerError => 500,
        }
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, msg)
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidTransition, msg)
    }

    pub fn payment_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::PaymentFailed, msg)
    }

    pub fn status_check_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StatusCheckFailed, msg)
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::ServerError, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::ServerError, "IO error", err)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::not_found("Record not found"),
            other => Self::with_source(ErrorCode::ServerError, "Database error", other),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::ServerError, "Upstream request timed out")
        } else if err.is_connect() {
            Self::new(ErrorCode::ServerError, "Upstream connection failed")
        } else {
            Self::new(ErrorCode::ServerError, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::ServerError, "JSON parse error", err)
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        Self::with_source(ErrorCode::ServerError, "CSV export error", err)
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(err: rust_decimal::Error) -> Self {
        Self::with_source(ErrorCode::ServerError, "Stored amount is not a decimal", err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.code == ErrorCode::ServerError {
            error!(code = self.code_str(), source = ?self.source, "❌ {}", self.message);
        }

        let status =
            StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiResponse::error(
            ApiError {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: None,
            },
            0.0,
        );

        (status, Json(body)).into_response()
    }
}
