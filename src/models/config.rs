//! Configuration module for the REI 25 portal
//!
//! Everything is read from the environment once at startup. Missing values
//! fall back to the defaults in `utils::constants` and the fallback is
//! logged; secrets are never logged.

use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::types::Role;
use crate::utils::constants::{
    DEFAULT_GATEWAY_TIMEOUT_SECS, DEFAULT_OTP_MAX_ATTEMPTS, DEFAULT_OTP_RATE_LIMIT,
    DEFAULT_OTP_TTL_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SESSION_TTL_SECS,
};

/// Payment gateway connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the mobile-money proxy, without trailing slash
    pub base_url: String,
    /// Service token; when unset the caller's session token is forwarded
    pub api_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Server-side status polling
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls until a terminal status or cancellation
    pub max_attempts: Option<u32>,
}

/// OTP login and session settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub otp_ttl: Duration,
    pub otp_max_attempts: u32,
    pub session_ttl: Duration,
    pub otp_rate_limit: u32,
    pub admin_emails: HashSet<String>,
    pub organizer_emails: HashSet<String>,
}

impl AuthConfig {
    /// Role granted to an email at login
    pub fn role_for(&self, email: &str) -> Role {
        if self.admin_emails.contains(email) {
            Role::Admin
        } else if self.organizer_emails.contains(email) {
            Role::Organizer
        } else {
            Role::Member
        }
    }
}

/// Outbound mail settings
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// HTTP mail API endpoint; `None` logs mail instead of sending it
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub gateway: GatewayConfig,
    pub poll: PollConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
    /// Reject a second settlement for an already-recorded reference
    pub reject_duplicate_settlements: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        // Hosting platforms set PORT; REI_PORT is for local runs
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| try_load("REI_PORT", 8080));

        let gateway_base_url = std::env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| {
            warn!("⚠️  GATEWAY_BASE_URL not set, payments will fail until it is configured");
            "http://localhost:4000".to_string()
        });

        let mail_api_url = optional("MAIL_API_URL");
        if mail_api_url.is_none() {
            info!("📭 MAIL_API_URL not set, outgoing mail is dropped (recipient and subject logged)");
        }

        Self {
            host: std::env::var("REI_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "rei25.db".to_string()),
            gateway: GatewayConfig {
                base_url: gateway_base_url.trim_end_matches('/').to_string(),
                api_token: optional("GATEWAY_API_TOKEN"),
                timeout: Duration::from_secs(try_load(
                    "GATEWAY_TIMEOUT_SECS",
                    DEFAULT_GATEWAY_TIMEOUT_SECS,
                )),
            },
            poll: PollConfig {
                interval: Duration::from_secs(try_load(
                    "POLL_INTERVAL_SECS",
                    DEFAULT_POLL_INTERVAL_SECS,
                )),
                max_attempts: optional("POLL_MAX_ATTEMPTS").and_then(|v| v.parse().ok()),
            },
            auth: AuthConfig {
                otp_ttl: Duration::from_secs(try_load("OTP_TTL_SECS", DEFAULT_OTP_TTL_SECS)),
                otp_max_attempts: try_load("OTP_MAX_ATTEMPTS", DEFAULT_OTP_MAX_ATTEMPTS),
                session_ttl: Duration::from_secs(try_load(
                    "SESSION_TTL_SECS",
                    DEFAULT_SESSION_TTL_SECS,
                )),
                otp_rate_limit: try_load("OTP_RATE_LIMIT", DEFAULT_OTP_RATE_LIMIT),
                admin_emails: email_list("ADMIN_EMAILS"),
                organizer_emails: email_list("ORGANIZER_EMAILS"),
            },
            mail: MailConfig {
                api_url: mail_api_url,
                api_key: optional("MAIL_API_KEY"),
                from: std::env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "REI 25 <no-reply@rei25.org>".to_string()),
            },
            reject_duplicate_settlements: try_load("REJECT_DUPLICATE_SETTLEMENTS", false),
        }
    }

    /// Configuration for tests and local tooling: in-memory database, fast
    /// polling, no outbound mail.
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_path: ":memory:".to_string(),
            gateway: GatewayConfig {
                base_url: "http://gateway.test".to_string(),
                api_token: None,
                timeout: Duration::from_secs(5),
            },
            poll: PollConfig {
                interval: Duration::from_millis(10),
                max_attempts: None,
            },
            auth: AuthConfig {
                otp_ttl: Duration::from_secs(DEFAULT_OTP_TTL_SECS),
                otp_max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
                session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
                otp_rate_limit: DEFAULT_OTP_RATE_LIMIT,
                admin_emails: HashSet::new(),
                organizer_emails: HashSet::new(),
            },
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "REI 25 <no-reply@rei25.test>".to_string(),
            },
            reject_duplicate_settlements: false,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value ({e}), using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn email_list(key: &str) -> HashSet<String> {
    parse_email_list(&std::env::var(key).unwrap_or_default())
}

/// Split a comma separated list into normalised (trimmed, lower-case) emails
pub fn parse_email_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_list() {
        let list = parse_email_list(" Admin@REI.org, ,finance@rei.org ");
        assert_eq!(list.len(), 2);
        assert!(list.contains("admin@rei.org"));
        assert!(list.contains("finance@rei.org"));
    }

    #[test]
    fn test_role_for() {
        let mut auth = AppConfig::for_testing().auth;
        auth.admin_emails.insert("boss@rei.org".to_string());
        auth.organizer_emails.insert("org@rei.org".to_string());

        assert_eq!(auth.role_for("boss@rei.org"), Role::Admin);
        assert_eq!(auth.role_for("org@rei.org"), Role::Organizer);
        assert_eq!(auth.role_for("someone@rei.org"), Role::Member);
    }
}
