//! Outbound Mail
//!
//! Mail goes through an HTTP mail API (JSON `{from, to, subject, html,
//! text}` with a bearer key). Without an API URL configured, only the
//! recipient and subject are logged. Bodies carry login codes and never
//! reach the log.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{AppError, AppResult, ErrorCode, MailConfig};
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

/// A rendered message
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> AppResult<()>;
}

/// Pick the mailer implied by configuration
pub fn mailer_from_config(config: &MailConfig) -> AppResult<Arc<dyn Mailer>> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(
            url.clone(),
            config.api_key.clone(),
            config.from.clone(),
        )?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

// ============================================
// HTTP mail API
// ============================================

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(url: String, api_key: Option<String>, from: String) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::server(format!("Failed to build mail client: {}", e)))?;

        Ok(Self {
            client,
            url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> AppResult<()> {
        let body = OutgoingMail {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            AppError::with_source(ErrorCode::MailFailed, "Mail provider unreachable", e)
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            warn!(http_status = status, "📧 Mail provider rejected message: {}", detail);
            return Err(AppError::new(
                ErrorCode::MailFailed,
                format!("Mail provider responded with HTTP {}", status),
            ));
        }

        info!(to = %email.to, "📧 Mail sent");
        Ok(())
    }
}

// ============================================
// Log-only mailer
// ============================================

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> AppResult<()> {
        info!(to = %email.to, subject = %email.subject, "📭 Mail not sent (no MAIL_API_URL)");
        Ok(())
    }
}

// ============================================
// In-memory outbox
// ============================================

/// Keeps every message in memory instead of sending it. Used by tests and
/// by offline tooling.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails with MAIL_FAILED
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, to: &str) -> Vec<Email> {
        self.sent().into_iter().filter(|e| e.to == to).collect()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: Email) -> AppResult<()> {
        if self.fail {
            return Err(AppError::new(ErrorCode::MailFailed, "Mail disabled"));
        }
        self.sent
            .lock()
            .map_err(|_| AppError::server("Outbox lock poisoned"))?
            .push(email);
        Ok(())
    }
}
