//! Email OTP Authentication
//!
//! Login is passwordless: a 6-digit code is mailed to the address and
//! exchanged for an opaque session token. Codes are kept only as SHA-256
//! digests, are single-use, expire after their TTL and are revoked after
//! too many wrong guesses. Sessions live in memory, so a restart logs
//! everybody out.

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::notifications;
use crate::models::{AppError, AppResult, AuthConfig, Registrant, Role};
use crate::providers::Mailer;
use crate::store::Store;
use crate::utils::cache::TtlCache;
use crate::utils::constants::{is_plausible_email, OTP_LENGTH};

#[derive(Debug, Clone)]
struct PendingOtp {
    digest: String,
    attempts: u32,
}

/// Authenticated caller, attached to requests by the session middleware
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(skip)]
    pub token: String,
    pub email: String,
    pub role: Role,
    pub registrant_id: i64,
}

impl Session {
    /// Admins may act on anything; everyone else only on what they own
    pub fn can_access(&self, owner_registrant_id: i64) -> bool {
        self.role.is_admin() || self.registrant_id == owner_registrant_id
    }
}

pub struct AuthService {
    otps: TtlCache<PendingOtp>,
    sessions: TtlCache<Session>,
    config: AuthConfig,
    store: Arc<Store>,
    mailer: Arc<dyn Mailer>,
}

/// Trim, lower-case and shape-check an email address
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("email is required"));
    }
    if !is_plausible_email(&email) {
        return Err(AppError::validation("email is not a valid address"));
    }
    Ok(email)
}

fn digest(email: &str, code: &str) -> String {
    hex::encode(Sha256::digest(format!("{}:{}", email, code).as_bytes()))
}

fn generate_code() -> String {
    let max = 10u32.pow(OTP_LENGTH as u32);
    format!("{:0width$}", rand::thread_rng().gen_range(0..max), width = OTP_LENGTH)
}

impl AuthService {
    pub fn new(config: AuthConfig, store: Arc<Store>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            otps: TtlCache::new("otp", config.otp_ttl),
            sessions: TtlCache::new("session", config.session_ttl),
            config,
            store,
            mailer,
        }
    }

    /// Generate and mail a fresh code, replacing any earlier one
    pub async fn issue_otp(&self, email: &str) -> AppResult<()> {
        let code = generate_code();
        self.otps.set(
            email,
            PendingOtp {
                digest: digest(email, &code),
                attempts: 0,
            },
        );

        let ttl_minutes = (self.config.otp_ttl.as_secs() / 60).max(1);
        if let Err(e) = self
            .mailer
            .send(notifications::otp_email(email, &code, ttl_minutes))
            .await
        {
            self.otps.invalidate(email);
            return Err(e);
        }

        info!(email = %email, "🔑 OTP issued");
        Ok(())
    }

    /// Exchange a code for a session. The code is consumed on success.
    pub fn verify_otp(&self, email: &str, code: &str) -> AppResult<(Session, Registrant)> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::validation("otp is required"));
        }

        let expected = digest(email, code);
        let max_attempts = self.config.otp_max_attempts;
        let verdict = self.otps.update(email, |pending| {
            if pending.digest == expected {
                Ok(())
            } else {
                pending.attempts += 1;
                Err(pending.attempts)
            }
        });

        match verdict {
            None => return Err(AppError::unauthorized("OTP expired or not requested")),
            Some(Err(attempts)) if attempts >= max_attempts => {
                self.otps.invalidate(email);
                warn!(email = %email, attempts, "🚫 OTP revoked after too many attempts");
                return Err(AppError::unauthorized(
                    "Too many incorrect attempts, request a new code",
                ));
            }
            Some(Err(attempts)) => {
                warn!(email = %email, attempts, "❌ Incorrect OTP");
                return Err(AppError::unauthorized("Incorrect OTP"));
            }
            Some(Ok(())) => {}
        }

        // Consume; a concurrent verify of the same code loses here
        if self.otps.take(email).is_none() {
            return Err(AppError::unauthorized("OTP expired or not requested"));
        }

        let registrant = self.store.upsert_registrant(email, self.config.role_for(email))?;
        let session = self.create_session(&registrant);
        info!(email = %email, role = %registrant.role, "✅ Login");
        Ok((session, registrant))
    }

    pub fn create_session(&self, registrant: &Registrant) -> Session {
        let session = Session {
            token: uuid::Uuid::new_v4().simple().to_string(),
            email: registrant.email.clone(),
            role: registrant.role,
            registrant_id: registrant.id,
        };
        self.sessions.set(&session.token, session.clone());
        session
    }

    pub fn session(&self, token: &str) -> AppResult<Session> {
        self.sessions
            .get(token)
            .ok_or_else(|| AppError::unauthorized("Session expired or invalid"))
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.invalidate(token)
    }

    /// Drop expired codes and sessions
    pub fn cleanup_expired(&self) -> usize {
        self.otps.cleanup_expired() + self.sessions.cleanup_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppConfig, ErrorCode};
    use crate::providers::MemoryMailer;
    use crate::utils::log_capture::CapturedLogs;
    use std::time::Duration;

    fn service(config: AuthConfig) -> (AuthService, Arc<MemoryMailer>) {
        let store = Arc::new(Store::in_memory().unwrap());
        let mailer = Arc::new(MemoryMailer::new());
        (AuthService::new(config, store, mailer.clone()), mailer)
    }

    /// The code is the only six-digit word in the body
    fn mailed_code(mailer: &MemoryMailer, email: &str) -> String {
        let sent = mailer.sent_to(email);
        let text = &sent.last().unwrap().text;
        text.split(|c: char| !c.is_ascii_digit())
            .find(|word| word.len() == OTP_LENGTH)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@REI.ug ").unwrap(), "jane@rei.ug");
        assert_eq!(normalize_email("").unwrap_err().code, ErrorCode::ValidationError);
        assert!(normalize_email("not-an-email").is_err());
    }

    #[test]
    fn test_code_shape() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), OTP_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_login_flow_and_single_use() {
        let (auth, mailer) = service(AppConfig::for_testing().auth);
        auth.issue_otp("jane@rei.ug").await.unwrap();
        let code = mailed_code(&mailer, "jane@rei.ug");

        let (session, registrant) = auth.verify_otp("jane@rei.ug", &code).unwrap();
        assert_eq!(session.email, "jane@rei.ug");
        assert_eq!(registrant.role, Role::Member);
        assert_eq!(session.token.len(), 32);
        assert_eq!(auth.session(&session.token).unwrap().registrant_id, registrant.id);

        let err = auth.verify_otp("jane@rei.ug", &code).unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous_code() {
        let (auth, mailer) = service(AppConfig::for_testing().auth);
        auth.issue_otp("jane@rei.ug").await.unwrap();
        let first = mailed_code(&mailer, "jane@rei.ug");
        auth.issue_otp("jane@rei.ug").await.unwrap();
        let second = mailed_code(&mailer, "jane@rei.ug");

        if first != second {
            assert!(auth.verify_otp("jane@rei.ug", &first).is_err());
        }
        assert!(auth.verify_otp("jane@rei.ug", &second).is_ok());
    }

    #[tokio::test]
    async fn test_revoked_after_max_attempts() {
        let mut config = AppConfig::for_testing().auth;
        config.otp_max_attempts = 3;
        let (auth, mailer) = service(config);
        auth.issue_otp("jane@rei.ug").await.unwrap();
        let code = mailed_code(&mailer, "jane@rei.ug");
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..3 {
            assert!(auth.verify_otp("jane@rei.ug", wrong).is_err());
        }
        // Even the right code is gone now
        assert!(auth.verify_otp("jane@rei.ug", &code).is_err());
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let mut config = AppConfig::for_testing().auth;
        config.otp_ttl = Duration::from_millis(10);
        let (auth, mailer) = service(config);
        auth.issue_otp("jane@rei.ug").await.unwrap();
        let code = mailed_code(&mailer, "jane@rei.ug");

        tokio::time::sleep(Duration::from_millis(30)).await;
        let err = auth.verify_otp("jane@rei.ug", &code).unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_admin_role_from_config() {
        let mut config = AppConfig::for_testing().auth;
        config.admin_emails.insert("boss@rei.ug".to_string());
        let (auth, mailer) = service(config);
        auth.issue_otp("boss@rei.ug").await.unwrap();
        let code = mailed_code(&mailer, "boss@rei.ug");

        let (session, _) = auth.verify_otp("boss@rei.ug", &code).unwrap();
        assert_eq!(session.role, Role::Admin);
        assert!(session.can_access(999));
    }

    #[tokio::test]
    async fn test_revoke_session() {
        let (auth, mailer) = service(AppConfig::for_testing().auth);
        auth.issue_otp("jane@rei.ug").await.unwrap();
        let code = mailed_code(&mailer, "jane@rei.ug");
        let (session, _) = auth.verify_otp("jane@rei.ug", &code).unwrap();

        assert!(auth.revoke(&session.token));
        assert!(auth.session(&session.token).is_err());
    }

    /// Logs like the unconfigured mailer, keeps a copy like the test outbox
    struct LoggingOutbox {
        outbox: Arc<MemoryMailer>,
    }

    #[async_trait::async_trait]
    impl Mailer for LoggingOutbox {
        async fn send(&self, email: crate::providers::Email) -> AppResult<()> {
            crate::providers::LogMailer.send(email.clone()).await?;
            self.outbox.send(email).await
        }
    }

    #[tokio::test]
    async fn test_code_never_reaches_logs() {
        let outbox = Arc::new(MemoryMailer::new());
        let auth = AuthService::new(
            AppConfig::for_testing().auth,
            Arc::new(Store::in_memory().unwrap()),
            Arc::new(LoggingOutbox {
                outbox: outbox.clone(),
            }),
        );

        let logs = CapturedLogs::default();
        let code = {
            let _guard = logs.install();
            auth.issue_otp("jane@rei.ug").await.unwrap();
            let code = mailed_code(&outbox, "jane@rei.ug");
            auth.verify_otp("jane@rei.ug", &code).unwrap();
            code
        };

        let output = logs.contents();
        assert!(output.contains("OTP issued"), "{}", output);
        assert!(output.contains("jane@rei.ug"), "{}", output);
        assert!(!output.contains(&code), "code leaked into logs: {}", output);
    }

    #[tokio::test]
    async fn test_mail_failure_discards_code() {
        let store = Arc::new(Store::in_memory().unwrap());
        let auth = AuthService::new(
            AppConfig::for_testing().auth,
            store,
            Arc::new(MemoryMailer::failing()),
        );
        let err = auth.issue_otp("jane@rei.ug").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MailFailed);
        assert!(auth.verify_otp("jane@rei.ug", "123456").is_err());
    }
}
