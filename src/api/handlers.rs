//! API Request Handlers
//!
//! Auth, profile, registration and payment endpoints. Admin and
//! liquidation endpoints live in `admin.rs`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Json, Path, Query, State,
    },
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

use super::middleware::{RateLimitConfig, RateLimiter};
use super::types::*;
use crate::core::auth::normalize_email;
use crate::core::{
    AuthService, LiquidationService, PaymentTracker, ProfileUpdate, RegistrationForm,
    RegistrationService, Session, SettlementReceipt, SettlementRecorder, SettlementRequest,
    StatusPoller, TrackRequest, TrackedPayment,
};
use crate::models::{AppConfig, AppError, AppResult, Registrant, Registration, RegistrationStatus};
use crate::providers::{DebitRequest, Mailer, PaymentGateway, StatusReport};
use crate::store::Store;
use crate::utils::constants::{
    normalize_phone, CLEANUP_INTERVAL_SECS, METHOD_MOBILE_MONEY, OTP_RATE_WINDOW_SECS,
    TRACKER_RETENTION_SECS,
};

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub auth: Arc<AuthService>,
    pub registrations: RegistrationService,
    pub recorder: Arc<SettlementRecorder>,
    pub tracker: Arc<PaymentTracker>,
    pub liquidations: LiquidationService,
    /// OTP requests per email
    pub otp_limiter: Arc<RateLimiter>,
    pub start_time: Instant,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<Store>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let auth = Arc::new(AuthService::new(
            config.auth.clone(),
            store.clone(),
            mailer.clone(),
        ));
        let recorder = Arc::new(SettlementRecorder::new(
            store.clone(),
            mailer.clone(),
            config.reject_duplicate_settlements,
        ));
        let poller = Arc::new(StatusPoller::new(gateway.clone(), &config.poll));
        let tracker = Arc::new(PaymentTracker::new(poller, recorder.clone(), shutdown_rx));
        let otp_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            requests_per_window: config.auth.otp_rate_limit,
            window_duration: Duration::from_secs(OTP_RATE_WINDOW_SECS),
        }));

        // Background task: sweep expired codes, sessions and finished trackers
        let (auth_c, tracker_c, limiter_c) = (auth.clone(), tracker.clone(), otp_limiter.clone());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let removed = auth_c.cleanup_expired()
                    + tracker_c.cleanup_finished(Duration::from_secs(TRACKER_RETENTION_SECS))
                    + limiter_c.cleanup();
                if removed > 0 {
                    info!("🧹 Cleanup: {} expired entries removed", removed);
                }
            }
        });

        Self {
            registrations: RegistrationService::new(store.clone(), mailer.clone()),
            liquidations: LiquidationService::new(store.clone(), mailer),
            config,
            store,
            gateway,
            auth,
            recorder,
            tracker,
            otp_limiter,
            start_time: Instant::now(),
            shutdown,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Stop every server-side poll
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Token presented to the gateway: the service token when configured,
    /// otherwise the caller's own session token.
    pub fn gateway_bearer(&self, session: &Session) -> String {
        self.config
            .gateway
            .api_token
            .clone()
            .unwrap_or_else(|| session.token.clone())
    }
}

// ============================================
// Helpers
// ============================================

pub type ApiResult<T> = AppResult<Json<ApiResponse<T>>>;

pub(crate) fn ok<T: Serialize>(data: T, start: Instant) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(
        data,
        start.elapsed().as_secs_f64() * 1000.0,
    ))
}

/// Unwrap a JSON body, turning malformed input into VALIDATION_ERROR
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| AppError::validation(e.body_text()))
}

pub(crate) fn id_param(path: Result<Path<i64>, PathRejection>) -> AppResult<i64> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::validation("id must be a number"))
}

/// Load a registration the caller owns (or any, for admins)
fn owned_registration(state: &AppState, session: &Session, id: i64) -> AppResult<Registration> {
    let registration = state.store.registration(id)?;
    if !session.can_access(registration.registrant_id) {
        return Err(AppError::forbidden("Not your registration"));
    }
    Ok(registration)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_payment_trackers: state.tracker.active(),
    };

    ok(data, start)
}

// ============================================
// Auth
// ============================================

pub async fn request_otp(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RequestOtpBody>, JsonRejection>,
) -> ApiResult<MessageData> {
    let start = Instant::now();
    let req = body(payload)?;
    let email = normalize_email(req.email.as_deref().unwrap_or(""))?;

    state.otp_limiter.enforce(&email)?;
    state.auth.issue_otp(&email).await?;

    Ok(ok(MessageData::new(format!("A login code was sent to {}", email)), start))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyOtpBody>, JsonRejection>,
) -> ApiResult<LoginData> {
    let start = Instant::now();
    let req = body(payload)?;
    let email = normalize_email(req.email.as_deref().unwrap_or(""))?;
    let (session, registrant) = state
        .auth
        .verify_otp(&email, req.otp.as_deref().unwrap_or(""))?;

    Ok(ok(
        LoginData {
            token: session.token,
            expires_in: state.config.auth.session_ttl.as_secs(),
            registrant,
        },
        start,
    ))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<MessageData> {
    let start = Instant::now();
    state.auth.revoke(&session.token);
    info!(email = %session.email, "👋 Logout");
    Ok(ok(MessageData::new("Logged out"), start))
}

// ============================================
// Profile
// ============================================

pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Registrant> {
    let start = Instant::now();
    Ok(ok(state.store.registrant(session.registrant_id)?, start))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Registrant> {
    let start = Instant::now();
    let update = body(payload)?;
    let registrant = state
        .registrations
        .update_profile(session.registrant_id, &update)?;
    Ok(ok(registrant, start))
}

// ============================================
// Registrations
// ============================================

pub async fn create_registration(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    payload: Result<Json<RegistrationForm>, JsonRejection>,
) -> ApiResult<Registration> {
    let start = Instant::now();
    let form = body(payload)?;
    let registration = state
        .registrations
        .register(session.registrant_id, &form)
        .await?;
    Ok(ok(registration, start))
}

pub async fn list_registrations(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Vec<Registration>> {
    let start = Instant::now();
    Ok(ok(state.store.registrations_for(session.registrant_id)?, start))
}

pub async fn get_registration(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<RegistrationDetail> {
    let start = Instant::now();
    let registration = owned_registration(&state, &session, id_param(path)?)?;
    let payments = state.store.payments_for_registration(registration.id)?;
    Ok(ok(
        RegistrationDetail {
            registration,
            payments,
        },
        start,
    ))
}

// ============================================
// Payments
// ============================================

pub async fn process_payment(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    payload: Result<Json<ProcessPaymentBody>, JsonRejection>,
) -> ApiResult<ProcessPaymentData> {
    let start = Instant::now();
    let req = body(payload)?;

    let (amount, raw_phone) = match (req.amount, trimmed(req.phone_number)) {
        (Some(amount), Some(phone)) => (amount, phone),
        _ => return Err(AppError::validation("amount and phoneNumber are required")),
    };
    if amount <= Decimal::ZERO {
        return Err(AppError::validation("amount must be greater than zero"));
    }
    let phone_number = normalize_phone(&raw_phone).ok_or_else(|| {
        AppError::validation("phoneNumber is not a valid East African mobile number")
    })?;

    let registration = match req.registration_id {
        Some(id) => {
            let registration = owned_registration(&state, &session, id)?;
            if registration.registration_status == RegistrationStatus::Cancelled {
                return Err(AppError::invalid_transition("Registration is cancelled"));
            }
            Some(registration)
        }
        None => None,
    };

    let bearer = state.gateway_bearer(&session);
    let accepted = state
        .gateway
        .process_payment(
            &DebitRequest {
                amount,
                phone_number,
            },
            &bearer,
        )
        .await?;

    info!(
        email = %session.email,
        amount = %amount,
        internal_reference = %accepted.internal_reference,
        registration_id = ?registration.as_ref().map(|r| r.id),
        "💳 Payment initiated"
    );

    let tracking = match &registration {
        Some(registration) => state.tracker.track(TrackRequest {
            internal_reference: accepted.internal_reference.clone(),
            customer_reference: accepted.customer_reference.clone(),
            registration_id: registration.id,
            registrant_id: registration.registrant_id,
            amount,
            bearer,
        }),
        None => false,
    };

    Ok(ok(
        ProcessPaymentData {
            internal_reference: accepted.internal_reference,
            customer_reference: accepted.customer_reference,
            provider: accepted.provider,
            tracking,
        },
        start,
    ))
}

pub async fn check_payment_status(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<StatusReport> {
    let start = Instant::now();
    let reference = trimmed(query.internal_reference)
        .ok_or_else(|| AppError::validation("internal_reference is required"))?;

    let report = state
        .gateway
        .check_status(&reference, &state.gateway_bearer(&session))
        .await?;
    Ok(ok(report, start))
}

pub async fn track_payment(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(reference): Path<String>,
) -> ApiResult<TrackedPayment> {
    let start = Instant::now();
    let tracked = state
        .tracker
        .get(&reference)
        .filter(|t| session.can_access(t.registrant_id))
        .ok_or_else(|| AppError::not_found(format!("No tracked payment {}", reference)))?;
    Ok(ok(tracked, start))
}

pub async fn save_payment(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    payload: Result<Json<SavePaymentBody>, JsonRejection>,
) -> ApiResult<SettlementReceipt> {
    let start = Instant::now();
    let req = body(payload)?;

    let registration_id = req
        .registration_id
        .ok_or_else(|| AppError::validation("registrationId is required"))?;
    let amount = req
        .amount
        .ok_or_else(|| AppError::validation("amount is required"))?;
    let transaction_reference = trimmed(req.transaction_reference)
        .ok_or_else(|| AppError::validation("transactionReference is required"))?;

    owned_registration(&state, &session, registration_id)?;

    let receipt = state
        .recorder
        .settle(SettlementRequest {
            registration_id,
            amount,
            transaction_reference,
            customer_reference: trimmed(req.customer_reference),
            method: trimmed(req.method).unwrap_or_else(|| METHOD_MOBILE_MONEY.to_string()),
        })
        .await?;
    Ok(ok(receipt, start))
}

pub async fn send_payment_email(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    payload: Result<Json<SendPaymentEmailBody>, JsonRejection>,
) -> ApiResult<MessageData> {
    let start = Instant::now();
    let req = body(payload)?;
    let payment_id = req
        .payment_id
        .ok_or_else(|| AppError::validation("paymentId is required"))?;

    let payment = state.store.payment(payment_id)?;
    owned_registration(&state, &session, payment.registration_id)?;
    state.recorder.send_confirmation(&payment).await?;

    Ok(ok(MessageData::new("Confirmation email sent"), start))
}
