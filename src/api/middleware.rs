//! API Middleware (Sessions, Rate Limiting, Logging)

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::handlers::AppState;
use crate::core::Session;
use crate::models::{AppError, AppResult, ErrorCode};
use crate::utils::constants::CLEANUP_INTERVAL_SECS;

/// Rate limiter configuration
pub struct RateLimitConfig {
    /// Requests per window
    pub requests_per_window: u32,
    /// Window duration
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 120,
            window_duration: Duration::from_secs(60),
        }
    }
}

/// Fixed-window in-memory rate limiter
pub struct RateLimiter {
    /// Request counts per key
    requests: DashMap<String, (u32, Instant)>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            requests: DashMap::new(),
            config,
        }
    }

    /// Check if request is allowed, returns (allowed, remaining, reset_seconds)
    pub fn check(&self, key: &str) -> (bool, u32, u64) {
        let now = Instant::now();

        let mut entry = self.requests.entry(key.to_string()).or_insert((0, now));

        // Reset window if expired
        if now.duration_since(entry.1) > self.config.window_duration {
            entry.0 = 0;
            entry.1 = now;
        }

        let remaining = self.config.requests_per_window.saturating_sub(entry.0);
        let reset_secs = self
            .config
            .window_duration
            .saturating_sub(now.duration_since(entry.1))
            .as_secs();

        if entry.0 >= self.config.requests_per_window {
            return (false, 0, reset_secs);
        }

        entry.0 += 1;
        (true, remaining - 1, reset_secs)
    }

    /// `check` as an error: RATE_LIMITED with the wait time
    pub fn enforce(&self, key: &str) -> AppResult<()> {
        let (allowed, _, reset) = self.check(key);
        if allowed {
            Ok(())
        } else {
            warn!(key = %key, "🚦 Rate limit exceeded");
            Err(AppError::new(
                ErrorCode::RateLimited,
                format!("Too many requests. Retry after {} seconds", reset),
            ))
        }
    }

    /// Drop windows that ended long ago
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.requests.len();
        self.requests.retain(|_, (_, timestamp)| {
            now.duration_since(*timestamp) < self.config.window_duration * 2
        });
        before - self.requests.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// Global per-client rate limiter
lazy_static::lazy_static! {
    pub static ref RATE_LIMITER: Arc<RateLimiter> = Arc::new(RateLimiter::default());
}

/// Periodically sweep the global rate limiter
pub fn start_cleanup_task() {
    tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let removed = RATE_LIMITER.cleanup();
            if removed > 0 {
                info!("🧹 Rate limiter cleanup: {} stale windows removed", removed);
            }
        }
    });
}

/// Client address: proxy headers first, then the socket peer
fn client_key(request: &Request) -> Option<String> {
    let headers = request.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

/// Rate limiting middleware. Requests whose origin cannot be determined
/// (in-process calls) are not limited.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let Some(key) = client_key(&request) else {
        return Ok(next.run(request).await);
    };

    let (allowed, remaining, reset) = RATE_LIMITER.check(&key);
    if !allowed {
        warn!(key = %key, "🚦 Rate limit exceeded");
        return Err(AppError::new(
            ErrorCode::RateLimited,
            format!("Rate limit exceeded. Retry after {} seconds", reset),
        ));
    }

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Remaining", remaining.into());
    headers.insert("X-RateLimit-Reset", reset.into());

    Ok(response)
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Resolve the bearer token into a `Session` request extension
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;
    let session = state.auth.session(&token)?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Must run inside `require_session`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let session = request
        .extensions()
        .get::<Session>()
        .ok_or_else(|| AppError::unauthorized("Missing session"))?;
    if !session.role.is_admin() {
        warn!(email = %session.email, path = %request.uri().path(), "⛔ Admin route denied");
        return Err(AppError::forbidden("Admin access required"));
    }
    Ok(next.run(request).await)
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri.path(),
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "Request completed"
    );

    response
}
