//! API Route Configuration

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::admin;
use super::handlers::{self, AppState};
use super::middleware::{logging_middleware, rate_limit_middleware, require_admin, require_session};

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // No session needed
    let public = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/auth/request-otp", post(handlers::request_otp))
        .route("/api/auth/verify-otp", post(handlers::verify_otp));

    // Any logged-in user; ownership is checked per handler
    let session = Router::new()
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/me", get(handlers::get_me).put(handlers::update_me))
        .route(
            "/api/registrations",
            post(handlers::create_registration).get(handlers::list_registrations),
        )
        .route("/api/registrations/:id", get(handlers::get_registration))
        .route("/api/process-payment", post(handlers::process_payment))
        .route("/api/check-payment-status", get(handlers::check_payment_status))
        .route("/api/payments/track/:reference", get(handlers::track_payment))
        .route("/api/save-payment", post(handlers::save_payment))
        .route("/api/send-payment-email", post(handlers::send_payment_email))
        // Organizer/admin; roles enforced by the liquidation service
        .route(
            "/api/liquidations",
            post(admin::create_liquidation).get(admin::list_liquidations),
        )
        .route("/api/liquidations/:id", get(admin::get_liquidation))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let admin_only = Router::new()
        .route("/api/admin/summary", get(admin::admin_summary))
        .route("/api/admin/registrations", get(admin::admin_registrations))
        .route("/api/admin/registrations/:id/cancel", post(admin::cancel_registration))
        .route("/api/admin/payments", get(admin::admin_payments))
        .route("/api/admin/export/registrations.csv", get(admin::export_csv))
        .route("/api/admin/export/registrations.pdf", get(admin::export_pdf))
        .route("/api/liquidations/:id/approve", post(admin::approve_liquidation))
        .route("/api/liquidations/:id/reject", post(admin::reject_liquidation))
        .route("/api/liquidations/:id/process", post(admin::process_liquidation))
        // Layers run bottom-up: session first, then the admin check
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .merge(public)
        .merge(session)
        .merge(admin_only)
        .with_state(state)
        // Middleware (order matters - bottom runs first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(rate_limit_middleware))
}
