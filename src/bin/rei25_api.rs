//! REI 25 Portal API Server
//!
//! Usage:
//!   cargo run --bin rei25_api
//!
//! Environment:
//!   PORT / REI_PORT   - Server port (default: 8080)
//!   REI_HOST          - Server host (default: 0.0.0.0)
//!   DATABASE_PATH     - SQLite file (default: rei25.db)
//!   GATEWAY_BASE_URL  - Payment proxy URL, or `sandbox` for the in-process gateway
//!   RUST_LOG          - Log filter (default: info)

use rei25_portal::api::{create_router, start_cleanup_task, AppState};
use rei25_portal::models::AppConfig;
use rei25_portal::providers::{mailer_from_config, HttpGateway, PaymentGateway, SandboxGateway};
use rei25_portal::store::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    print_banner();

    let config = AppConfig::from_env();
    let store = Arc::new(Store::open(&config.database_path)?);

    let gateway: Arc<dyn PaymentGateway> = if config.gateway.base_url == "sandbox" {
        warn!("🧪 Using the sandbox gateway, no real money moves");
        Arc::new(SandboxGateway::new())
    } else {
        info!("💳 Gateway: {}", config.gateway.base_url);
        Arc::new(HttpGateway::new(&config.gateway)?)
    };
    let mailer = mailer_from_config(&config.mail)?;

    if config.auth.admin_emails.is_empty() {
        warn!("⚠️  ADMIN_EMAILS is empty, nobody can reach the admin endpoints");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Create app state
    let state = Arc::new(AppState::new(config, store, gateway, mailer));
    let state_for_shutdown = state.clone();

    // Start background cleanup task for rate limiter
    start_cleanup_task();
    info!("🧹 Background cleanup task started");

    let app = create_router(state);

    info!("🚀 REI 25 Portal API starting on http://{}", addr);
    info!("");
    info!("Endpoints:");
    info!("  POST /api/auth/request-otp       - Email a login code");
    info!("  POST /api/auth/verify-otp        - Exchange code for a session");
    info!("  POST /api/registrations          - Register for REI 25");
    info!("  POST /api/process-payment        - Start a mobile-money debit");
    info!("  GET  /api/check-payment-status   - Gateway status lookup");
    info!("  POST /api/save-payment           - Record a settled payment");
    info!("  GET  /api/admin/summary          - Admin dashboard");
    info!("  POST /api/liquidations           - Request a fund liquidation");
    info!("  GET  /health                     - Health check");
    info!("");
    info!("Press Ctrl+C for graceful shutdown");

    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    info!("");
    info!("🛑 Shutdown signal received, cleaning up...");
    let active = state_for_shutdown.tracker.active();
    if active > 0 {
        warn!("   {} payment(s) still being tracked; clients can settle them via /api/save-payment", active);
    }
    state_for_shutdown.shutdown();

    info!("👋 REI 25 Portal API shutdown complete");

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ╔══════════════════════════════════════════════╗
    ║                                              ║
    ║        R E I   2 5    P O R T A L            ║
    ║                                              ║
    ║   Registration · Mobile Money · Liquidation  ║
    ║                  API v{:<8}               ║
    ║                                              ║
    ╚══════════════════════════════════════════════╝
    "#,
        env!("CARGO_PKG_VERSION")
    );
}
