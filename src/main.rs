//! REI 25 offline export
//!
//! Writes the registration report as CSV and PDF straight from the SQLite
//! database, without starting the API server.
//!
//! Usage:
//!   rei25 [OUTPUT_DIR] [PAYMENT_STATUS]
//!
//! `DATABASE_PATH` selects the database (default: rei25.db). The optional
//! status is one of pending, partially_paid, fully_paid.

use eyre::{eyre, Result, WrapErr};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rei25_portal::core::reports;
use rei25_portal::core::notifications::format_amount;
use rei25_portal::models::PaymentStatus;
use rei25_portal::store::Store;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let mut args = std::env::args().skip(1);
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "exports".to_string()));
    let status = args
        .next()
        .map(|raw| raw.parse::<PaymentStatus>().map_err(|e| eyre!(e)))
        .transpose()?;

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "rei25.db".to_string());
    let store = Store::open(&db_path).wrap_err_with(|| format!("opening {}", db_path))?;

    let files = reports::export_to_dir(&store, &out_dir, status, chrono::Utc::now())
        .wrap_err_with(|| format!("exporting to {}", out_dir.display()))?;
    let summary = reports::summarize(&store)?;

    info!("📄 {} rows written", files.rows);
    info!("   CSV: {}", files.csv.display());
    info!("   PDF: {}", files.pdf.display());
    info!(
        "💰 Collected {}, outstanding {}, available {}",
        format_amount(summary.total_collected),
        format_amount(summary.outstanding),
        format_amount(summary.available)
    );

    Ok(())
}
