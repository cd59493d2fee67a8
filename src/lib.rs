//! REI 25 Portal Library
//!
//! Conference registration and mobile-money payment tracking for REI 25:
//! - Email OTP login
//! - Registration form with category-based fees
//! - Payment initiation, status polling and settlement against balances
//! - Admin reporting with CSV/PDF export
//! - Fund liquidation requests and approvals

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod store;
pub mod utils;

pub use api::{create_router, AppState};
pub use models::{AppConfig, AppError, AppResult, ErrorCode};
pub use providers::{HttpGateway, PaymentGateway, SandboxGateway};
pub use store::Store;
