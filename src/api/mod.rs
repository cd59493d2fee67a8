//! REI 25 HTTP API
//! JSON endpoints for login, registration, payments, admin reporting and
//! liquidations, all wrapped in the `ApiResponse` envelope.

pub mod admin;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

pub use handlers::AppState;
pub use middleware::start_cleanup_task;
pub use routes::create_router;
pub use types::*;
