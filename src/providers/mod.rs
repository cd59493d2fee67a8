//! Providers Module - External Services
//!
//! The mobile-money payment gateway (HTTP client and in-process sandbox)
//! and the mail API.

pub mod gateway;
pub mod mailer;
pub mod sandbox;

pub use gateway::*;
pub use mailer::*;
pub use sandbox::*;
