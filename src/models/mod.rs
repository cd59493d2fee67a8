//! Models Module - Data Structures & Configuration
//!
//! Domain records, error codes and runtime configuration.

pub mod config;
pub mod errors;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
