//! Utils Module - Helper Functions & Shared Utilities
//!
//! TTL cache, constants and phone/email rules, and the PDF writer.

pub mod cache;
pub mod constants;
pub mod pdf;

#[cfg(test)]
pub(crate) mod log_capture;

pub use cache::*;
pub use constants::*;
