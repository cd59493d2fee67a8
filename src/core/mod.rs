//! Core Module - Business Logic
//!
//! Login, registration, the payment reconciliation flow (poll, track,
//! settle), liquidations, reporting and the email templates they send.

pub mod auth;
pub mod liquidation;
pub mod notifications;
pub mod poller;
pub mod registration;
pub mod reports;
pub mod settlement;
pub mod tracker;

pub use auth::{AuthService, Session};
pub use liquidation::{Funds, LiquidationForm, LiquidationService};
pub use poller::{PollOutcome, StatusPoller};
pub use registration::{ProfileUpdate, RegistrationForm, RegistrationService};
pub use reports::AdminSummary;
pub use settlement::{LedgerUpdate, SettlementReceipt, SettlementRecorder, SettlementRequest};
pub use tracker::{PaymentTracker, TrackRequest, TrackState, TrackedPayment};
