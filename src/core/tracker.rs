//! Payment Tracker
//!
//! Server-side follow-up for initiated debits: one background task per
//! internal reference polls the gateway and, on success, settles the
//! payment against its registration. The browser may still poll and settle
//! on its own; both paths go through the same recorder.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::poller::{PollOutcome, StatusPoller};
use crate::core::settlement::{SettlementRecorder, SettlementRequest};
use crate::models::RegistrationStatus;
use crate::utils::constants::METHOD_MOBILE_MONEY;

const CANCELLED_DETAIL: &str = "Registration was cancelled while the payment was pending; refund due";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Processing,
    Settled,
    Failed,
    /// Gateway reported success but recording it failed
    SettlementFailed,
    Cancelled,
    Exhausted,
    /// Gateway refused the token used for polling
    Rejected,
}

impl TrackState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// A debit being followed, as returned by the track endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPayment {
    pub internal_reference: String,
    pub customer_reference: Option<String>,
    pub registration_id: i64,
    #[serde(skip)]
    pub registrant_id: i64,
    pub amount: Decimal,
    pub state: TrackState,
    pub attempts: u32,
    pub detail: Option<String>,
    pub payment_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What the initiator hands over after the gateway accepts a debit
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub internal_reference: String,
    pub customer_reference: Option<String>,
    pub registration_id: i64,
    pub registrant_id: i64,
    pub amount: Decimal,
    /// Token used for the status checks
    pub bearer: String,
}

pub struct PaymentTracker {
    entries: Arc<DashMap<String, TrackedPayment>>,
    poller: Arc<StatusPoller>,
    recorder: Arc<SettlementRecorder>,
    shutdown: watch::Receiver<bool>,
}

impl PaymentTracker {
    pub fn new(
        poller: Arc<StatusPoller>,
        recorder: Arc<SettlementRecorder>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            poller,
            recorder,
            shutdown,
        }
    }

    /// Start following a reference. Returns `false` when it is already
    /// tracked; no second task is spawned.
    pub fn track(&self, request: TrackRequest) -> bool {
        let reference = request.internal_reference.clone();
        match self.entries.entry(reference.clone()) {
            Entry::Occupied(_) => {
                info!(reference = %reference, "🔁 Reference already tracked");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(TrackedPayment {
                    internal_reference: reference.clone(),
                    customer_reference: request.customer_reference.clone(),
                    registration_id: request.registration_id,
                    registrant_id: request.registrant_id,
                    amount: request.amount,
                    state: TrackState::Processing,
                    attempts: 0,
                    detail: None,
                    payment_id: None,
                    started_at: Utc::now(),
                    finished_at: None,
                });
            }
        }

        let entries = self.entries.clone();
        let poller = self.poller.clone();
        let recorder = self.recorder.clone();
        let cancel = self.shutdown.clone();

        tokio::spawn(async move {
            let outcome = poller.poll(&reference, &request.bearer, cancel).await;
            let attempts = outcome.attempts();

            let (state, detail, payment_id) = match outcome {
                PollOutcome::Success { report, .. } => {
                    let settlement = SettlementRequest {
                        registration_id: request.registration_id,
                        amount: request.amount,
                        transaction_reference: reference.clone(),
                        customer_reference: report
                            .customer_reference()
                            .or(request.customer_reference.clone()),
                        method: METHOD_MOBILE_MONEY.to_string(),
                    };
                    match recorder.settle(settlement).await {
                        // Debited money is recorded even if the registration
                        // was cancelled while polling
                        Ok(receipt)
                            if receipt.registration.registration_status
                                == RegistrationStatus::Cancelled =>
                        {
                            warn!(
                                reference = %reference,
                                registration_id = receipt.registration.id,
                                "💸 Payment settled on a cancelled registration, refund due"
                            );
                            (
                                TrackState::Settled,
                                Some(CANCELLED_DETAIL.to_string()),
                                Some(receipt.payment.id),
                            )
                        }
                        Ok(receipt) => (TrackState::Settled, None, Some(receipt.payment.id)),
                        Err(e) => {
                            warn!(reference = %reference, "❌ Settlement after successful poll failed: {}", e);
                            (TrackState::SettlementFailed, Some(e.message), None)
                        }
                    }
                }
                PollOutcome::Failed { report, .. } => (TrackState::Failed, report.reason(), None),
                PollOutcome::Cancelled { .. } => (TrackState::Cancelled, None, None),
                PollOutcome::Exhausted { .. } => (
                    TrackState::Exhausted,
                    Some(format!("No terminal status after {} checks", attempts)),
                    None,
                ),
                PollOutcome::Rejected { reason, .. } => (TrackState::Rejected, Some(reason), None),
            };

            if let Some(mut entry) = entries.get_mut(&reference) {
                entry.state = state;
                entry.attempts = attempts;
                entry.detail = detail;
                entry.payment_id = payment_id;
                entry.finished_at = Some(Utc::now());
            }
            info!(reference = %reference, state = ?state, attempts, "📌 Tracking finished");
        });

        true
    }

    pub fn get(&self, reference: &str) -> Option<TrackedPayment> {
        self.entries.get(reference).map(|e| e.value().clone())
    }

    /// References still being polled
    pub fn active(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.value().state.is_finished())
            .count()
    }

    /// Forget finished entries older than `max_age`
    pub fn cleanup_finished(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.finished_at.map_or(true, |finished| finished > cutoff));
        before - self.entries.len()
    }
}
