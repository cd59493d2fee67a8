//! Settlement Recorder
//!
//! Records a completed gateway payment against a registration: append the
//! Payment row, move `amount_paid` up and `balance` down by the same amount,
//! recompute the payment status, then email a confirmation.
//!
//! Duplicate references are NOT blocked unless configured: the same
//! reference settled twice is appended twice and logged as a warning.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::notifications;
use crate::models::{AppError, AppResult, Payment, PaymentStatus, Registration};
use crate::providers::Mailer;
use crate::store::{DuplicatePolicy, NewPayment, Store};

/// New ledger values after appending one payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub payment_status: PaymentStatus,
}

impl LedgerUpdate {
    /// `amount_paid += amount`, `balance -= amount`. The sum is unchanged and
    /// the balance is allowed to go negative.
    pub fn apply(amount_paid: Decimal, balance: Decimal, amount: Decimal) -> Self {
        let amount_paid = amount_paid + amount;
        let balance = balance - amount;
        Self {
            amount_paid,
            balance,
            payment_status: PaymentStatus::compute(amount_paid, balance),
        }
    }
}

/// A payment to be recorded
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub registration_id: i64,
    pub amount: Decimal,
    pub transaction_reference: String,
    pub customer_reference: Option<String>,
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub payment: Payment,
    pub registration: Registration,
    /// The reference had already been settled before this call
    pub duplicate_reference: bool,
    pub email_sent: bool,
}

pub struct SettlementRecorder {
    store: Arc<Store>,
    mailer: Arc<dyn Mailer>,
    reject_duplicates: bool,
}

impl SettlementRecorder {
    pub fn new(store: Arc<Store>, mailer: Arc<dyn Mailer>, reject_duplicates: bool) -> Self {
        Self {
            store,
            mailer,
            reject_duplicates,
        }
    }

    pub async fn settle(&self, request: SettlementRequest) -> AppResult<SettlementReceipt> {
        if request.amount <= Decimal::ZERO {
            return Err(AppError::validation("amount must be greater than zero"));
        }
        let reference = request.transaction_reference.trim().to_string();
        if reference.is_empty() {
            return Err(AppError::validation("transactionReference is required"));
        }

        let policy = if self.reject_duplicates {
            DuplicatePolicy::Reject
        } else {
            DuplicatePolicy::Allow
        };
        let record = self.store.record_settlement(
            &NewPayment {
                registration_id: request.registration_id,
                amount: request.amount,
                transaction_reference: reference,
                customer_reference: request.customer_reference,
                method: request.method,
            },
            policy,
        )?;

        let duplicate_reference = record.previous_settlements > 0;
        if duplicate_reference {
            warn!(
                reference = %record.payment.transaction_reference,
                previous_settlements = record.previous_settlements,
                registration_id = record.after.id,
                "⚠️ Settled a reference that was already recorded"
            );
        }

        info!(
            registration_id = record.after.id,
            reference = %record.payment.transaction_reference,
            amount = %record.payment.amount,
            paid_before = %record.before.amount_paid,
            paid_after = %record.after.amount_paid,
            balance_after = %record.after.balance,
            status = %record.after.payment_status,
            "💰 Payment settled"
        );

        let email_sent = match self.send_confirmation(&record.payment).await {
            Ok(()) => true,
            Err(e) => {
                warn!(reference = %record.payment.transaction_reference, "📧 Confirmation email failed: {}", e);
                false
            }
        };

        Ok(SettlementReceipt {
            payment: record.payment,
            registration: record.after,
            duplicate_reference,
            email_sent,
        })
    }

    /// Email the registrant a confirmation for an already-recorded payment
    pub async fn send_confirmation(&self, payment: &Payment) -> AppResult<()> {
        let record = self.store.registration_record(payment.registration_id)?;
        self.mailer
            .send(notifications::payment_email(&record, payment))
            .await
    }
}
