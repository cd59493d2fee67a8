//! Fund Liquidation Workflow
//!
//! Organizers ask for collected registration money to be paid out; admins
//! approve or reject, then mark approved requests as processed once the
//! money has left.
//!
//! ```text
//! pending ──approve──▶ approved ──process──▶ processed
//!    └─────reject────▶ rejected
//! ```
//!
//! Approved and processed requests commit funds. Approval re-checks funds
//! and moves the request in one store transaction, so commitments never
//! exceed what has been collected.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::auth::Session;
use crate::core::notifications;
use crate::models::{
    AppError, AppResult, ErrorCode, LiquidationRequest, LiquidationStatus, PayoutMethod,
};
use crate::providers::Mailer;
use crate::store::{NewLiquidation, Store};
use crate::utils::constants::normalize_phone;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationForm {
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
    pub purpose: Option<String>,
}

/// Money in versus money promised out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Funds {
    pub collected: Decimal,
    pub committed: Decimal,
    pub available: Decimal,
}

fn clean_note(note: Option<&str>) -> Option<&str> {
    note.map(str::trim).filter(|n| !n.is_empty())
}

fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl LiquidationForm {
    pub fn validate(&self, requester_email: &str) -> AppResult<NewLiquidation> {
        let amount = self
            .amount
            .ok_or_else(|| AppError::validation("amount is required"))?;
        if amount <= Decimal::ZERO {
            return Err(AppError::validation("amount must be greater than zero"));
        }

        let method_raw =
            text(&self.payment_method).ok_or_else(|| AppError::validation("paymentMethod is required"))?;
        let payment_method: PayoutMethod = method_raw.parse().map_err(|_| {
            AppError::validation("paymentMethod must be one of: mobile_money, bank_transfer")
        })?;

        let account_name =
            text(&self.account_name).ok_or_else(|| AppError::validation("accountName is required"))?;
        let account_number = text(&self.account_number)
            .ok_or_else(|| AppError::validation("accountNumber is required"))?;
        let purpose = text(&self.purpose).ok_or_else(|| AppError::validation("purpose is required"))?;

        let (account_number, bank_name) = match payment_method {
            PayoutMethod::MobileMoney => {
                let phone = normalize_phone(&account_number).ok_or_else(|| {
                    AppError::validation("accountNumber must be a valid mobile money number")
                })?;
                (phone, None)
            }
            PayoutMethod::BankTransfer => {
                let bank = text(&self.bank_name).ok_or_else(|| {
                    AppError::validation("bankName is required for bank transfers")
                })?;
                (account_number, Some(bank))
            }
        };

        Ok(NewLiquidation {
            requester_email: requester_email.to_string(),
            amount,
            payment_method,
            account_name,
            account_number,
            bank_name,
            purpose,
        })
    }
}

pub struct LiquidationService {
    store: Arc<Store>,
    mailer: Arc<dyn Mailer>,
}

impl LiquidationService {
    pub fn new(store: Arc<Store>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    pub fn funds(&self) -> AppResult<Funds> {
        let (collected, committed) = self.store.fund_totals()?;
        Ok(Funds {
            collected,
            committed,
            available: collected - committed,
        })
    }

    fn ensure_available(&self, amount: Decimal) -> AppResult<()> {
        let funds = self.funds()?;
        if amount > funds.available {
            return Err(AppError::new(
                ErrorCode::InsufficientFunds,
                format!(
                    "Requested {} exceeds available funds of {}",
                    notifications::format_amount(amount),
                    notifications::format_amount(funds.available)
                ),
            ));
        }
        Ok(())
    }

    pub async fn create(
        &self,
        requester: &Session,
        form: &LiquidationForm,
    ) -> AppResult<LiquidationRequest> {
        if !requester.role.can_request_liquidation() {
            return Err(AppError::forbidden("Only organizers can request liquidations"));
        }
        let new = form.validate(&requester.email)?;
        self.ensure_available(new.amount)?;

        let request = self.store.insert_liquidation(&new)?;
        info!(
            id = request.id,
            requester = %request.requester_email,
            amount = %request.amount,
            method = %request.payment_method,
            "🏦 Liquidation requested"
        );
        self.notify(&request).await;
        Ok(request)
    }

    /// All requests for admins, own requests for organizers
    pub fn list(&self, viewer: &Session) -> AppResult<Vec<LiquidationRequest>> {
        if viewer.role.is_admin() {
            self.store.liquidations(None)
        } else if viewer.role.can_request_liquidation() {
            self.store.liquidations(Some(&viewer.email))
        } else {
            Err(AppError::forbidden("Only organizers can view liquidations"))
        }
    }

    pub fn get(&self, id: i64, viewer: &Session) -> AppResult<LiquidationRequest> {
        let request = self.store.liquidation(id)?;
        if viewer.role.is_admin() || request.requester_email == viewer.email {
            Ok(request)
        } else {
            Err(AppError::forbidden("Not your liquidation request"))
        }
    }

    pub async fn approve(
        &self,
        id: i64,
        reviewer: &Session,
        note: Option<&str>,
    ) -> AppResult<LiquidationRequest> {
        let current = self.load_for_transition(id, reviewer, LiquidationStatus::Approved)?;
        if current.requester_email == reviewer.email {
            return Err(AppError::forbidden("You cannot approve your own request"));
        }
        // Funds check and status change happen atomically in the store
        let updated = self.store.approve_liquidation_within_funds(
            current.id,
            &reviewer.email,
            clean_note(note),
        )?;
        self.announce(&current, updated, reviewer).await
    }

    pub async fn reject(
        &self,
        id: i64,
        reviewer: &Session,
        note: Option<&str>,
    ) -> AppResult<LiquidationRequest> {
        let current = self.load_for_transition(id, reviewer, LiquidationStatus::Rejected)?;
        self.transition(current, LiquidationStatus::Rejected, reviewer, note).await
    }

    pub async fn process(
        &self,
        id: i64,
        reviewer: &Session,
        note: Option<&str>,
    ) -> AppResult<LiquidationRequest> {
        let current = self.load_for_transition(id, reviewer, LiquidationStatus::Processed)?;
        self.transition(current, LiquidationStatus::Processed, reviewer, note).await
    }

    fn load_for_transition(
        &self,
        id: i64,
        reviewer: &Session,
        to: LiquidationStatus,
    ) -> AppResult<LiquidationRequest> {
        if !reviewer.role.is_admin() {
            return Err(AppError::forbidden("Admin access required"));
        }
        let current = self.store.liquidation(id)?;
        if !current.status.can_transition_to(to) {
            return Err(AppError::invalid_transition(format!(
                "Liquidation {} is {}, cannot move to {}",
                id, current.status, to
            )));
        }
        Ok(current)
    }

    async fn transition(
        &self,
        current: LiquidationRequest,
        to: LiquidationStatus,
        reviewer: &Session,
        note: Option<&str>,
    ) -> AppResult<LiquidationRequest> {
        let updated = self.store.transition_liquidation(
            current.id,
            current.status,
            to,
            &reviewer.email,
            clean_note(note),
        )?;
        self.announce(&current, updated, reviewer).await
    }

    async fn announce(
        &self,
        current: &LiquidationRequest,
        updated: LiquidationRequest,
        reviewer: &Session,
    ) -> AppResult<LiquidationRequest> {
        info!(
            id = updated.id,
            from = %current.status,
            to = %updated.status,
            reviewer = %reviewer.email,
            "🏦 Liquidation status changed"
        );
        self.notify(&updated).await;
        Ok(updated)
    }

    async fn notify(&self, request: &LiquidationRequest) {
        if let Err(e) = self.mailer.send(notifications::liquidation_email(request)).await {
            warn!(id = request.id, "📧 Liquidation email failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attendance, RegistrationCategory, Role};
    use crate::providers::MemoryMailer;
    use crate::store::{DuplicatePolicy, NewPayment, NewRegistration};
    use rust_decimal_macros::dec;

    fn session(email: &str, role: Role) -> Session {
        Session {
            token: "t".to_string(),
            email: email.to_string(),
            role,
            registrant_id: 0,
        }
    }

    /// Store with `collected` UGX of settled payments
    fn funded(collected: Decimal) -> (LiquidationService, Arc<MemoryMailer>) {
        let store = Arc::new(Store::in_memory().unwrap());
        let registrant = store.upsert_registrant("jane@rei.ug", Role::Member).unwrap();
        let reg = store
            .insert_registration(&NewRegistration {
                registrant_id: registrant.id,
                category: RegistrationCategory::International,
                attendance: Attendance::InPerson,
                organization: "KeNHA".to_string(),
                job_title: "Planner".to_string(),
                country: "Kenya".to_string(),
                fee: dec!(400000),
            })
            .unwrap();
        store
            .record_settlement(
                &NewPayment {
                    registration_id: reg.id,
                    amount: collected,
                    transaction_reference: "INT-1".to_string(),
                    customer_reference: None,
                    method: "mobile_money".to_string(),
                },
                DuplicatePolicy::Allow,
            )
            .unwrap();
        let mailer = Arc::new(MemoryMailer::new());
        (LiquidationService::new(store, mailer.clone()), mailer)
    }

    fn mobile_form(amount: Decimal) -> LiquidationForm {
        LiquidationForm {
            amount: Some(amount),
            payment_method: Some("mobile_money".to_string()),
            account_name: Some("Events Team".to_string()),
            account_number: Some("0772123456".to_string()),
            bank_name: None,
            purpose: Some("Venue deposit".to_string()),
        }
    }

    #[test]
    fn test_form_rules() {
        let valid = mobile_form(dec!(1000)).validate("org@rei.ug").unwrap();
        assert_eq!(valid.account_number, "256772123456");
        assert_eq!(valid.bank_name, None);

        let mut bank = mobile_form(dec!(1000));
        bank.payment_method = Some("bank_transfer".to_string());
        bank.account_number = Some("0123456789".to_string());
        assert!(bank.validate("org@rei.ug").unwrap_err().message.contains("bankName"));
        bank.bank_name = Some("Stanbic".to_string());
        assert_eq!(bank.validate("org@rei.ug").unwrap().account_number, "0123456789");

        assert!(mobile_form(dec!(0)).validate("org@rei.ug").is_err());
        let mut bad_phone = mobile_form(dec!(1000));
        bad_phone.account_number = Some("12".to_string());
        assert!(bad_phone.validate("org@rei.ug").is_err());
    }

    #[tokio::test]
    async fn test_members_cannot_request() {
        let (service, _) = funded(dec!(400000));
        let err = service
            .create(&session("jane@rei.ug", Role::Member), &mobile_form(dec!(1000)))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (service, mailer) = funded(dec!(400000));
        let organizer = session("org@rei.ug", Role::Organizer);
        let admin = session("boss@rei.ug", Role::Admin);

        let req = service.create(&organizer, &mobile_form(dec!(100000))).await.unwrap();
        assert_eq!(req.status, LiquidationStatus::Pending);

        let approved = service.approve(req.id, &admin, Some("ok")).await.unwrap();
        assert_eq!(approved.status, LiquidationStatus::Approved);
        assert_eq!(service.funds().unwrap().available, dec!(300000));

        let processed = service.process(req.id, &admin, None).await.unwrap();
        assert_eq!(processed.status, LiquidationStatus::Processed);
        assert_eq!(processed.review_note.as_deref(), Some("ok"));

        // created, approved, processed
        assert_eq!(mailer.sent_to("org@rei.ug").len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let (service, _) = funded(dec!(400000));
        let organizer = session("org@rei.ug", Role::Organizer);
        let admin = session("boss@rei.ug", Role::Admin);
        let req = service.create(&organizer, &mobile_form(dec!(1000))).await.unwrap();

        let err = service.process(req.id, &admin, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);

        service.reject(req.id, &admin, Some("no receipts")).await.unwrap();
        let err = service.approve(req.id, &admin, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let (service, _) = funded(dec!(50000));
        let organizer = session("org@rei.ug", Role::Organizer);
        let admin = session("boss@rei.ug", Role::Admin);

        let err = service
            .create(&organizer, &mobile_form(dec!(60000)))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientFunds);

        // Both fit at creation; only one fits at approval
        let a = service.create(&organizer, &mobile_form(dec!(40000))).await.unwrap();
        let b = service.create(&organizer, &mobile_form(dec!(40000))).await.unwrap();
        service.approve(a.id, &admin, None).await.unwrap();
        let err = service.approve(b.id, &admin, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientFunds);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approvals_stay_within_funds() {
        let (service, _) = funded(dec!(50000));
        let service = Arc::new(service);
        let organizer = session("org@rei.ug", Role::Organizer);

        let mut ids = Vec::new();
        for _ in 0..2 {
            ids.push(service.create(&organizer, &mobile_form(dec!(40000))).await.unwrap().id);
        }

        let tasks: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .approve(id, &session("boss@rei.ug", Role::Admin), None)
                        .await
                })
            })
            .collect();

        let mut approved = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => approved += 1,
                Err(e) => assert_eq!(e.code, ErrorCode::InsufficientFunds),
            }
        }
        assert_eq!(approved, 1);

        let funds = service.funds().unwrap();
        assert_eq!(funds.committed, dec!(40000));
        assert!(funds.available >= Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_no_self_approval() {
        let (service, _) = funded(dec!(400000));
        let admin = session("boss@rei.ug", Role::Admin);
        let req = service.create(&admin, &mobile_form(dec!(1000))).await.unwrap();
        let err = service.approve(req.id, &admin, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_organizer_sees_only_own() {
        let (service, _) = funded(dec!(400000));
        let a = session("a@rei.ug", Role::Organizer);
        let b = session("b@rei.ug", Role::Organizer);
        let req = service.create(&a, &mobile_form(dec!(1000))).await.unwrap();
        service.create(&b, &mobile_form(dec!(1000))).await.unwrap();

        assert_eq!(service.list(&a).unwrap().len(), 1);
        assert_eq!(service.list(&session("x@rei.ug", Role::Admin)).unwrap().len(), 2);
        assert_eq!(service.get(req.id, &b).unwrap_err().code, ErrorCode::Forbidden);
    }
}
