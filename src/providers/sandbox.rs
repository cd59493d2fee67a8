//! Sandbox Gateway
//!
//! In-process stand-in for the mobile-money proxy. Every debit is accepted
//! with sequential references; status checks replay a script of steps and
//! then repeat a fallback step forever. Selected with
//! `GATEWAY_BASE_URL=sandbox` and used by the test suites.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::info;

use super::gateway::{DebitAccepted, DebitRequest, GatewayStatus, PaymentGateway, StatusReport};
use crate::models::{AppError, AppResult};

/// One scripted answer to a status check
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxStep {
    Status(GatewayStatus),
    /// Gateway unreachable for this tick
    TransportError,
    /// Gateway answers 401
    Unauthorized,
}

pub struct SandboxGateway {
    script: Mutex<VecDeque<SandboxStep>>,
    fallback: SandboxStep,
    reject_debits: Option<String>,
    debits: Mutex<Vec<DebitRequest>>,
    bearers: Mutex<Vec<String>>,
    issued: AtomicU32,
    status_checks: AtomicU32,
}

impl SandboxGateway {
    /// Reports `processing` once, then `success`
    pub fn new() -> Self {
        Self::scripted(
            vec![SandboxStep::Status(GatewayStatus::Processing)],
            SandboxStep::Status(GatewayStatus::Success),
        )
    }

    pub fn scripted(steps: Vec<SandboxStep>, fallback: SandboxStep) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback,
            reject_debits: None,
            debits: Mutex::new(Vec::new()),
            bearers: Mutex::new(Vec::new()),
            issued: AtomicU32::new(0),
            status_checks: AtomicU32::new(0),
        }
    }

    /// Every debit fails with PAYMENT_FAILED carrying `message`
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            reject_debits: Some(message.into()),
            ..Self::new()
        }
    }

    pub fn debits(&self) -> Vec<DebitRequest> {
        self.debits.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Bearer tokens seen so far, in call order
    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn status_checks(&self) -> u32 {
        self.status_checks.load(Ordering::SeqCst)
    }

    fn remember_bearer(&self, bearer: &str) {
        if let Ok(mut bearers) = self.bearers.lock() {
            bearers.push(bearer.to_string());
        }
    }

    fn next_step(&self) -> SandboxStep {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for SandboxGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn process_payment(
        &self,
        request: &DebitRequest,
        bearer: &str,
    ) -> AppResult<DebitAccepted> {
        self.remember_bearer(bearer);
        if let Some(message) = &self.reject_debits {
            return Err(AppError::payment_failed(message.clone()));
        }
        if let Ok(mut debits) = self.debits.lock() {
            debits.push(request.clone());
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        info!(amount = %request.amount, "🧪 Sandbox accepted debit #{}", n);
        Ok(DebitAccepted {
            internal_reference: format!("SBX-INT-{:04}", n),
            customer_reference: Some(format!("SBX-CUS-{:04}", n)),
            provider: Some("SANDBOX".to_string()),
        })
    }

    async fn check_status(
        &self,
        internal_reference: &str,
        bearer: &str,
    ) -> AppResult<StatusReport> {
        self.remember_bearer(bearer);
        self.status_checks.fetch_add(1, Ordering::SeqCst);

        match self.next_step() {
            SandboxStep::Status(status) => Ok(StatusReport {
                status,
                data: json!({
                    "internalReference": internal_reference,
                    "customerReference": internal_reference.replace("-INT-", "-CUS-"),
                }),
            }),
            SandboxStep::TransportError => Err(AppError::server("Sandbox gateway unreachable")),
            SandboxStep::Unauthorized => Err(AppError::unauthorized("Sandbox rejected token")),
        }
    }
}
