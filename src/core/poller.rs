//! Status Poller
//!
//! Re-checks one gateway transaction on a fixed interval until the gateway
//! reports a terminal status. There is no backoff. Without a configured
//! attempt cap the loop only ends on a terminal status, a 401, or
//! cancellation through the watch channel (a dropped sender counts as
//! cancellation).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::{ErrorCode, PollConfig};
use crate::providers::{GatewayStatus, PaymentGateway, StatusReport};

/// How a poll loop ended
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Success { report: StatusReport, attempts: u32 },
    Failed { report: StatusReport, attempts: u32 },
    Cancelled { attempts: u32 },
    /// Attempt cap reached while still processing
    Exhausted { attempts: u32 },
    /// Gateway refused the bearer token; retrying cannot help
    Rejected { reason: String, attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::Cancelled { attempts }
            | Self::Exhausted { attempts }
            | Self::Rejected { attempts, .. } => *attempts,
        }
    }
}

pub struct StatusPoller {
    gateway: Arc<dyn PaymentGateway>,
    interval: Duration,
    max_attempts: Option<u32>,
}

impl StatusPoller {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: &PollConfig) -> Self {
        Self {
            gateway,
            interval: config.interval,
            max_attempts: config.max_attempts,
        }
    }

    /// Poll `reference` until it resolves. The first check happens one
    /// interval after the call, giving the subscriber time to approve.
    pub async fn poll(
        &self,
        reference: &str,
        bearer: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> PollOutcome {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        info!(reference, interval_ms = self.interval.as_millis() as u64, "⏳ Polling payment status");

        loop {
            if *cancel.borrow() {
                return PollOutcome::Cancelled { attempts };
            }
            if self.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(reference, attempts, "⌛ Poll attempts exhausted");
                return PollOutcome::Exhausted { attempts };
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!(reference, attempts, "🛑 Polling cancelled");
                        return PollOutcome::Cancelled { attempts };
                    }
                    continue;
                }
            }

            attempts += 1;
            match self.gateway.check_status(reference, bearer).await {
                Ok(report) => match report.status {
                    GatewayStatus::Processing => {
                        debug!(reference, attempts, "🔄 Still processing");
                    }
                    GatewayStatus::Success => {
                        info!(reference, attempts, "✅ Payment successful");
                        return PollOutcome::Success { report, attempts };
                    }
                    GatewayStatus::Failed => {
                        warn!(
                            reference,
                            attempts,
                            reason = report.reason().as_deref().unwrap_or("unknown"),
                            "❌ Payment failed"
                        );
                        return PollOutcome::Failed { report, attempts };
                    }
                },
                Err(e) if e.code == ErrorCode::Unauthorized => {
                    warn!(reference, attempts, "🔒 Gateway rejected token, stopping poll");
                    return PollOutcome::Rejected {
                        reason: e.message,
                        attempts,
                    };
                }
                Err(e) => {
                    warn!(reference, attempts, "⚠️ Status check failed, retrying next tick: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{SandboxGateway, SandboxStep};

    fn poller(gateway: Arc<SandboxGateway>, max_attempts: Option<u32>) -> StatusPoller {
        StatusPoller::new(
            gateway,
            &PollConfig {
                interval: Duration::from_millis(5),
                max_attempts,
            },
        )
    }

    fn status(s: GatewayStatus) -> SandboxStep {
        SandboxStep::Status(s)
    }

    #[tokio::test]
    async fn test_stops_at_first_terminal_status() {
        let gateway = Arc::new(SandboxGateway::scripted(
            vec![
                status(GatewayStatus::Processing),
                status(GatewayStatus::Processing),
                status(GatewayStatus::Success),
            ],
            status(GatewayStatus::Success),
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = poller(gateway.clone(), None).poll("INT-1", "tok", rx).await;

        assert!(matches!(outcome, PollOutcome::Success { attempts: 3, .. }));
        assert_eq!(gateway.status_checks(), 3);
    }

    #[tokio::test]
    async fn test_failed_is_terminal() {
        let gateway = Arc::new(SandboxGateway::scripted(
            vec![status(GatewayStatus::Processing)],
            status(GatewayStatus::Failed),
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = poller(gateway.clone(), None).poll("INT-1", "tok", rx).await;

        assert!(matches!(outcome, PollOutcome::Failed { attempts: 2, .. }));
        assert_eq!(gateway.status_checks(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_polling() {
        let gateway = Arc::new(SandboxGateway::scripted(
            vec![SandboxStep::TransportError, SandboxStep::TransportError],
            status(GatewayStatus::Success),
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = poller(gateway, None).poll("INT-1", "tok", rx).await;
        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, PollOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn test_unauthorized_stops_polling() {
        let gateway = Arc::new(SandboxGateway::scripted(
            vec![],
            SandboxStep::Unauthorized,
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = poller(gateway.clone(), None).poll("INT-1", "tok", rx).await;
        assert!(matches!(outcome, PollOutcome::Rejected { attempts: 1, .. }));
        assert_eq!(gateway.status_checks(), 1);
    }

    #[tokio::test]
    async fn test_attempt_cap() {
        let gateway = Arc::new(SandboxGateway::scripted(
            vec![],
            status(GatewayStatus::Processing),
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = poller(gateway.clone(), Some(4)).poll("INT-1", "tok", rx).await;
        assert!(matches!(outcome, PollOutcome::Exhausted { attempts: 4 }));
        assert_eq!(gateway.status_checks(), 4);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let gateway = Arc::new(SandboxGateway::scripted(
            vec![],
            status(GatewayStatus::Processing),
        ));
        let (tx, rx) = watch::channel(false);
        let poller = poller(gateway.clone(), None);

        let handle = tokio::spawn(async move { poller.poll("INT-1", "tok", rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, PollOutcome::Cancelled { .. }));
        let checks = gateway.status_checks();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(gateway.status_checks(), checks);
    }

    #[tokio::test]
    async fn test_dropped_sender_cancels() {
        let gateway = Arc::new(SandboxGateway::scripted(
            vec![],
            status(GatewayStatus::Processing),
        ));
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let outcome = poller(gateway, None).poll("INT-1", "tok", rx).await;
        assert!(matches!(outcome, PollOutcome::Cancelled { .. }));
    }
}
