//! Payment status watcher
//!
//! Replaces the browser-side polling loop with a server-side worker bound to
//! the process lifetime. Each tick issues one status query per pending
//! session; a session leaves the polling set the moment it reaches a terminal
//! phase, so no query is ever issued after the first approved observation.
//! Sessions that exhaust the attempt budget or outlive the absolute deadline
//! are moved to the expired terminal phase.

use crate::payments::gateway::PixGateway;
use crate::services::receipt::{ReceiptData, ReceiptService};
use crate::services::session::{PaymentSession, SessionPhase, SessionStore};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PaymentWatcherConfig {
    /// How often the worker wakes up to poll the processor.
    pub poll_interval: Duration,
    /// Maximum status queries per session before it is expired.
    pub max_attempts: u32,
    /// Absolute wall-clock deadline from `created_at`; sessions older than
    /// this are expired regardless of attempt count.
    pub pending_timeout: Duration,
}

impl Default for PaymentWatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 60,
            pending_timeout: Duration::from_secs(1800),
        }
    }
}

impl PaymentWatcherConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.poll_interval = Duration::from_secs(
            std::env::var("PAYMENT_POLL_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.poll_interval.as_secs()),
        );
        cfg.max_attempts = std::env::var("PAYMENT_MAX_POLL_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(cfg.max_attempts);
        cfg.pending_timeout = Duration::from_secs(
            std::env::var("PAYMENT_PENDING_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.pending_timeout.as_secs()),
        );
        cfg
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct PaymentWatcher {
    store: Arc<SessionStore>,
    gateway: Arc<dyn PixGateway>,
    receipts: Arc<ReceiptService>,
    config: PaymentWatcherConfig,
}

impl PaymentWatcher {
    pub fn new(
        store: Arc<SessionStore>,
        gateway: Arc<dyn PixGateway>,
        receipts: Arc<ReceiptService>,
        config: PaymentWatcherConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            receipts,
            config,
        }
    }

    /// Runs until the shutdown channel flips to `true`. Cancellation is
    /// deterministic: the loop observes the channel between ticks and exits
    /// without leaving a dangling timer behind.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            max_attempts = self.config.max_attempts,
            pending_timeout_secs = self.config.pending_timeout.as_secs(),
            "payment status watcher started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("payment status watcher stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("payment status watcher stopped");
    }

    /// One polling pass over every pending session.
    pub async fn run_cycle(&self) {
        let pending = self.store.pending().await;
        if pending.is_empty() {
            return;
        }

        join_all(pending.into_iter().map(|session| self.poll_session(session))).await;
    }

    async fn poll_session(&self, session: PaymentSession) {
        let token = session.session_token;

        if attempts_exhausted(session.attempts, self.config.max_attempts)
            || is_timed_out(session.created_at, self.config.pending_timeout)
        {
            if self.store.expire(&token).await {
                warn!(
                    session_token = %token,
                    payment_id = %session.provider_payment_id,
                    attempts = session.attempts,
                    "pending session expired without reaching a terminal status"
                );
            }
            return;
        }

        self.store.record_attempt(&token).await;

        match self
            .gateway
            .charge_status(&session.provider_payment_id)
            .await
        {
            Ok(status) => {
                let transition = self
                    .store
                    .apply_status(&session.provider_payment_id, status.status, &status.raw_status)
                    .await;

                if let Some(transition) = transition {
                    info!(
                        session_token = %token,
                        payment_id = %session.provider_payment_id,
                        from = %transition.from,
                        to = %transition.to,
                        "payment session transitioned"
                    );

                    if transition.to == SessionPhase::Approved {
                        let receipt = ReceiptData {
                            payment_id: transition.session.provider_payment_id.clone(),
                            title: transition.session.title.clone(),
                            price: transition.session.price.clone(),
                            buyer: transition.session.buyer.clone(),
                            issued_at: chrono::Utc::now(),
                        };
                        if let Err(e) = self.receipts.generate_if_missing(&receipt) {
                            error!(
                                payment_id = %receipt.payment_id,
                                error = %e,
                                "failed to generate receipt for approved payment"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                // Transient failures keep polling; the attempt budget bounds
                // how long a session can stay in this loop.
                warn!(
                    session_token = %token,
                    payment_id = %session.provider_payment_id,
                    error = %e,
                    "status query failed; will retry next tick"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pure helper functions
// ---------------------------------------------------------------------------

/// Returns `true` when `created_at` is older than `timeout`.
fn is_timed_out(created_at: chrono::DateTime<chrono::Utc>, timeout: Duration) -> bool {
    let elapsed = chrono::Utc::now() - created_at;
    elapsed.to_std().map(|d| d > timeout).unwrap_or(false)
}

/// Returns `true` once the attempt budget is spent.
fn attempts_exhausted(attempts: u32, max_attempts: u32) -> bool {
    attempts >= max_attempts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
