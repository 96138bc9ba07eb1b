//! Simulated payment gateway with operator-controllable faults.
//!
//! Failure injection is explicit rather than random: operators (and tests)
//! set the failure mode, latency, and health through the control methods,
//! so every scenario is reproducible.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::GatewayClient;
use crate::error::{GatewayError, Result};
use crate::types::{
    GatewayHealth, GatewayRequest, GatewayResponse, GatewayStatus, RefundRequest, RefundResponse,
};

const DEFAULT_LATENCY_MS: u64 = 100;

/// How long the timeout scenario stalls before giving up. Longer than any
/// sensible per-call timeout, so the breaker's timer fires first.
const STALL_MS: u64 = 30_000;

const SLOW_RESPONSE_MS: u64 = 5_000;

/// What the simulator does with the next transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Approve the charge.
    Approve,

    /// Respond promptly with a decline.
    Decline,

    /// Fail with a connection error.
    NetworkError,

    /// Stall until the caller's timeout fires.
    Timeout,

    /// Respond slowly, then approve.
    SlowResponse,
}

/// Operator-facing simulator statistics.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    /// Whether the simulator is marked healthy.
    pub healthy: bool,

    /// Current failure mode.
    pub mode: FailureMode,

    /// Consecutive transport failures produced.
    pub consecutive_failures: u32,

    /// Current simulated latency.
    pub latency_ms: u64,

    /// Transactions processed since startup.
    pub processed: u64,
}

#[derive(Debug)]
struct SimulatorInner {
    healthy: bool,
    mode: FailureMode,
    latency: Duration,
    consecutive_failures: u32,
    processed: u64,
}

/// In-process stand-in for the external payment processor.
#[derive(Debug)]
pub struct GatewaySimulator {
    inner: Mutex<SimulatorInner>,
}

impl Default for GatewaySimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewaySimulator {
    /// Creates a healthy simulator that approves everything.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimulatorInner {
                healthy: true,
                mode: FailureMode::Approve,
                latency: Duration::from_millis(DEFAULT_LATENCY_MS),
                consecutive_failures: 0,
                processed: 0,
            }),
        }
    }

    /// Marks the gateway unhealthy; all calls fail with network errors.
    pub fn make_unhealthy(&self) {
        self.lock().healthy = false;
        tracing::warn!("gateway simulator marked unhealthy");
    }

    /// Marks the gateway healthy again.
    pub fn make_healthy(&self) {
        let mut inner = self.lock();
        inner.healthy = true;
        inner.consecutive_failures = 0;
        tracing::info!("gateway simulator marked healthy");
    }

    /// Sets the failure mode for subsequent transactions.
    pub fn set_mode(&self, mode: FailureMode) {
        self.lock().mode = mode;
        tracing::info!(?mode, "gateway simulator mode set");
    }

    /// Sets the simulated response latency.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
        tracing::info!(latency_ms = latency.as_millis() as u64, "gateway latency set");
    }

    /// Restores the default latency.
    pub fn reset_latency(&self) {
        self.set_latency(Duration::from_millis(DEFAULT_LATENCY_MS));
    }

    /// Returns operator statistics.
    pub fn stats(&self) -> GatewayStats {
        let inner = self.lock();
        GatewayStats {
            healthy: inner.healthy,
            mode: inner.mode,
            consecutive_failures: inner.consecutive_failures,
            latency_ms: inner.latency.as_millis() as u64,
            processed: inner.processed,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatorInner> {
        // Lock poisoning cannot outlive the process in a simulator; a
        // poisoned guard still holds consistent data.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn approved(&self, request: &GatewayRequest) -> GatewayResponse {
        GatewayResponse {
            transaction_id: format!("txn-{}", Uuid::new_v4()),
            status: GatewayStatus::Approved,
            amount: request.amount,
            processed_at: Utc::now(),
            authorization_code: Some(format!("AUTH-{}", Uuid::new_v4().simple())),
            error_code: None,
            error_message: None,
        }
    }

    fn declined(&self, request: &GatewayRequest) -> GatewayResponse {
        GatewayResponse {
            transaction_id: format!("txn-declined-{}", Uuid::new_v4()),
            status: GatewayStatus::Declined,
            amount: request.amount,
            processed_at: Utc::now(),
            authorization_code: None,
            error_code: Some("CARD_DECLINED".to_string()),
            error_message: Some("Card declined by issuer".to_string()),
        }
    }
}

#[async_trait]
impl GatewayClient for GatewaySimulator {
    #[tracing::instrument(skip_all, fields(payment_id = %request.payment_id))]
    async fn process_transaction(&self, request: GatewayRequest) -> Result<GatewayResponse> {
        let (healthy, mode, latency) = {
            let mut inner = self.lock();
            inner.processed += 1;
            (inner.healthy, inner.mode, inner.latency)
        };

        if !healthy {
            tokio::time::sleep(latency).await;
            self.lock().consecutive_failures += 1;
            tracing::error!("gateway unhealthy, connection refused");
            return Err(GatewayError::Network("connection refused".to_string()));
        }

        match mode {
            FailureMode::Approve => {
                tokio::time::sleep(latency).await;
                self.lock().consecutive_failures = 0;
                Ok(self.approved(&request))
            }
            FailureMode::Decline => {
                tokio::time::sleep(latency).await;
                self.lock().consecutive_failures = 0;
                tracing::warn!("transaction declined");
                Ok(self.declined(&request))
            }
            FailureMode::NetworkError => {
                tokio::time::sleep(latency).await;
                self.lock().consecutive_failures += 1;
                tracing::error!("simulated network error");
                Err(GatewayError::Network("connection reset".to_string()))
            }
            FailureMode::Timeout => {
                self.lock().consecutive_failures += 1;
                tracing::warn!("simulated stall");
                tokio::time::sleep(Duration::from_millis(STALL_MS)).await;
                Err(GatewayError::Timeout)
            }
            FailureMode::SlowResponse => {
                tracing::warn!("simulated slow response");
                tokio::time::sleep(Duration::from_millis(SLOW_RESPONSE_MS)).await;
                self.lock().consecutive_failures = 0;
                Ok(self.approved(&request))
            }
        }
    }

    #[tracing::instrument(skip_all, fields(transaction_id = %request.transaction_id))]
    async fn refund_transaction(&self, request: RefundRequest) -> Result<RefundResponse> {
        let (healthy, latency) = {
            let inner = self.lock();
            (inner.healthy, inner.latency)
        };

        tokio::time::sleep(latency).await;

        if !healthy {
            tracing::error!("gateway unhealthy, refund failed");
            return Err(GatewayError::Network(
                "refund failed: gateway unavailable".to_string(),
            ));
        }

        Ok(RefundResponse {
            refund_id: format!("refund-{}", Uuid::new_v4()),
            transaction_id: request.transaction_id,
            amount: request.amount,
            processed_at: Utc::now(),
        })
    }

    async fn health_check(&self) -> Result<GatewayHealth> {
        let inner = self.lock();
        Ok(GatewayHealth {
            healthy: inner.healthy,
            latency_ms: inner.latency.as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, Money, UserId};

    fn request() -> GatewayRequest {
        GatewayRequest {
            payment_id: AggregateId::new(),
            user_id: UserId::new("user-1"),
            amount: Money::from_cents(10_000),
        }
    }

    fn fast_simulator() -> GatewaySimulator {
        let simulator = GatewaySimulator::new();
        simulator.set_latency(Duration::from_millis(0));
        simulator
    }

    #[tokio::test]
    async fn approves_by_default() {
        let simulator = fast_simulator();

        let response = simulator.process_transaction(request()).await.unwrap();
        assert!(response.is_approved());
        assert!(response.authorization_code.is_some());
        assert!(response.transaction_id.starts_with("txn-"));
    }

    #[tokio::test]
    async fn decline_mode_responds_without_error() {
        let simulator = fast_simulator();
        simulator.set_mode(FailureMode::Decline);

        let response = simulator.process_transaction(request()).await.unwrap();
        assert_eq!(response.status, GatewayStatus::Declined);
        assert_eq!(response.error_code.as_deref(), Some("CARD_DECLINED"));
    }

    #[tokio::test]
    async fn network_error_mode_fails() {
        let simulator = fast_simulator();
        simulator.set_mode(FailureMode::NetworkError);

        let result = simulator.process_transaction(request()).await;
        assert!(matches!(result, Err(GatewayError::Network(_))));
        assert_eq!(simulator.stats().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn unhealthy_gateway_refuses_everything() {
        let simulator = fast_simulator();
        simulator.make_unhealthy();

        let result = simulator.process_transaction(request()).await;
        assert!(matches!(result, Err(GatewayError::Network(_))));

        let refund = simulator
            .refund_transaction(RefundRequest {
                transaction_id: "txn-1".to_string(),
                amount: Money::from_cents(100),
                reason: None,
            })
            .await;
        assert!(matches!(refund, Err(GatewayError::Network(_))));

        let health = simulator.health_check().await.unwrap();
        assert!(!health.healthy);

        simulator.make_healthy();
        assert!(simulator.process_transaction(request()).await.is_ok());
    }

    #[tokio::test]
    async fn refund_succeeds_when_healthy() {
        let simulator = fast_simulator();

        let refund = simulator
            .refund_transaction(RefundRequest {
                transaction_id: "txn-1".to_string(),
                amount: Money::from_cents(2_500),
                reason: Some("compensation".to_string()),
            })
            .await
            .unwrap();

        assert!(refund.refund_id.starts_with("refund-"));
        assert_eq!(refund.transaction_id, "txn-1");
        assert_eq!(refund.amount.cents(), 2_500);
    }

    #[tokio::test]
    async fn stats_track_mode_and_counts() {
        let simulator = fast_simulator();
        simulator.process_transaction(request()).await.unwrap();
        simulator.set_mode(FailureMode::SlowResponse);

        let stats = simulator.stats();
        assert!(stats.healthy);
        assert_eq!(stats.mode, FailureMode::SlowResponse);
        assert_eq!(stats.processed, 1);
    }
}
