//! Gateway client trait and the breaker-wrapped adapter.

use std::sync::Arc;

use async_trait::async_trait;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics};
use crate::error::Result;
use crate::types::{
    GatewayHealth, GatewayRequest, GatewayResponse, RefundRequest, RefundResponse,
};

/// A payment gateway backend.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Submits a charge.
    async fn process_transaction(&self, request: GatewayRequest) -> Result<GatewayResponse>;

    /// Refunds a previously approved transaction.
    async fn refund_transaction(&self, request: RefundRequest) -> Result<RefundResponse>;

    /// Reports gateway health.
    async fn health_check(&self) -> Result<GatewayHealth>;
}

/// A gateway backend wrapped in a circuit breaker.
///
/// Charges and refunds go through the breaker; health checks bypass it so
/// operators can observe an unhealthy gateway while the circuit is open.
pub struct PaymentGateway<G: GatewayClient> {
    client: Arc<G>,
    breaker: CircuitBreaker,
}

impl<G: GatewayClient> Clone for PaymentGateway<G> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            breaker: self.breaker.clone(),
        }
    }
}

impl<G: GatewayClient> PaymentGateway<G> {
    /// Wraps a backend with default breaker thresholds.
    pub fn new(client: Arc<G>) -> Self {
        Self::with_config(client, CircuitBreakerConfig::default())
    }

    /// Wraps a backend with explicit breaker configuration.
    pub fn with_config(client: Arc<G>, config: CircuitBreakerConfig) -> Self {
        Self {
            client,
            breaker: CircuitBreaker::new(config),
        }
    }

    /// Submits a charge through the breaker.
    pub async fn process_transaction(&self, request: GatewayRequest) -> Result<GatewayResponse> {
        let client = Arc::clone(&self.client);
        self.breaker
            .execute(move || async move { client.process_transaction(request).await })
            .await
    }

    /// Refunds a transaction through the breaker.
    pub async fn refund_transaction(&self, request: RefundRequest) -> Result<RefundResponse> {
        let client = Arc::clone(&self.client);
        self.breaker
            .execute(move || async move { client.refund_transaction(request).await })
            .await
    }

    /// Reports backend health, bypassing the breaker.
    pub async fn health_check(&self) -> Result<GatewayHealth> {
        self.client.health_check().await
    }

    /// Returns a breaker metrics snapshot.
    pub async fn circuit_metrics(&self) -> CircuitMetrics {
        self.breaker.metrics().await
    }

    /// Resets the breaker to closed.
    pub async fn reset_circuit(&self) {
        self.breaker.reset().await;
    }

    /// Returns the wrapped backend, for operator controls.
    pub fn client(&self) -> &Arc<G> {
        &self.client
    }

    /// Returns the breaker itself.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::error::GatewayError;
    use crate::simulator::{FailureMode, GatewaySimulator};
    use common::{AggregateId, Money, UserId};
    use std::time::Duration;

    fn request() -> GatewayRequest {
        GatewayRequest {
            payment_id: AggregateId::new(),
            user_id: UserId::new("user-1"),
            amount: Money::from_cents(10_000),
        }
    }

    fn gateway() -> PaymentGateway<GatewaySimulator> {
        let simulator = GatewaySimulator::new();
        simulator.set_latency(Duration::from_millis(0));
        PaymentGateway::with_config(
            Arc::new(simulator),
            CircuitBreakerConfig {
                failure_threshold: 3,
                ..CircuitBreakerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn approved_charge_passes_through() {
        let gateway = gateway();

        let response = gateway.process_transaction(request()).await.unwrap();
        assert!(response.is_approved());
        assert_eq!(gateway.breaker().state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn repeated_network_errors_open_the_circuit() {
        let gateway = gateway();
        gateway.client().set_mode(FailureMode::NetworkError);

        for _ in 0..3 {
            let _ = gateway.process_transaction(request()).await;
        }
        assert_eq!(gateway.breaker().state().await, CircuitState::Open);

        // Further calls never reach the simulator.
        let before = gateway.client().stats().processed;
        let result = gateway.process_transaction(request()).await;
        assert!(matches!(result, Err(GatewayError::CircuitOpen { .. })));
        assert_eq!(gateway.client().stats().processed, before);
    }

    #[tokio::test]
    async fn declines_pass_through_without_tripping() {
        let gateway = gateway();
        gateway.client().set_mode(FailureMode::Decline);

        for _ in 0..5 {
            let response = gateway.process_transaction(request()).await.unwrap();
            assert!(!response.is_approved());
        }
        assert_eq!(gateway.breaker().state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn health_check_bypasses_an_open_circuit() {
        let gateway = gateway();
        gateway.client().set_mode(FailureMode::NetworkError);
        for _ in 0..3 {
            let _ = gateway.process_transaction(request()).await;
        }
        gateway.client().make_unhealthy();

        let health = gateway.health_check().await.unwrap();
        assert!(!health.healthy);
    }

    #[tokio::test]
    async fn reset_allows_traffic_again() {
        let gateway = gateway();
        gateway.client().set_mode(FailureMode::NetworkError);
        for _ in 0..3 {
            let _ = gateway.process_transaction(request()).await;
        }

        gateway.reset_circuit().await;
        gateway.client().set_mode(FailureMode::Approve);

        let response = gateway.process_transaction(request()).await.unwrap();
        assert!(response.is_approved());
    }
}
