//! Circuit breaker guarding calls to the payment gateway.
//!
//! State machine:
//! - **Closed**: calls pass through; consecutive transport failures are
//!   counted and trip the breaker open at the failure threshold.
//! - **Open**: calls are rejected immediately until the open timeout
//!   elapses, then the next call probes in half-open.
//! - **HalfOpen**: a bounded number of concurrent probe calls are allowed;
//!   enough successes close the breaker, any failure reopens it.
//!
//! Declines are not failures: a gateway that answers "no" is still up.
//! Time is measured with [`tokio::time::Instant`], so tests under a paused
//! clock are exact.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{GatewayError, Result};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive transport failures before the breaker opens.
    pub failure_threshold: u32,

    /// Successes in half-open before the breaker closes.
    pub success_threshold: u32,

    /// How long the breaker stays open before probing.
    pub open_timeout: Duration,

    /// Maximum concurrent probe calls while half-open.
    pub half_open_max_concurrent: u32,

    /// Per-call timeout; a call exceeding it counts as a transport failure.
    pub per_call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            half_open_max_concurrent: 3,
            per_call_timeout: Duration::from_secs(10),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation.
    Closed,

    /// Rejecting calls until the open timeout elapses.
    Open,

    /// Probing whether the gateway recovered.
    HalfOpen,
}

impl CircuitState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of the breaker for operators.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitMetrics {
    /// Current state.
    pub state: CircuitState,

    /// Consecutive transport failures observed.
    pub consecutive_failures: u32,

    /// Successes accumulated in the current half-open phase.
    pub half_open_successes: u32,

    /// Probe calls currently in flight while half-open.
    pub half_open_in_flight: u32,

    /// Milliseconds since the last transport failure, if any.
    pub last_failure_age_ms: Option<u64>,

    /// Milliseconds since the last state transition.
    pub last_state_change_age_ms: u64,

    /// Total calls attempted through the breaker.
    pub total_requests: u64,

    /// Calls that completed successfully.
    pub successful_requests: u64,

    /// Calls that failed with a transport error.
    pub failed_requests: u64,

    /// Calls rejected without reaching the gateway.
    pub rejected_requests: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    last_failure_at: Option<Instant>,
    last_state_change: Instant,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    rejected_requests: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            last_failure_at: None,
            last_state_change: Instant::now(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            rejected_requests: 0,
        }
    }

    fn transition(&mut self, to: CircuitState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.last_state_change = Instant::now();
        match to {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.half_open_successes = 0;
            }
            CircuitState::HalfOpen => {
                self.half_open_successes = 0;
                self.half_open_in_flight = 0;
            }
            CircuitState::Open => {}
        }
        metrics::counter!(
            "gateway_circuit_transitions_total",
            "to" => to.as_str()
        )
        .increment(1);
        tracing::warn!(%from, %to, "circuit breaker state change");
    }
}

/// Circuit breaker over an async operation.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<RwLock<BreakerInner>>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            inner: Arc::new(RwLock::new(BreakerInner::new())),
        }
    }

    /// Creates a breaker with default thresholds.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Returns the current state.
    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Runs an operation through the breaker.
    ///
    /// Rejects immediately with `CircuitOpen` while open (and while
    /// half-open at the probe concurrency limit). The operation runs under
    /// the per-call timeout; a timeout or network error counts against the
    /// breaker, a decline does not.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let probing = self.admit().await?;

        let result = match tokio::time::timeout(self.config.per_call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        };

        self.settle(probing, &result).await;
        result
    }

    /// Admission check. Returns whether the call is a half-open probe.
    async fn admit(&self) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.total_requests += 1;

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_failure_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::MAX);
            if elapsed >= self.config.open_timeout {
                inner.transition(CircuitState::HalfOpen);
            } else {
                inner.rejected_requests += 1;
                metrics::counter!("gateway_circuit_rejections_total").increment(1);
                let remaining = self.config.open_timeout - elapsed;
                tracing::warn!("circuit open, rejecting call");
                return Err(GatewayError::CircuitOpen {
                    retry_after_ms: remaining.as_millis() as u64,
                });
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_in_flight >= self.config.half_open_max_concurrent {
                inner.rejected_requests += 1;
                metrics::counter!("gateway_circuit_rejections_total").increment(1);
                tracing::warn!("half-open probe limit reached, rejecting call");
                return Err(GatewayError::CircuitOpen { retry_after_ms: 0 });
            }
            inner.half_open_in_flight += 1;
            return Ok(true);
        }

        Ok(false)
    }

    /// Records the outcome of an admitted call.
    async fn settle<T>(&self, probing: bool, result: &Result<T>) {
        let mut inner = self.inner.write().await;

        if probing && inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }

        let transport_failure = matches!(result, Err(e) if e.is_transport_failure());
        if transport_failure {
            inner.failed_requests += 1;
            inner.consecutive_failures += 1;
            inner.last_failure_at = Some(Instant::now());

            match inner.state {
                CircuitState::HalfOpen => inner.transition(CircuitState::Open),
                CircuitState::Closed
                    if inner.consecutive_failures >= self.config.failure_threshold =>
                {
                    inner.transition(CircuitState::Open);
                }
                _ => {}
            }
        } else {
            inner.successful_requests += 1;
            inner.consecutive_failures = 0;

            if inner.state == CircuitState::HalfOpen {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.transition(CircuitState::Closed);
                }
            }
        }
    }

    /// Returns a point-in-time metrics snapshot.
    pub async fn metrics(&self) -> CircuitMetrics {
        let inner = self.inner.read().await;
        CircuitMetrics {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            half_open_in_flight: inner.half_open_in_flight,
            last_failure_age_ms: inner
                .last_failure_at
                .map(|at| at.elapsed().as_millis() as u64),
            last_state_change_age_ms: inner.last_state_change.elapsed().as_millis() as u64,
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            rejected_requests: inner.rejected_requests,
        }
    }

    /// Forces the breaker back to closed with zeroed counters.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        tracing::info!("circuit breaker reset");
        inner.transition(CircuitState::Closed);
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
        inner.last_failure_at = None;
    }

    /// Drives an explicit state transition (operational testing).
    pub async fn force_state(&self, state: CircuitState) {
        let mut inner = self.inner.write().await;
        inner.transition(state);
    }
}
