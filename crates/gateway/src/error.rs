use thiserror::Error;

/// Errors produced by gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The circuit breaker rejected the call without contacting the gateway.
    #[error("Circuit breaker is open, retry in {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },

    /// The gateway did not respond within the per-call timeout.
    #[error("Gateway request timed out")]
    Timeout,

    /// The gateway could not be reached.
    #[error("Gateway network error: {0}")]
    Network(String),

    /// The gateway responded and declined the transaction.
    #[error("Transaction declined ({code}): {message}")]
    Declined { code: String, message: String },
}

impl GatewayError {
    /// Returns true for failures that should count against the circuit
    /// breaker. A decline is a healthy gateway saying no, not an outage.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Network(_))
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
