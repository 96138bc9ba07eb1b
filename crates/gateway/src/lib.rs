//! External payment gateway integration.
//!
//! The gateway is the one unreliable collaborator in the system, so every
//! call goes through a [`CircuitBreaker`]: transport failures (timeouts,
//! network errors) trip it open, business declines do not. The bundled
//! [`GatewaySimulator`] stands in for the real processor with explicit,
//! operator-controllable failure modes.

pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod simulator;
pub mod types;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use client::{GatewayClient, PaymentGateway};
pub use error::{GatewayError, Result};
pub use simulator::{FailureMode, GatewaySimulator, GatewayStats};
pub use types::{
    GatewayHealth, GatewayRequest, GatewayResponse, GatewayStatus, RefundRequest, RefundResponse,
};
