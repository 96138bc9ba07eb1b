use common::AggregateId;
use thiserror::Error;

/// Errors produced by the saga service layer.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request failed validation before any side effect.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request conflicts with an in-flight or recorded operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No payment exists with the given ID.
    #[error("Payment {0} not found")]
    PaymentNotFound(AggregateId),

    /// No saga execution exists for the given payment.
    #[error("No saga execution found for payment {0}")]
    SagaNotFound(AggregateId),

    /// A ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] ledger::LedgerError),

    /// A gateway call failed.
    #[error(transparent)]
    Gateway(#[from] gateway::GatewayError),

    /// A domain/event-store operation failed.
    #[error(transparent)]
    Domain(#[from] domain::DomainError),

    /// A projection update failed.
    #[error(transparent)]
    Projection(#[from] projections::ProjectionError),
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;
