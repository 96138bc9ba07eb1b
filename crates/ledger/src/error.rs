use common::Money;
use thiserror::Error;

/// Errors produced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No account exists for the given user.
    #[error("No account found for user {0}")]
    AccountNotFound(String),

    /// An account already exists for the given user.
    #[error("An account already exists for user {0}")]
    AccountExists(String),

    /// No reservation exists for the given payment.
    #[error("No reservation found for payment {0}")]
    ReservationNotFound(String),

    /// The account's available balance cannot cover the requested amount.
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Money, required: Money },

    /// The reservation is not in a state that permits the operation.
    #[error("Reservation for payment {payment_id} is {status}, cannot {action}")]
    InvalidState {
        payment_id: String,
        status: &'static str,
        action: &'static str,
    },

    /// The amount is not positive.
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Money),

    /// A domain/event-store error occurred while recording the mutation.
    #[error(transparent)]
    Domain(#[from] domain::DomainError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
