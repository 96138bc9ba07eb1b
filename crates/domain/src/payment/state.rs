//! Payment status machine.

use serde::{Deserialize, Serialize};

/// The status of a payment, driven exclusively by saga progress.
///
/// Transitions:
/// ```text
/// Pending ──► FundsReserved ──► Processing ──► Completed
///    │              │               │
///    └──────────────┴───────────────┴──► Compensating ──► Compensated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Payment row exists, saga not yet past the first step.
    #[default]
    Pending,

    /// Funds are reserved on the payer's account.
    FundsReserved,

    /// The gateway call is in flight or approved, confirmation pending.
    Processing,

    /// Funds debited and confirmed (terminal state).
    Completed,

    /// A step failed; completed steps are being undone.
    Compensating,

    /// Compensation finished; the payment did not happen (terminal state).
    Compensated,
}

impl PaymentStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Compensated)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::FundsReserved => "FundsReserved",
            PaymentStatus::Processing => "Processing",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Compensating => "Compensating",
            PaymentStatus::Compensated => "Compensated",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
