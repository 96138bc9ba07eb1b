//! Payment domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a payment aggregate.
///
/// One event is appended per saga milestone; the payment's status is the
/// fold of these events, never set directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    /// Payment was created and the saga admitted.
    PaymentInitiated(PaymentInitiatedData),

    /// Funds were reserved on the payer's account.
    FundsReserved(FundsReservedData),

    /// The gateway approved the transaction; confirmation pending.
    PaymentProcessing(PaymentProcessingData),

    /// The reservation was confirmed and the payment finished.
    PaymentCompleted(PaymentCompletedData),

    /// A forward step failed; compensation is about to run.
    PaymentFailed(PaymentFailedData),

    /// Compensation finished; the payment is undone.
    PaymentCompensated(PaymentCompensatedData),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentInitiated(_) => "PaymentInitiated",
            PaymentEvent::FundsReserved(_) => "FundsReserved",
            PaymentEvent::PaymentProcessing(_) => "PaymentProcessing",
            PaymentEvent::PaymentCompleted(_) => "PaymentCompleted",
            PaymentEvent::PaymentFailed(_) => "PaymentFailed",
            PaymentEvent::PaymentCompensated(_) => "PaymentCompensated",
        }
    }
}

/// Data for PaymentInitiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiatedData {
    /// The unique payment ID.
    pub payment_id: AggregateId,

    /// The user making the payment.
    pub user_id: UserId,

    /// Payment amount.
    pub amount: Money,

    /// The client-supplied idempotency key.
    pub idempotency_key: String,

    /// When the payment was initiated.
    pub initiated_at: DateTime<Utc>,
}

/// Data for FundsReserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsReservedData {
    /// The ledger reservation backing this payment.
    pub reservation_id: AggregateId,

    /// Reserved amount.
    pub amount: Money,

    /// When the reservation was made.
    pub reserved_at: DateTime<Utc>,
}

/// Data for PaymentProcessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProcessingData {
    /// The gateway's transaction reference.
    pub gateway_transaction_id: Option<String>,

    /// When gateway processing succeeded.
    pub started_at: DateTime<Utc>,
}

/// Data for PaymentCompleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    /// When the payment completed.
    pub completed_at: DateTime<Utc>,
}

/// Data for PaymentFailed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    /// Name of the step that failed.
    pub step_name: String,

    /// The failure reason as reported by the step.
    pub reason: String,

    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
}

/// Data for PaymentCompensated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompensatedData {
    /// When compensation finished.
    pub compensated_at: DateTime<Utc>,
}

// Convenience constructors for events
impl PaymentEvent {
    /// Creates a PaymentInitiated event.
    pub fn payment_initiated(
        payment_id: AggregateId,
        user_id: UserId,
        amount: Money,
        idempotency_key: impl Into<String>,
    ) -> Self {
        PaymentEvent::PaymentInitiated(PaymentInitiatedData {
            payment_id,
            user_id,
            amount,
            idempotency_key: idempotency_key.into(),
            initiated_at: Utc::now(),
        })
    }

    /// Creates a FundsReserved event.
    pub fn funds_reserved(reservation_id: AggregateId, amount: Money) -> Self {
        PaymentEvent::FundsReserved(FundsReservedData {
            reservation_id,
            amount,
            reserved_at: Utc::now(),
        })
    }

    /// Creates a PaymentProcessing event.
    pub fn payment_processing(gateway_transaction_id: Option<String>) -> Self {
        PaymentEvent::PaymentProcessing(PaymentProcessingData {
            gateway_transaction_id,
            started_at: Utc::now(),
        })
    }

    /// Creates a PaymentCompleted event.
    pub fn payment_completed() -> Self {
        PaymentEvent::PaymentCompleted(PaymentCompletedData {
            completed_at: Utc::now(),
        })
    }

    /// Creates a PaymentFailed event.
    pub fn payment_failed(step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        PaymentEvent::PaymentFailed(PaymentFailedData {
            step_name: step_name.into(),
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }

    /// Creates a PaymentCompensated event.
    pub fn payment_compensated() -> Self {
        PaymentEvent::PaymentCompensated(PaymentCompensatedData {
            compensated_at: Utc::now(),
        })
    }
}
