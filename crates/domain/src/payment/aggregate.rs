//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{PaymentEvent, PaymentStatus};

/// Event-sourced record of a single payment.
///
/// The record is the fold of its `PaymentEvent` history. It never mutates
/// itself; the saga orchestrator appends events and the fold catches up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Unique payment identifier.
    id: Option<AggregateId>,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    /// The paying user.
    user_id: Option<UserId>,

    /// Payment amount.
    amount: Money,

    /// The client-supplied idempotency key.
    idempotency_key: Option<String>,

    /// Current status, derived from saga milestones.
    status: PaymentStatus,

    /// Ledger reservation backing this payment, once funds are reserved.
    reservation_id: Option<AggregateId>,

    /// Gateway transaction reference, once processing succeeded.
    gateway_transaction_id: Option<String>,

    /// Failure reason recorded by PaymentFailed, if any.
    failure_reason: Option<String>,

    /// When the payment reached Completed.
    completed_at: Option<DateTime<Utc>>,
}

impl Aggregate for PaymentRecord {
    type Event = PaymentEvent;

    fn aggregate_type() -> &'static str {
        "Payment"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PaymentEvent::PaymentInitiated(data) => {
                self.id = Some(data.payment_id);
                self.user_id = Some(data.user_id);
                self.amount = data.amount;
                self.idempotency_key = Some(data.idempotency_key);
                self.status = PaymentStatus::Pending;
            }
            PaymentEvent::FundsReserved(data) => {
                self.reservation_id = Some(data.reservation_id);
                self.status = PaymentStatus::FundsReserved;
            }
            PaymentEvent::PaymentProcessing(data) => {
                self.gateway_transaction_id = data.gateway_transaction_id;
                self.status = PaymentStatus::Processing;
            }
            PaymentEvent::PaymentCompleted(data) => {
                self.completed_at = Some(data.completed_at);
                self.status = PaymentStatus::Completed;
            }
            PaymentEvent::PaymentFailed(data) => {
                self.failure_reason = Some(data.reason);
                self.status = PaymentStatus::Compensating;
            }
            PaymentEvent::PaymentCompensated(_) => {
                self.status = PaymentStatus::Compensated;
            }
        }
    }
}

impl SnapshotCapable for PaymentRecord {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl PaymentRecord {
    /// Returns the paying user.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Returns the payment amount.
    pub fn amount(&self) -> Money {
        self.amount
    }

    /// Returns the idempotency key the payment was created with.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    /// Returns the current status.
    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Returns the backing ledger reservation, if funds were reserved.
    pub fn reservation_id(&self) -> Option<AggregateId> {
        self.reservation_id
    }

    /// Returns the gateway transaction reference, if processing succeeded.
    pub fn gateway_transaction_id(&self) -> Option<&str> {
        self.gateway_transaction_id.as_deref()
    }

    /// Returns the recorded failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns when the payment completed.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns true if the payment is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
