//! Payment status read model — one row per payment.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, Money, UserId};
use domain::{PaymentEvent, PaymentStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Denormalized view of a single payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusSummary {
    pub payment_id: AggregateId,
    pub user_id: Option<UserId>,
    pub amount: Money,
    pub status: PaymentStatus,
    pub reservation_id: Option<AggregateId>,
    pub gateway_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Events folded into this row.
    pub event_count: u64,
}

/// Read model view of payment status, keyed by payment ID.
///
/// Unknown payment event types are counted and skipped; the feed never
/// fails on them.
#[derive(Clone)]
pub struct PaymentStatusView {
    payments: Arc<RwLock<HashMap<AggregateId, PaymentStatusSummary>>>,
    position: Arc<RwLock<ProjectionPosition>>,
    skipped: Arc<RwLock<u64>>,
}

impl PaymentStatusView {
    /// Creates a new empty view.
    pub fn new() -> Self {
        Self {
            payments: Arc::new(RwLock::new(HashMap::new())),
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            skipped: Arc::new(RwLock::new(0)),
        }
    }

    /// Gets the summary for one payment.
    pub async fn get_payment(&self, payment_id: AggregateId) -> Option<PaymentStatusSummary> {
        self.payments.read().await.get(&payment_id).cloned()
    }

    /// Gets all payment summaries.
    pub async fn get_all_payments(&self) -> Vec<PaymentStatusSummary> {
        self.payments.read().await.values().cloned().collect()
    }

    /// Gets summaries filtered by status.
    pub async fn get_payments_by_status(
        &self,
        status: PaymentStatus,
    ) -> Vec<PaymentStatusSummary> {
        self.payments
            .read()
            .await
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect()
    }

    /// Gets summaries for a user.
    pub async fn get_payments_by_user(&self, user_id: &UserId) -> Vec<PaymentStatusSummary> {
        self.payments
            .read()
            .await
            .values()
            .filter(|p| p.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect()
    }

    /// Events the view declined to interpret.
    pub async fn skipped_count(&self) -> u64 {
        *self.skipped.read().await
    }

    async fn advance(&self) {
        let mut pos = self.position.write().await;
        *pos = pos.advance();
    }
}

impl Default for PaymentStatusView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for PaymentStatusView {
    fn name(&self) -> &'static str {
        "PaymentStatusView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != "Payment" {
            self.advance().await;
            return Ok(());
        }

        let payment_event: PaymentEvent = match serde_json::from_value(event.payload.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                *self.skipped.write().await += 1;
                tracing::warn!(
                    event_type = %event.event_type,
                    "skipping unrecognized payment event: {err}"
                );
                self.advance().await;
                return Ok(());
            }
        };
        let payment_id = event.aggregate_id;

        let mut payments = self.payments.write().await;

        match payment_event {
            PaymentEvent::PaymentInitiated(data) => {
                payments.insert(
                    payment_id,
                    PaymentStatusSummary {
                        payment_id,
                        user_id: Some(data.user_id),
                        amount: data.amount,
                        status: PaymentStatus::Pending,
                        reservation_id: None,
                        gateway_transaction_id: None,
                        failure_reason: None,
                        completed_at: None,
                        updated_at: data.initiated_at,
                        event_count: 1,
                    },
                );
            }
            PaymentEvent::FundsReserved(data) => {
                if let Some(payment) = payments.get_mut(&payment_id) {
                    payment.status = PaymentStatus::FundsReserved;
                    payment.reservation_id = Some(data.reservation_id);
                    payment.updated_at = data.reserved_at;
                    payment.event_count += 1;
                }
            }
            PaymentEvent::PaymentProcessing(data) => {
                if let Some(payment) = payments.get_mut(&payment_id) {
                    payment.status = PaymentStatus::Processing;
                    payment.gateway_transaction_id = data.gateway_transaction_id;
                    payment.updated_at = data.started_at;
                    payment.event_count += 1;
                }
            }
            PaymentEvent::PaymentCompleted(data) => {
                if let Some(payment) = payments.get_mut(&payment_id) {
                    payment.status = PaymentStatus::Completed;
                    payment.completed_at = Some(data.completed_at);
                    payment.updated_at = data.completed_at;
                    payment.event_count += 1;
                }
            }
            PaymentEvent::PaymentFailed(data) => {
                if let Some(payment) = payments.get_mut(&payment_id) {
                    payment.status = PaymentStatus::Compensating;
                    payment.failure_reason = Some(data.reason);
                    payment.updated_at = data.failed_at;
                    payment.event_count += 1;
                }
            }
            PaymentEvent::PaymentCompensated(data) => {
                if let Some(payment) = payments.get_mut(&payment_id) {
                    payment.status = PaymentStatus::Compensated;
                    payment.updated_at = data.compensated_at;
                    payment.event_count += 1;
                }
            }
        }

        drop(payments);
        self.advance().await;
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.payments.write().await.clear();
        *self.skipped.write().await = 0;
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for PaymentStatusView {
    fn name(&self) -> &'static str {
        "PaymentStatusView"
    }

    fn count(&self) -> usize {
        self.payments.try_read().map(|p| p.len()).unwrap_or(0)
    }
}
