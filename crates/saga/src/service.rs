//! The payment service: idempotency guard plus saga orchestration.
//!
//! `create_payment` is the single write entry point for payments. It
//! validates the request, classifies the idempotency key, creates (or
//! reuses) the payment record, runs the saga to a terminal state, and
//! settles the key binding.

use std::sync::Arc;

use common::{AggregateId, Money, UserId};
use domain::{AggregateStore, PaymentEvent, PaymentRecord};
use event_store::{EventQuery, EventStore};
use gateway::{GatewayClient, PaymentGateway};
use ledger::AccountLedger;
use projections::ProjectionProcessor;
use serde::Deserialize;

use crate::error::{Result, SagaError};
use crate::execution::SagaExecution;
use crate::idempotency::{IdempotencyGuard, KeyCheck};
use crate::orchestrator::SagaOrchestrator;

/// A request to create and process a payment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayment {
    /// The paying user.
    pub user_id: UserId,

    /// Amount to charge.
    pub amount: Money,

    /// Client-supplied idempotency key.
    pub idempotency_key: String,
}

/// Coordinates payment creation end to end.
pub struct PaymentService<S: EventStore, G: GatewayClient> {
    payments: AggregateStore<S, PaymentRecord>,
    orchestrator: SagaOrchestrator<S, G>,
    guard: IdempotencyGuard,
    processor: Option<Arc<ProjectionProcessor<S>>>,
}

impl<S: EventStore, G: GatewayClient> Clone for PaymentService<S, G> {
    fn clone(&self) -> Self {
        Self {
            payments: self.payments.clone(),
            orchestrator: self.orchestrator.clone(),
            guard: self.guard.clone(),
            processor: self.processor.clone(),
        }
    }
}

impl<S: EventStore, G: GatewayClient> PaymentService<S, G> {
    /// Creates a service over shared infrastructure.
    pub fn new(store: Arc<S>, ledger: AccountLedger<S>, gateway: PaymentGateway<G>) -> Self {
        Self {
            payments: AggregateStore::new(Arc::clone(&store)),
            orchestrator: SagaOrchestrator::new(store, ledger, gateway),
            guard: IdempotencyGuard::new(),
            processor: None,
        }
    }

    /// Attaches a projection processor to catch up after each payment.
    pub fn with_projections(mut self, processor: Arc<ProjectionProcessor<S>>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Creates a payment and runs its saga to a terminal state.
    ///
    /// Idempotent per key: a replay of a finished payment returns the
    /// recorded result without re-executing anything; a concurrent
    /// duplicate is rejected as a conflict; a retry after a failure
    /// reuses the original payment ID.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_payment(&self, request: CreatePayment) -> Result<PaymentRecord> {
        if request.idempotency_key.trim().is_empty() {
            return Err(SagaError::Validation(
                "idempotency key must not be empty".to_string(),
            ));
        }
        if !request.amount.is_positive() {
            return Err(SagaError::Validation(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }

        let candidate_id = AggregateId::new();
        let payment_id = match self
            .guard
            .check_or_create(&request.idempotency_key, candidate_id)
            .await
        {
            KeyCheck::Completed(payment_id) => {
                metrics::counter!("payments_idempotent_replays_total").increment(1);
                tracing::info!(payment_id = %payment_id, "returning recorded payment for key");
                return self.require_payment(payment_id).await;
            }
            KeyCheck::InFlight(payment_id) => {
                metrics::counter!("payments_key_conflicts_total").increment(1);
                return Err(SagaError::Conflict(format!(
                    "payment {payment_id} for this idempotency key is still processing"
                )));
            }
            KeyCheck::RetryFailed(payment_id) => {
                tracing::info!(payment_id = %payment_id, "retrying failed payment for key");
                payment_id
            }
            KeyCheck::New => candidate_id,
        };

        match self.run(payment_id, &request).await {
            Ok(payment) => {
                self.guard.mark_completed(&request.idempotency_key).await;
                Ok(payment)
            }
            Err(e) => {
                self.guard.mark_failed(&request.idempotency_key).await;
                Err(e)
            }
        }
    }

    /// Returns a payment by ID, if it exists.
    pub async fn find_payment(&self, payment_id: AggregateId) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.load_existing(payment_id).await?)
    }

    /// Returns all payments, in initiation order.
    pub async fn list_payments(&self) -> Result<Vec<PaymentRecord>> {
        let envelopes = self
            .payments
            .store()
            .query_events(EventQuery::for_event_type("PaymentInitiated"))
            .await
            .map_err(domain::DomainError::from)?;

        let mut payments = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            if let Some(payment) = self.payments.load_existing(envelope.aggregate_id).await? {
                payments.push(payment);
            }
        }
        Ok(payments)
    }

    /// Returns the saga execution behind a payment, if one ran.
    pub async fn find_saga_execution(
        &self,
        payment_id: AggregateId,
    ) -> Result<Option<SagaExecution>> {
        self.orchestrator.find_execution(payment_id).await
    }

    /// Returns the idempotency guard, for inspection.
    pub fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }

    async fn run(&self, payment_id: AggregateId, request: &CreatePayment) -> Result<PaymentRecord> {
        // A retried payment already has its initiation event.
        if self.payments.load_existing(payment_id).await?.is_none() {
            self.payments
                .append_events(
                    payment_id,
                    Some(&request.user_id),
                    vec![PaymentEvent::payment_initiated(
                        payment_id,
                        request.user_id.clone(),
                        request.amount,
                        request.idempotency_key.clone(),
                    )],
                )
                .await?;
        }

        let outcome = self
            .orchestrator
            .execute(payment_id, &request.user_id, request.amount)
            .await?;
        tracing::info!(
            payment_id = %payment_id,
            saga_id = %outcome.saga_id,
            status = %outcome.status,
            "saga finished"
        );

        if let Some(processor) = &self.processor {
            processor.run_catch_up().await?;
        }

        self.require_payment(payment_id).await
    }

    async fn require_payment(&self, payment_id: AggregateId) -> Result<PaymentRecord> {
        self.payments
            .load_existing(payment_id)
            .await?
            .ok_or(SagaError::PaymentNotFound(payment_id))
    }
}
