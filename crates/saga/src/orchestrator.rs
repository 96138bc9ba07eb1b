//! The payment saga orchestrator.
//!
//! Drives the step pipeline for one payment, recording every transition
//! as events on both the saga execution and the payment aggregate. A
//! business failure in any step (insufficient funds, a decline, an open
//! circuit) triggers compensation of the completed steps in reverse
//! order; infrastructure failures while recording events propagate to the
//! caller instead.

use std::collections::HashMap;
use std::sync::Arc;

use common::{AggregateId, Money, UserId};
use domain::{AggregateStore, PaymentEvent, PaymentRecord};
use event_store::{EventQuery, EventStore};
use gateway::{GatewayClient, GatewayRequest, PaymentGateway, RefundRequest};
use ledger::{AccountLedger, LedgerError};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::execution::SagaExecution;
use crate::state::SagaStatus;
use crate::steps::{CompensationAction, PAYMENT_SAGA_STEPS, SAGA_TYPE, StepAction, step_by_name};

/// Result of one compensating action during rollback.
#[derive(Debug, Clone, Serialize)]
pub struct CompensationOutcome {
    /// The step being compensated.
    pub step_name: String,

    /// Whether the compensating action succeeded.
    pub succeeded: bool,

    /// Error message if it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final result of a saga run.
#[derive(Debug, Clone, Serialize)]
pub struct SagaOutcome {
    /// The saga execution ID.
    pub saga_id: AggregateId,

    /// The payment the saga processed.
    pub payment_id: AggregateId,

    /// Terminal status: Completed or Compensated.
    pub status: SagaStatus,

    /// The failure that triggered compensation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Outcomes of the compensating actions that ran, in rollback order.
    pub compensations: Vec<CompensationOutcome>,
}

/// Context accumulated while executing steps, consumed by compensation.
#[derive(Debug, Default)]
struct StepContext {
    reservation_id: Option<AggregateId>,
    gateway_transaction_id: Option<String>,
    completed: Vec<&'static str>,
}

/// What a forward step produced.
enum StepResult {
    /// The step succeeded; context fields it filled in.
    Done {
        reservation_id: Option<AggregateId>,
        gateway_transaction_id: Option<String>,
    },

    /// The step failed for a business reason; the saga must compensate.
    Failed(String),
}

/// Orchestrates payment sagas over an event store, the account ledger,
/// and the breaker-wrapped gateway.
pub struct SagaOrchestrator<S: EventStore, G: GatewayClient> {
    sagas: AggregateStore<S, SagaExecution>,
    payments: AggregateStore<S, PaymentRecord>,
    ledger: AccountLedger<S>,
    gateway: PaymentGateway<G>,
    by_payment: Arc<RwLock<HashMap<AggregateId, AggregateId>>>,
}

impl<S: EventStore, G: GatewayClient> Clone for SagaOrchestrator<S, G> {
    fn clone(&self) -> Self {
        Self {
            sagas: self.sagas.clone(),
            payments: self.payments.clone(),
            ledger: self.ledger.clone(),
            gateway: self.gateway.clone(),
            by_payment: Arc::clone(&self.by_payment),
        }
    }
}

impl<S: EventStore, G: GatewayClient> SagaOrchestrator<S, G> {
    /// Creates an orchestrator over shared infrastructure.
    pub fn new(store: Arc<S>, ledger: AccountLedger<S>, gateway: PaymentGateway<G>) -> Self {
        Self {
            sagas: AggregateStore::new(Arc::clone(&store)),
            payments: AggregateStore::new(store),
            ledger,
            gateway,
            by_payment: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Runs the payment pipeline for one payment to a terminal state.
    ///
    /// Returns `Ok` with a Completed or Compensated outcome; `Err` only
    /// for infrastructure failures (event append conflicts exhausting
    /// retries, store errors).
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id, user_id = %user_id))]
    pub async fn execute(
        &self,
        payment_id: AggregateId,
        user_id: &UserId,
        amount: Money,
    ) -> Result<SagaOutcome> {
        let saga_id = AggregateId::new();
        self.by_payment.write().await.insert(payment_id, saga_id);

        self.sagas
            .append_events(
                saga_id,
                Some(user_id),
                vec![SagaEvent::saga_started(saga_id, payment_id, SAGA_TYPE)],
            )
            .await?;
        tracing::info!(saga_id = %saga_id, "saga started");

        let mut ctx = StepContext::default();

        for step in PAYMENT_SAGA_STEPS {
            self.sagas
                .append_events(
                    saga_id,
                    Some(user_id),
                    vec![SagaEvent::step_started(step.name)],
                )
                .await?;

            let result = match step.action {
                StepAction::ReserveFunds => {
                    self.reserve_funds(payment_id, user_id, amount).await?
                }
                StepAction::ProcessPayment => {
                    self.process_payment(payment_id, user_id, amount).await
                }
                StepAction::ConfirmPayment => self.confirm_payment(payment_id).await?,
            };

            match result {
                StepResult::Done {
                    reservation_id,
                    gateway_transaction_id,
                } => {
                    if let Some(id) = reservation_id {
                        ctx.reservation_id = Some(id);
                    }
                    if let Some(txn) = gateway_transaction_id.clone() {
                        ctx.gateway_transaction_id = Some(txn);
                    }
                    ctx.completed.push(step.name);

                    self.sagas
                        .append_events(
                            saga_id,
                            Some(user_id),
                            vec![SagaEvent::step_completed(
                                step.name,
                                reservation_id,
                                gateway_transaction_id,
                            )],
                        )
                        .await?;
                    self.record_milestone(payment_id, user_id, step.action, &ctx, amount)
                        .await?;
                    tracing::info!(saga_id = %saga_id, step = step.name, "step completed");
                }
                StepResult::Failed(reason) => {
                    metrics::counter!("saga_steps_failed_total", "step" => step.name)
                        .increment(1);
                    tracing::warn!(
                        saga_id = %saga_id,
                        step = step.name,
                        reason = %reason,
                        "step failed, compensating"
                    );

                    self.sagas
                        .append_events(
                            saga_id,
                            Some(user_id),
                            vec![SagaEvent::step_failed(step.name, reason.clone())],
                        )
                        .await?;
                    self.payments
                        .append_events(
                            payment_id,
                            Some(user_id),
                            vec![PaymentEvent::payment_failed(step.name, reason.clone())],
                        )
                        .await?;

                    let compensations = self
                        .compensate(saga_id, payment_id, user_id, step.name, &ctx, amount)
                        .await?;

                    metrics::counter!("saga_compensated_total").increment(1);
                    return Ok(SagaOutcome {
                        saga_id,
                        payment_id,
                        status: SagaStatus::Compensated,
                        failure_reason: Some(reason),
                        compensations,
                    });
                }
            }
        }

        self.sagas
            .append_events(saga_id, Some(user_id), vec![SagaEvent::saga_completed()])
            .await?;

        metrics::counter!("saga_completed_total").increment(1);
        tracing::info!(saga_id = %saga_id, "saga completed");

        Ok(SagaOutcome {
            saga_id,
            payment_id,
            status: SagaStatus::Completed,
            failure_reason: None,
            compensations: Vec::new(),
        })
    }

    /// Returns the saga execution for a payment, if one ran.
    ///
    /// The in-memory mapping is a cache; on a miss the mapping is
    /// recovered from the log, so lookups survive a process restart over
    /// a durable store.
    pub async fn find_execution(&self, payment_id: AggregateId) -> Result<Option<SagaExecution>> {
        let saga_id = {
            let map = self.by_payment.read().await;
            map.get(&payment_id).copied()
        };
        let saga_id = match saga_id {
            Some(id) => Some(id),
            None => self.recover_saga_id(payment_id).await?,
        };
        match saga_id {
            Some(saga_id) => Ok(self.sagas.load_existing(saga_id).await?),
            None => Ok(None),
        }
    }

    /// Scans SagaStarted events for the one that references this payment
    /// and repopulates the cache with what it finds.
    async fn recover_saga_id(&self, payment_id: AggregateId) -> Result<Option<AggregateId>> {
        let envelopes = self
            .sagas
            .store()
            .query_events(EventQuery::for_event_type("SagaStarted"))
            .await
            .map_err(domain::DomainError::from)?;

        for envelope in envelopes {
            let Ok(SagaEvent::SagaStarted(data)) =
                serde_json::from_value::<SagaEvent>(envelope.payload)
            else {
                continue;
            };
            if data.payment_id == payment_id {
                self.by_payment
                    .write()
                    .await
                    .insert(payment_id, data.saga_id);
                return Ok(Some(data.saga_id));
            }
        }
        Ok(None)
    }

    async fn reserve_funds(
        &self,
        payment_id: AggregateId,
        user_id: &UserId,
        amount: Money,
    ) -> Result<StepResult> {
        match self.ledger.reserve_funds(user_id, payment_id, amount).await {
            Ok(reservation) => Ok(StepResult::Done {
                reservation_id: Some(reservation.id),
                gateway_transaction_id: None,
            }),
            Err(LedgerError::Domain(e)) => Err(SagaError::Domain(e)),
            Err(e) => Ok(StepResult::Failed(e.to_string())),
        }
    }

    async fn process_payment(
        &self,
        payment_id: AggregateId,
        user_id: &UserId,
        amount: Money,
    ) -> StepResult {
        let request = GatewayRequest {
            payment_id,
            user_id: user_id.clone(),
            amount,
        };
        match self.gateway.process_transaction(request).await {
            Ok(response) if response.is_approved() => StepResult::Done {
                reservation_id: None,
                gateway_transaction_id: Some(response.transaction_id),
            },
            Ok(response) => {
                let reason = response
                    .error_message
                    .or(response.error_code)
                    .unwrap_or_else(|| format!("gateway returned {:?}", response.status));
                StepResult::Failed(reason)
            }
            Err(e) => StepResult::Failed(e.to_string()),
        }
    }

    async fn confirm_payment(&self, payment_id: AggregateId) -> Result<StepResult> {
        match self.ledger.confirm_reservation(payment_id).await {
            Ok(_) => Ok(StepResult::Done {
                reservation_id: None,
                gateway_transaction_id: None,
            }),
            Err(LedgerError::Domain(e)) => Err(SagaError::Domain(e)),
            Err(e) => Ok(StepResult::Failed(e.to_string())),
        }
    }

    /// Appends the payment milestone event matching a completed step.
    async fn record_milestone(
        &self,
        payment_id: AggregateId,
        user_id: &UserId,
        action: StepAction,
        ctx: &StepContext,
        amount: Money,
    ) -> Result<()> {
        let event = match action {
            StepAction::ReserveFunds => {
                let reservation_id = match ctx.reservation_id {
                    Some(id) => id,
                    None => return Ok(()),
                };
                PaymentEvent::funds_reserved(reservation_id, amount)
            }
            StepAction::ProcessPayment => {
                PaymentEvent::payment_processing(ctx.gateway_transaction_id.clone())
            }
            StepAction::ConfirmPayment => PaymentEvent::payment_completed(),
        };
        self.payments
            .append_events(payment_id, Some(user_id), vec![event])
            .await?;
        Ok(())
    }

    /// Runs compensating actions for the completed steps, newest first.
    ///
    /// Best-effort: a failing compensation is recorded and the loop
    /// continues, so one stuck refund never blocks releasing a
    /// reservation.
    async fn compensate(
        &self,
        saga_id: AggregateId,
        payment_id: AggregateId,
        user_id: &UserId,
        failed_step: &str,
        ctx: &StepContext,
        amount: Money,
    ) -> Result<Vec<CompensationOutcome>> {
        self.sagas
            .append_events(
                saga_id,
                Some(user_id),
                vec![SagaEvent::compensation_started(failed_step)],
            )
            .await?;

        let mut outcomes = Vec::new();

        for step_name in ctx.completed.iter().rev() {
            let Some(action) = step_by_name(step_name).and_then(|s| s.compensation) else {
                continue;
            };

            let result = match action {
                CompensationAction::ReleaseReservation => self
                    .ledger
                    .release_reservation(payment_id)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                CompensationAction::RefundTransaction => {
                    self.refund(ctx.gateway_transaction_id.as_deref(), amount)
                        .await
                }
            };

            let (event, outcome) = match result {
                Ok(()) => {
                    tracing::info!(saga_id = %saga_id, step = step_name, "compensation applied");
                    (
                        SagaEvent::compensation_step_completed(*step_name),
                        CompensationOutcome {
                            step_name: step_name.to_string(),
                            succeeded: true,
                            error: None,
                        },
                    )
                }
                Err(error) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(
                        saga_id = %saga_id,
                        step = step_name,
                        error = %error,
                        "compensation failed, continuing"
                    );
                    (
                        SagaEvent::compensation_step_failed(*step_name, error.clone()),
                        CompensationOutcome {
                            step_name: step_name.to_string(),
                            succeeded: false,
                            error: Some(error),
                        },
                    )
                }
            };

            self.sagas
                .append_events(saga_id, Some(user_id), vec![event])
                .await?;
            outcomes.push(outcome);
        }

        let reason = self
            .sagas
            .require(saga_id)
            .await?
            .failure_reason()
            .unwrap_or("step failed")
            .to_string();

        self.sagas
            .append_events(
                saga_id,
                Some(user_id),
                vec![SagaEvent::saga_compensated(reason)],
            )
            .await?;
        self.payments
            .append_events(
                payment_id,
                Some(user_id),
                vec![PaymentEvent::payment_compensated()],
            )
            .await?;

        Ok(outcomes)
    }

    async fn refund(
        &self,
        transaction_id: Option<&str>,
        amount: Money,
    ) -> std::result::Result<(), String> {
        let Some(transaction_id) = transaction_id else {
            return Err("no gateway transaction to refund".to_string());
        };
        self.gateway
            .refund_transaction(RefundRequest {
                transaction_id: transaction_id.to_string(),
                amount,
                reason: Some("saga compensation".to_string()),
            })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepStatus;
    use crate::steps::{STEP_CONFIRM_PAYMENT, STEP_PROCESS_PAYMENT, STEP_RESERVE_FUNDS};
    use event_store::InMemoryEventStore;
    use gateway::{CircuitBreakerConfig, FailureMode, GatewaySimulator};
    use std::time::Duration;

    struct Harness {
        orchestrator: SagaOrchestrator<InMemoryEventStore, GatewaySimulator>,
        ledger: AccountLedger<InMemoryEventStore>,
        simulator: Arc<GatewaySimulator>,
        user_id: UserId,
    }

    async fn harness(initial_balance: i64) -> Harness {
        let store = Arc::new(InMemoryEventStore::new());
        let ledger = AccountLedger::new(Arc::clone(&store));
        let user_id = UserId::new("user-1");
        ledger
            .create_account(user_id.clone(), Money::from_cents(initial_balance))
            .await
            .unwrap();

        let simulator = Arc::new(GatewaySimulator::new());
        simulator.set_latency(Duration::from_millis(0));
        let gateway = PaymentGateway::with_config(
            Arc::clone(&simulator),
            CircuitBreakerConfig {
                failure_threshold: 2,
                ..CircuitBreakerConfig::default()
            },
        );

        Harness {
            orchestrator: SagaOrchestrator::new(store, ledger.clone(), gateway),
            ledger,
            simulator,
            user_id,
        }
    }

    #[tokio::test]
    async fn happy_path_completes_and_debits() {
        let h = harness(10_000).await;
        let payment_id = AggregateId::new();

        let outcome = h
            .orchestrator
            .execute(payment_id, &h.user_id, Money::from_cents(10_000))
            .await
            .unwrap();

        assert_eq!(outcome.status, SagaStatus::Completed);
        assert!(outcome.compensations.is_empty());

        let account = h.ledger.find_by_user(&h.user_id).await.unwrap();
        assert_eq!(account.balance.cents(), 0);
        assert_eq!(account.reserved_balance.cents(), 0);

        let saga = h
            .orchestrator
            .find_execution(payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            saga.completed_steps(),
            vec![STEP_RESERVE_FUNDS, STEP_PROCESS_PAYMENT, STEP_CONFIRM_PAYMENT]
        );
    }

    #[tokio::test]
    async fn insufficient_funds_compensates_nothing() {
        let h = harness(500).await;
        let payment_id = AggregateId::new();

        let outcome = h
            .orchestrator
            .execute(payment_id, &h.user_id, Money::from_cents(10_000))
            .await
            .unwrap();

        assert_eq!(outcome.status, SagaStatus::Compensated);
        assert!(outcome.compensations.is_empty());
        assert!(
            outcome
                .failure_reason
                .as_deref()
                .unwrap()
                .contains("Insufficient funds")
        );

        let account = h.ledger.find_by_user(&h.user_id).await.unwrap();
        assert_eq!(account.balance.cents(), 500);
        assert_eq!(account.reserved_balance.cents(), 0);
    }

    #[tokio::test]
    async fn decline_releases_the_reservation() {
        let h = harness(10_000).await;
        h.simulator.set_mode(FailureMode::Decline);
        let payment_id = AggregateId::new();

        let outcome = h
            .orchestrator
            .execute(payment_id, &h.user_id, Money::from_cents(10_000))
            .await
            .unwrap();

        assert_eq!(outcome.status, SagaStatus::Compensated);
        assert_eq!(outcome.compensations.len(), 1);
        assert_eq!(outcome.compensations[0].step_name, STEP_RESERVE_FUNDS);
        assert!(outcome.compensations[0].succeeded);

        // Funds back in full, nothing held.
        let account = h.ledger.find_by_user(&h.user_id).await.unwrap();
        assert_eq!(account.balance.cents(), 10_000);
        assert_eq!(account.reserved_balance.cents(), 0);

        let saga = h
            .orchestrator
            .find_execution(payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saga.status(), SagaStatus::Compensated);

        let steps = saga.steps();
        assert_eq!(steps[0].step_name, STEP_RESERVE_FUNDS);
        assert_eq!(steps[0].status, StepStatus::Compensated);
        assert_eq!(steps[1].step_name, STEP_PROCESS_PAYMENT);
        assert_eq!(steps[1].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn network_failure_compensates_like_a_decline() {
        let h = harness(10_000).await;
        h.simulator.set_mode(FailureMode::NetworkError);
        let payment_id = AggregateId::new();

        let outcome = h
            .orchestrator
            .execute(payment_id, &h.user_id, Money::from_cents(10_000))
            .await
            .unwrap();

        assert_eq!(outcome.status, SagaStatus::Compensated);
        let account = h.ledger.find_by_user(&h.user_id).await.unwrap();
        assert_eq!(account.balance.cents(), 10_000);
        assert_eq!(account.reserved_balance.cents(), 0);
    }

    #[tokio::test]
    async fn open_circuit_fails_the_gateway_step() {
        let h = harness(50_000).await;
        h.simulator.set_mode(FailureMode::NetworkError);

        // Two failed sagas trip the breaker (threshold 2).
        for _ in 0..2 {
            h.orchestrator
                .execute(AggregateId::new(), &h.user_id, Money::from_cents(1_000))
                .await
                .unwrap();
        }

        h.simulator.set_mode(FailureMode::Approve);
        let before = h.simulator.stats().processed;

        let outcome = h
            .orchestrator
            .execute(AggregateId::new(), &h.user_id, Money::from_cents(1_000))
            .await
            .unwrap();

        // Rejected by the breaker without reaching the gateway, then
        // compensated.
        assert_eq!(outcome.status, SagaStatus::Compensated);
        assert_eq!(h.simulator.stats().processed, before);

        let account = h.ledger.find_by_user(&h.user_id).await.unwrap();
        assert_eq!(account.balance.cents(), 50_000);
    }

    #[tokio::test]
    async fn payment_record_follows_the_saga() {
        let h = harness(10_000).await;
        let payment_id = AggregateId::new();
        let payments: AggregateStore<InMemoryEventStore, PaymentRecord> =
            AggregateStore::new(Arc::clone(h.orchestrator.sagas.store()));

        payments
            .append_events(
                payment_id,
                Some(&h.user_id),
                vec![PaymentEvent::payment_initiated(
                    payment_id,
                    h.user_id.clone(),
                    Money::from_cents(10_000),
                    "key-1",
                )],
            )
            .await
            .unwrap();

        h.orchestrator
            .execute(payment_id, &h.user_id, Money::from_cents(10_000))
            .await
            .unwrap();

        let payment = payments.require(payment_id).await.unwrap();
        assert_eq!(payment.status(), domain::PaymentStatus::Completed);
        assert!(payment.gateway_transaction_id().is_some());
        assert!(payment.reservation_id().is_some());
    }
}
