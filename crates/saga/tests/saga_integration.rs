//! Integration tests for payment saga orchestration.

use std::sync::Arc;
use std::time::Duration;

use common::{AggregateId, Money, UserId};
use domain::{Aggregate, PaymentStatus};
use event_store::InMemoryEventStore;
use gateway::{CircuitBreakerConfig, FailureMode, GatewaySimulator, PaymentGateway};
use ledger::AccountLedger;
use saga::{CreatePayment, PaymentService, SagaError, SagaStatus, StepStatus};

struct TestHarness {
    service: PaymentService<InMemoryEventStore, GatewaySimulator>,
    store: Arc<InMemoryEventStore>,
    ledger: AccountLedger<InMemoryEventStore>,
    simulator: Arc<GatewaySimulator>,
    user_id: UserId,
}

impl TestHarness {
    async fn new(initial_balance_cents: i64) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let ledger = AccountLedger::new(Arc::clone(&store));

        let user_id = UserId::new("payer-1");
        ledger
            .create_account(user_id.clone(), Money::from_cents(initial_balance_cents))
            .await
            .unwrap();

        let simulator = Arc::new(GatewaySimulator::new());
        simulator.set_latency(Duration::from_millis(0));
        let gateway = PaymentGateway::with_config(
            Arc::clone(&simulator),
            CircuitBreakerConfig {
                failure_threshold: 3,
                ..CircuitBreakerConfig::default()
            },
        );

        let service = PaymentService::new(Arc::clone(&store), ledger.clone(), gateway);

        Self {
            service,
            store,
            ledger,
            simulator,
            user_id,
        }
    }

    fn payment(&self, amount_cents: i64, key: &str) -> CreatePayment {
        CreatePayment {
            user_id: self.user_id.clone(),
            amount: Money::from_cents(amount_cents),
            idempotency_key: key.to_string(),
        }
    }

    async fn balance(&self) -> (i64, i64) {
        let account = self.ledger.find_by_user(&self.user_id).await.unwrap();
        (account.balance.cents(), account.reserved_balance.cents())
    }
}

#[tokio::test]
async fn happy_path_debits_the_full_amount() {
    let h = TestHarness::new(10_000).await;

    let payment = h
        .service
        .create_payment(h.payment(10_000, "order-1"))
        .await
        .unwrap();

    assert_eq!(payment.status(), PaymentStatus::Completed);
    assert!(payment.completed_at().is_some());
    assert!(payment.gateway_transaction_id().is_some());
    assert!(payment.reservation_id().is_some());

    // Fully debited, nothing left on hold.
    assert_eq!(h.balance().await, (0, 0));

    let saga = h
        .service
        .find_saga_execution(payment.id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saga.status(), SagaStatus::Completed);
    assert_eq!(
        saga.completed_steps(),
        vec!["RESERVE_FUNDS", "PROCESS_PAYMENT", "CONFIRM_PAYMENT"]
    );
    assert!(saga.reservation_id().is_some());
    assert!(saga.gateway_transaction_id().is_some());
}

#[tokio::test]
async fn declined_payment_is_compensated_and_funds_restored() {
    let h = TestHarness::new(10_000).await;
    h.simulator.set_mode(FailureMode::Decline);

    let payment = h
        .service
        .create_payment(h.payment(10_000, "order-1"))
        .await
        .unwrap();

    assert_eq!(payment.status(), PaymentStatus::Compensated);
    assert!(payment.failure_reason().is_some());

    // The reservation was released, so the balance is untouched.
    assert_eq!(h.balance().await, (10_000, 0));

    let saga = h
        .service
        .find_saga_execution(payment.id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saga.status(), SagaStatus::Compensated);

    let steps = saga.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step_name, "RESERVE_FUNDS");
    assert_eq!(steps[0].status, StepStatus::Compensated);
    assert_eq!(steps[1].step_name, "PROCESS_PAYMENT");
    assert_eq!(steps[1].status, StepStatus::Failed);
    assert!(steps[1].error.is_some());
}

#[tokio::test]
async fn insufficient_funds_fails_before_any_side_effect() {
    let h = TestHarness::new(500).await;

    let payment = h
        .service
        .create_payment(h.payment(10_000, "order-1"))
        .await
        .unwrap();

    assert_eq!(payment.status(), PaymentStatus::Compensated);
    assert!(
        payment
            .failure_reason()
            .unwrap()
            .contains("Insufficient funds")
    );

    // Nothing was reserved and the gateway was never called.
    assert_eq!(h.balance().await, (500, 0));
    assert_eq!(h.simulator.stats().processed, 0);

    let saga = h
        .service
        .find_saga_execution(payment.id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(saga.completed_steps().is_empty());
    assert_eq!(saga.steps()[0].status, StepStatus::Failed);
}

#[tokio::test]
async fn transport_failures_compensate_and_trip_the_breaker() {
    let h = TestHarness::new(50_000).await;
    h.simulator.set_mode(FailureMode::NetworkError);

    // Three failed charges open the circuit (threshold 3).
    for i in 0..3 {
        let payment = h
            .service
            .create_payment(h.payment(1_000, &format!("order-{i}")))
            .await
            .unwrap();
        assert_eq!(payment.status(), PaymentStatus::Compensated);
    }

    // The gateway recovers, but the open breaker rejects the next charge
    // without reaching it.
    h.simulator.set_mode(FailureMode::Approve);
    let before = h.simulator.stats().processed;

    let payment = h
        .service
        .create_payment(h.payment(1_000, "order-99"))
        .await
        .unwrap();

    assert_eq!(payment.status(), PaymentStatus::Compensated);
    assert!(payment.failure_reason().unwrap().contains("Circuit"));
    assert_eq!(h.simulator.stats().processed, before);

    // Every attempt was rolled back in full.
    assert_eq!(h.balance().await, (50_000, 0));
}

#[tokio::test]
async fn replayed_key_returns_the_recorded_payment() {
    let h = TestHarness::new(20_000).await;

    let first = h
        .service
        .create_payment(h.payment(10_000, "order-1"))
        .await
        .unwrap();
    let second = h
        .service
        .create_payment(h.payment(10_000, "order-1"))
        .await
        .unwrap();

    assert_eq!(second.id(), first.id());
    assert_eq!(h.simulator.stats().processed, 1);
    assert_eq!(h.balance().await, (10_000, 0));
}

#[tokio::test]
async fn concurrent_duplicates_charge_once() {
    let h = TestHarness::new(10_000).await;

    let a = h.service.clone();
    let b = h.service.clone();
    let req_a = h.payment(10_000, "order-1");
    let req_b = h.payment(10_000, "order-1");

    let (ra, rb) = tokio::join!(a.create_payment(req_a), b.create_payment(req_b));

    let completed = [&ra, &rb]
        .iter()
        .filter(|r| {
            r.as_ref()
                .map(|p| p.status() == PaymentStatus::Completed)
                .unwrap_or(false)
        })
        .count();
    let conflicts = [&ra, &rb]
        .iter()
        .filter(|r| matches!(r, Err(SagaError::Conflict(_))))
        .count();

    assert_eq!(completed + conflicts, 2);
    assert!(completed >= 1);
    assert_eq!(h.simulator.stats().processed, 1);
    assert_eq!(h.balance().await, (0, 0));
}

#[tokio::test]
async fn saga_execution_reloads_identically_from_the_store() {
    let h = TestHarness::new(10_000).await;

    let payment = h
        .service
        .create_payment(h.payment(10_000, "order-1"))
        .await
        .unwrap();
    let payment_id = payment.id().unwrap();

    let saga1 = h
        .service
        .find_saga_execution(payment_id)
        .await
        .unwrap()
        .unwrap();
    let saga2 = h
        .service
        .find_saga_execution(payment_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(saga1.id(), saga2.id());
    assert_eq!(saga1.status(), saga2.status());
    assert_eq!(saga1.payment_id(), saga2.payment_id());
    assert_eq!(saga1.completed_steps(), saga2.completed_steps());
    assert_eq!(saga1.reservation_id(), saga2.reservation_id());
    assert_eq!(saga1.gateway_transaction_id(), saga2.gateway_transaction_id());
}

#[tokio::test]
async fn saga_lookup_survives_a_fresh_service_over_the_store() {
    let h = TestHarness::new(10_000).await;

    let payment = h
        .service
        .create_payment(h.payment(2_500, "order-1"))
        .await
        .unwrap();
    let payment_id = payment.id().unwrap();

    // A restarted process starts with an empty payment-to-saga mapping;
    // the lookup must recover it from the durable log.
    let gateway = PaymentGateway::new(Arc::new(GatewaySimulator::new()));
    let fresh = PaymentService::new(Arc::clone(&h.store), h.ledger.clone(), gateway);

    let saga = fresh
        .find_saga_execution(payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saga.payment_id(), Some(payment_id));
    assert_eq!(saga.status(), SagaStatus::Completed);
    assert_eq!(
        saga.completed_steps(),
        vec!["RESERVE_FUNDS", "PROCESS_PAYMENT", "CONFIRM_PAYMENT"]
    );

    // Unknown payments still come back empty after a log scan.
    assert!(
        fresh
            .find_saga_execution(AggregateId::new())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn one_payment_fails_another_succeeds() {
    let h = TestHarness::new(20_000).await;

    let ok = h
        .service
        .create_payment(h.payment(10_000, "order-1"))
        .await
        .unwrap();

    h.simulator.set_mode(FailureMode::Decline);
    let declined = h
        .service
        .create_payment(h.payment(10_000, "order-2"))
        .await
        .unwrap();

    assert_eq!(ok.status(), PaymentStatus::Completed);
    assert_eq!(declined.status(), PaymentStatus::Compensated);
    assert_ne!(ok.id(), declined.id());

    // Only the successful charge was debited.
    assert_eq!(h.balance().await, (10_000, 0));

    let payments = h.service.list_payments().await.unwrap();
    assert_eq!(payments.len(), 2);
}

#[tokio::test]
async fn unknown_payment_has_no_saga() {
    let h = TestHarness::new(1_000).await;

    assert!(h.service.find_payment(AggregateId::new()).await.unwrap().is_none());
    assert!(
        h.service
            .find_saga_execution(AggregateId::new())
            .await
            .unwrap()
            .is_none()
    );
}
