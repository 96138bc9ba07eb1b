//! Payment saga orchestration.
//!
//! Executes the payment pipeline as an ordered sequence of forward actions
//! with compensating actions on failure:
//! 1. Reserve funds on the payer's account
//! 2. Charge the payment gateway (through the circuit breaker)
//! 3. Confirm the reservation, debiting the held funds
//!
//! If a step fails, previously completed steps are compensated in reverse
//! order, best-effort, and every outcome is recorded. The saga itself is
//! event-sourced, so its history is inspectable like any other aggregate.
//! [`PaymentService`] composes the saga with the idempotency guard into
//! the `create_payment` entry point.

pub mod error;
pub mod events;
pub mod execution;
pub mod idempotency;
pub mod orchestrator;
pub mod service;
pub mod state;
pub mod steps;

pub use error::SagaError;
pub use events::SagaEvent;
pub use execution::{SagaExecution, SagaStepRecord};
pub use idempotency::{IdempotencyGuard, IdempotencyRecord, IdempotencyStatus, KeyCheck};
pub use orchestrator::{CompensationOutcome, SagaOrchestrator, SagaOutcome};
pub use service::{CreatePayment, PaymentService};
pub use state::{SagaStatus, StepStatus};
pub use steps::{CompensationAction, PAYMENT_SAGA_STEPS, StepAction, StepDefinition};
