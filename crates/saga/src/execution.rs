//! Event-sourced saga execution aggregate.

use common::AggregateId;
use domain::{Aggregate, SnapshotCapable};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::events::SagaEvent;
use crate::state::{SagaStatus, StepStatus};

/// One step attempt within a saga's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStepRecord {
    /// The step name.
    pub step_name: String,

    /// Current status of this attempt.
    pub status: StepStatus,

    /// Error message, if the step or its compensation failed.
    pub error: Option<String>,
}

/// An event-sourced saga execution.
///
/// Tracks the saga's state, the ordered history of step attempts, and the
/// context accumulated while executing (reservation ID, gateway
/// transaction ID).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaExecution {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    saga_type: String,
    payment_id: Option<AggregateId>,
    status: SagaStatus,
    current_step: Option<String>,
    steps: Vec<SagaStepRecord>,
    reservation_id: Option<AggregateId>,
    gateway_transaction_id: Option<String>,
    failure_reason: Option<String>,
}

impl Aggregate for SagaExecution {
    type Event = SagaEvent;

    fn aggregate_type() -> &'static str {
        "PaymentSaga"
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
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.payment_id = Some(data.payment_id);
                self.saga_type = data.saga_type;
                self.status = SagaStatus::Initiated;
            }
            SagaEvent::StepStarted(data) => {
                self.status = SagaStatus::InProgress;
                self.current_step = Some(data.step_name.clone());
                self.steps.push(SagaStepRecord {
                    step_name: data.step_name,
                    status: StepStatus::InProgress,
                    error: None,
                });
            }
            SagaEvent::StepCompleted(data) => {
                if let Some(step) = self.step_mut(&data.step_name) {
                    step.status = StepStatus::Completed;
                }
                if let Some(reservation_id) = data.reservation_id {
                    self.reservation_id = Some(reservation_id);
                }
                if let Some(transaction_id) = data.gateway_transaction_id {
                    self.gateway_transaction_id = Some(transaction_id);
                }
            }
            SagaEvent::StepFailed(data) => {
                if let Some(step) = self.step_mut(&data.step_name) {
                    step.status = StepStatus::Failed;
                    step.error = Some(data.error.clone());
                }
                self.failure_reason = Some(data.error);
            }
            SagaEvent::CompensationStarted(_) => {
                self.status = SagaStatus::Compensating;
            }
            SagaEvent::CompensationStepCompleted(data) => {
                if let Some(step) = self.step_mut(&data.step_name) {
                    step.status = StepStatus::Compensated;
                }
            }
            SagaEvent::CompensationStepFailed(data) => {
                // Best-effort: the failure is recorded on the step but the
                // compensation loop has already moved on.
                if let Some(step) = self.step_mut(&data.step_name) {
                    step.error = Some(data.error);
                }
            }
            SagaEvent::SagaCompleted(_) => {
                self.status = SagaStatus::Completed;
                self.current_step = None;
            }
            SagaEvent::SagaCompensated(data) => {
                self.status = SagaStatus::Compensated;
                self.failure_reason = Some(data.reason);
                self.current_step = None;
            }
        }
    }
}

impl SnapshotCapable for SagaExecution {}

// Query methods
impl SagaExecution {
    /// Returns the saga status.
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Returns the payment this saga processes.
    pub fn payment_id(&self) -> Option<AggregateId> {
        self.payment_id
    }

    /// Returns the saga type name.
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Returns the step currently executing, if any.
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    /// Returns the ordered history of step attempts.
    pub fn steps(&self) -> &[SagaStepRecord] {
        &self.steps
    }

    /// Returns the names of completed steps, in completion order.
    pub fn completed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.step_name.as_str())
            .collect()
    }

    /// Returns the reservation created by RESERVE_FUNDS, if any.
    pub fn reservation_id(&self) -> Option<AggregateId> {
        self.reservation_id
    }

    /// Returns the gateway transaction from PROCESS_PAYMENT, if any.
    pub fn gateway_transaction_id(&self) -> Option<&str> {
        self.gateway_transaction_id.as_deref()
    }

    /// Returns the failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    fn step_mut(&mut self, step_name: &str) -> Option<&mut SagaStepRecord> {
        self.steps
            .iter_mut()
            .rev()
            .find(|s| s.step_name == step_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{SAGA_TYPE, STEP_PROCESS_PAYMENT, STEP_RESERVE_FUNDS};

    fn started() -> (SagaExecution, AggregateId, AggregateId) {
        let saga_id = AggregateId::new();
        let payment_id = AggregateId::new();
        let mut saga = SagaExecution::default();
        saga.apply(SagaEvent::saga_started(saga_id, payment_id, SAGA_TYPE));
        (saga, saga_id, payment_id)
    }

    #[test]
    fn started_saga_is_initiated() {
        let (saga, saga_id, payment_id) = started();
        assert_eq!(saga.id(), Some(saga_id));
        assert_eq!(saga.payment_id(), Some(payment_id));
        assert_eq!(saga.status(), SagaStatus::Initiated);
        assert_eq!(saga.saga_type(), SAGA_TYPE);
    }

    #[test]
    fn step_lifecycle_folds_into_history() {
        let (mut saga, _, _) = started();
        let reservation = AggregateId::new();

        saga.apply(SagaEvent::step_started(STEP_RESERVE_FUNDS));
        assert_eq!(saga.status(), SagaStatus::InProgress);
        assert_eq!(saga.current_step(), Some(STEP_RESERVE_FUNDS));

        saga.apply(SagaEvent::step_completed(
            STEP_RESERVE_FUNDS,
            Some(reservation),
            None,
        ));
        assert_eq!(saga.completed_steps(), vec![STEP_RESERVE_FUNDS]);
        assert_eq!(saga.reservation_id(), Some(reservation));

        saga.apply(SagaEvent::saga_completed());
        assert_eq!(saga.status(), SagaStatus::Completed);
        assert!(saga.current_step().is_none());
    }

    #[test]
    fn failure_and_compensation_fold() {
        let (mut saga, _, _) = started();
        let reservation = AggregateId::new();

        saga.apply(SagaEvent::step_started(STEP_RESERVE_FUNDS));
        saga.apply(SagaEvent::step_completed(
            STEP_RESERVE_FUNDS,
            Some(reservation),
            None,
        ));
        saga.apply(SagaEvent::step_started(STEP_PROCESS_PAYMENT));
        saga.apply(SagaEvent::step_failed(STEP_PROCESS_PAYMENT, "declined"));
        saga.apply(SagaEvent::compensation_started(STEP_PROCESS_PAYMENT));
        assert_eq!(saga.status(), SagaStatus::Compensating);

        saga.apply(SagaEvent::compensation_step_completed(STEP_RESERVE_FUNDS));
        saga.apply(SagaEvent::saga_compensated("declined"));

        assert_eq!(saga.status(), SagaStatus::Compensated);
        assert_eq!(saga.failure_reason(), Some("declined"));

        let steps = saga.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].status, StepStatus::Compensated);
        assert_eq!(steps[1].status, StepStatus::Failed);
        assert_eq!(steps[1].error.as_deref(), Some("declined"));
    }
}
