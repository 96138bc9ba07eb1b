//! The payment saga step pipeline.
//!
//! Steps are a fixed ordered table of tagged actions dispatched by `match`
//! in the orchestrator. Adding a step means adding a variant and a table
//! row, not a new type.

use serde::{Deserialize, Serialize};

/// Step names as recorded in saga history.
pub const STEP_RESERVE_FUNDS: &str = "RESERVE_FUNDS";
pub const STEP_PROCESS_PAYMENT: &str = "PROCESS_PAYMENT";
pub const STEP_CONFIRM_PAYMENT: &str = "CONFIRM_PAYMENT";

/// The saga type name recorded on executions.
pub const SAGA_TYPE: &str = "PaymentProcessing";

/// Forward action of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    /// Reserve funds on the payer's account.
    ReserveFunds,

    /// Charge the gateway through the circuit breaker.
    ProcessPayment,

    /// Confirm the reservation, debiting the held funds.
    ConfirmPayment,
}

/// Compensating action of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompensationAction {
    /// Release the fund reservation.
    ReleaseReservation,

    /// Refund the gateway transaction (best-effort).
    RefundTransaction,
}

/// One row of the step pipeline.
#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    /// Step name as recorded in history.
    pub name: &'static str,

    /// Forward action.
    pub action: StepAction,

    /// Compensating action, if the step has anything to undo.
    pub compensation: Option<CompensationAction>,
}

/// The payment pipeline, in execution order.
pub const PAYMENT_SAGA_STEPS: &[StepDefinition] = &[
    StepDefinition {
        name: STEP_RESERVE_FUNDS,
        action: StepAction::ReserveFunds,
        compensation: Some(CompensationAction::ReleaseReservation),
    },
    StepDefinition {
        name: STEP_PROCESS_PAYMENT,
        action: StepAction::ProcessPayment,
        compensation: Some(CompensationAction::RefundTransaction),
    },
    StepDefinition {
        name: STEP_CONFIRM_PAYMENT,
        action: StepAction::ConfirmPayment,
        // Terminal step, nothing to undo.
        compensation: None,
    },
];

/// Looks up a step definition by name.
pub fn step_by_name(name: &str) -> Option<&'static StepDefinition> {
    PAYMENT_SAGA_STEPS.iter().find(|step| step.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_order() {
        let names: Vec<&str> = PAYMENT_SAGA_STEPS.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![STEP_RESERVE_FUNDS, STEP_PROCESS_PAYMENT, STEP_CONFIRM_PAYMENT]
        );
    }

    #[test]
    fn confirm_has_no_compensation() {
        let confirm = step_by_name(STEP_CONFIRM_PAYMENT).unwrap();
        assert!(confirm.compensation.is_none());

        let reserve = step_by_name(STEP_RESERVE_FUNDS).unwrap();
        assert_eq!(
            reserve.compensation,
            Some(CompensationAction::ReleaseReservation)
        );
    }

    #[test]
    fn unknown_step_name() {
        assert!(step_by_name("SHIP_GOODS").is_none());
    }
}
