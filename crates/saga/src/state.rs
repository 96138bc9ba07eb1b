//! Saga and step state machines.

use serde::{Deserialize, Serialize};

/// The state of a saga execution.
///
/// State transitions:
/// ```text
/// Initiated ──► InProgress ──┬──► Completed
///                            └──► Compensating ──► Compensated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaStatus {
    /// Execution row created, no step started yet.
    #[default]
    Initiated,

    /// Steps are being executed.
    InProgress,

    /// All steps completed successfully (terminal).
    Completed,

    /// A step failed; compensating actions are running.
    Compensating,

    /// Compensation finished after a failure (terminal).
    Compensated,
}

impl SagaStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Compensated)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Initiated => "Initiated",
            SagaStatus::InProgress => "InProgress",
            SagaStatus::Completed => "Completed",
            SagaStatus::Compensating => "Compensating",
            SagaStatus::Compensated => "Compensated",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The state of one step attempt within a saga.
///
/// Terminal step states are append-only history, never rewritten, except
/// that a completed step becomes Compensated when its compensating action
/// runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StepStatus {
    /// Step attempt created but not yet running.
    #[default]
    Pending,

    /// The forward action is executing.
    InProgress,

    /// The forward action succeeded.
    Completed,

    /// The forward action failed (aborts the saga).
    Failed,

    /// The step's compensating action ran after a later failure.
    Compensated,
}

impl StepStatus {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "Pending",
            StepStatus::InProgress => "InProgress",
            StepStatus::Completed => "Completed",
            StepStatus::Failed => "Failed",
            StepStatus::Compensated => "Compensated",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_initiated() {
        assert_eq!(SagaStatus::default(), SagaStatus::Initiated);
    }

    #[test]
    fn terminal_states() {
        assert!(!SagaStatus::Initiated.is_terminal());
        assert!(!SagaStatus::InProgress.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
    }

    #[test]
    fn serialization_roundtrip() {
        let status = SagaStatus::Compensating;
        let json = serde_json::to_string(&status).unwrap();
        let deserialized: SagaStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, deserialized);

        let step = StepStatus::Failed;
        let json = serde_json::to_string(&step).unwrap();
        let deserialized: StepStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(step, deserialized);
    }
}
