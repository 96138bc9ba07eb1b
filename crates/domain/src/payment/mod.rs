//! Payment aggregate: the event-sourced record of a single payment's
//! lifecycle, driven exclusively by saga transitions.

mod aggregate;
mod events;
mod state;

pub use aggregate::PaymentRecord;
pub use events::{
    FundsReservedData, PaymentCompensatedData, PaymentCompletedData, PaymentEvent,
    PaymentFailedData, PaymentInitiatedData, PaymentProcessingData,
};
pub use state::PaymentStatus;
