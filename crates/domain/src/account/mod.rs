//! Account aggregate: the event-sourced audit trail of balance movements
//! and reservations. The ledger crate holds the authoritative working
//! state; this fold must always agree with it.

mod aggregate;
mod events;

pub use aggregate::AccountState;
pub use events::{
    AccountCreatedData, AccountEvent, FundsCreditedData, FundsDebitedData, ReservationConfirmedData,
    ReservationCreatedData, ReservationReleasedData,
};
