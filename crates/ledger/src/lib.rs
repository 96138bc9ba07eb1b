//! Account ledger: the sole owner of account balances and fund
//! reservations.
//!
//! All mutations run under a single writer lock over the ledger state,
//! which makes each read-check-write atomic against concurrent
//! reservations on the same account. Every mutation also appends the
//! matching account domain events, so the event-sourced [`domain::AccountState`]
//! fold always agrees with the ledger's working state.

pub mod error;
pub mod ledger;
pub mod model;

pub use error::{LedgerError, Result};
pub use ledger::AccountLedger;
pub use model::{Account, FundReservation, ReservationStatus};
