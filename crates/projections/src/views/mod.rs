//! Read model views for the query side.

pub mod account_balance;
pub mod payment_status;

pub use account_balance::AccountBalanceView;
pub use payment_status::PaymentStatusView;
