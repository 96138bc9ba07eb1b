//! Shared value types used across the payment orchestration workspace.

pub mod types;

pub use types::{AggregateId, Money, UserId};
