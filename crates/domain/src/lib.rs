//! Domain layer for the payment orchestration system.
//!
//! This crate provides:
//! - The `Aggregate`, `DomainEvent`, and `SnapshotCapable` traits
//! - The `Payment` and `Account` event-sourced aggregates
//! - `AggregateStore`, the load/fold/append repository with optimistic
//!   concurrency retries and transparent snapshotting

pub mod account;
pub mod aggregate;
pub mod error;
pub mod payment;
pub mod repository;

pub use account::{AccountEvent, AccountState};
pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use error::DomainError;
pub use payment::{PaymentEvent, PaymentRecord, PaymentStatus};
pub use repository::AggregateStore;
