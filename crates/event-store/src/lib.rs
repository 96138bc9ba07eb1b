//! Append-only event log with optimistic concurrency, snapshots, and
//! queryable history.
//!
//! Every state change in the payment system is recorded here as an
//! [`EventEnvelope`]. Two implementations are provided: an in-memory store
//! for tests and a PostgreSQL-backed store for durability.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventQuery;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
