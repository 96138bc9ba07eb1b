//! Aggregate repository: load-from-snapshot, fold, append-with-retry.

use std::marker::PhantomData;
use std::sync::Arc;

use common::{AggregateId, UserId};
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, Version};

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// How many times an append is retried after losing an optimistic
/// concurrency race before the conflict is surfaced to the caller.
const MAX_APPEND_ATTEMPTS: usize = 3;

/// Repository for a single aggregate type over an event store.
///
/// Responsibilities:
/// 1. Reconstruct aggregates from the latest snapshot plus newer events
/// 2. Stamp and append new events with optimistic concurrency, retrying
///    when another writer wins the race
/// 3. Save a snapshot whenever the version crosses the snapshot interval
pub struct AggregateStore<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: Arc<S>,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for AggregateStore<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _phantom: PhantomData,
        }
    }
}

impl<S, A> AggregateStore<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Creates a new aggregate store over the given event store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Reconstructs an aggregate from the event store.
    ///
    /// Folds the latest snapshot (if one exists and matches this aggregate
    /// type) plus all newer events. Returns a default instance if the
    /// aggregate doesn't exist. Deleting snapshots never changes the
    /// result, only the cost.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let (mut aggregate, events) = match snapshot {
            Some(snapshot) if snapshot.is_for(A::aggregate_type()) => {
                let version = snapshot.version;
                let mut restored: A = serde_json::from_value(snapshot.state)?;
                restored.set_version(version);
                (restored, events)
            }
            // A snapshot of another aggregate type is discarded, which
            // means the post-snapshot event slice is too short; replay
            // the full history instead.
            Some(_) => {
                let all_events = self.store.get_events_for_aggregate(aggregate_id).await?;
                (A::default(), all_events)
            }
            None => (A::default(), events),
        };

        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Loads an aggregate or fails with `AggregateNotFound`.
    pub async fn require(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        self.load_existing(aggregate_id)
            .await?
            .ok_or(DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: aggregate_id.to_string(),
            })
    }

    /// Appends events to an aggregate's history.
    ///
    /// Reads the current version, stamps the events `max+1..`, and appends
    /// with that expected version. If another writer got there first, the
    /// whole read-stamp-append cycle is retried up to `MAX_APPEND_ATTEMPTS`
    /// times before the conflict propagates. After a successful append a
    /// snapshot is saved if the version crossed the snapshot interval.
    ///
    /// Returns the aggregate with the new events applied and its new version.
    pub async fn append_events(
        &self,
        aggregate_id: AggregateId,
        user_id: Option<&UserId>,
        events: Vec<A::Event>,
    ) -> Result<(A, Version), DomainError> {
        if events.is_empty() {
            let aggregate = self.load(aggregate_id).await?;
            let version = aggregate.version();
            return Ok((aggregate, version));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut aggregate = self.load(aggregate_id).await?;
            let current_version = aggregate.version();

            let envelopes =
                self.build_envelopes(aggregate_id, current_version, user_id, &events)?;

            let options = if current_version == Version::initial() {
                AppendOptions::expect_new()
            } else {
                AppendOptions::expect_version(current_version)
            };

            match self.store.append(envelopes, options).await {
                Ok(new_version) => {
                    for event in &events {
                        aggregate.apply(event.clone());
                    }
                    aggregate.set_version(new_version);

                    if aggregate.should_snapshot() {
                        self.save_snapshot(aggregate_id, new_version, &aggregate)
                            .await?;
                    }

                    return Ok((aggregate, new_version));
                }
                Err(err @ event_store::EventStoreError::ConcurrencyConflict { .. })
                    if attempt < MAX_APPEND_ATTEMPTS =>
                {
                    tracing::debug!(
                        aggregate_id = %aggregate_id,
                        attempt,
                        "append lost concurrency race, retrying: {err}"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Builds stamped event envelopes for a pending append.
    pub fn build_envelopes(
        &self,
        aggregate_id: AggregateId,
        current_version: Version,
        user_id: Option<&UserId>,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let mut builder = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?;
            if let Some(user) = user_id {
                builder = builder.user_id(user.clone());
            }
            envelopes.push(builder.build());
        }

        Ok(envelopes)
    }

    async fn save_snapshot(
        &self,
        aggregate_id: AggregateId,
        version: Version,
        aggregate: &A,
    ) -> Result<(), DomainError> {
        let snapshot =
            Snapshot::from_state(aggregate_id, A::aggregate_type(), version, aggregate)?;
        self.store.save_snapshot(snapshot).await?;
        tracing::debug!(
            aggregate_id = %aggregate_id,
            version = %version,
            "snapshot saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{PaymentEvent, PaymentRecord, PaymentStatus};
    use common::Money;
    use event_store::InMemoryEventStore;

    fn payment_store(
        store: &Arc<InMemoryEventStore>,
    ) -> AggregateStore<InMemoryEventStore, PaymentRecord> {
        AggregateStore::new(Arc::clone(store))
    }

    fn initiated(id: AggregateId) -> PaymentEvent {
        PaymentEvent::payment_initiated(
            id,
            UserId::new("user-1"),
            Money::from_cents(10_000),
            "key-1",
        )
    }

    #[tokio::test]
    async fn append_and_reload() {
        let store = Arc::new(InMemoryEventStore::new());
        let payments = payment_store(&store);
        let id = AggregateId::new();

        let (payment, version) = payments
            .append_events(id, Some(&UserId::new("user-1")), vec![initiated(id)])
            .await
            .unwrap();

        assert_eq!(version, Version::first());
        assert_eq!(payment.status(), PaymentStatus::Pending);

        let reloaded = payments.load(id).await.unwrap();
        assert_eq!(reloaded.id(), Some(id));
        assert_eq!(reloaded.version(), Version::first());
    }

    #[tokio::test]
    async fn events_carry_user_attribution() {
        let store = Arc::new(InMemoryEventStore::new());
        let payments = payment_store(&store);
        let id = AggregateId::new();

        payments
            .append_events(id, Some(&UserId::new("user-1")), vec![initiated(id)])
            .await
            .unwrap();

        let events = store.get_events_for_aggregate(id).await.unwrap();
        assert_eq!(events[0].user_id, Some(UserId::new("user-1")));
    }

    #[tokio::test]
    async fn load_existing_none_for_unknown() {
        let store = Arc::new(InMemoryEventStore::new());
        let payments = payment_store(&store);

        let result = payments.load_existing(AggregateId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn require_fails_for_unknown() {
        let store = Arc::new(InMemoryEventStore::new());
        let payments = payment_store(&store);

        let result = payments.require(AggregateId::new()).await;
        assert!(matches!(
            result,
            Err(DomainError::AggregateNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn empty_append_is_a_noop() {
        let store = Arc::new(InMemoryEventStore::new());
        let payments = payment_store(&store);
        let id = AggregateId::new();

        let (_, version) = payments.append_events(id, None, vec![]).await.unwrap();
        assert_eq!(version, Version::initial());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn snapshot_created_at_interval_and_transparent() {
        let store = Arc::new(InMemoryEventStore::new());
        let payments = payment_store(&store);
        let id = AggregateId::new();

        payments
            .append_events(id, None, vec![initiated(id)])
            .await
            .unwrap();

        // 49 more events lands exactly on the 50-event boundary.
        for _ in 0..49 {
            payments
                .append_events(
                    id,
                    None,
                    vec![PaymentEvent::payment_processing(None)],
                )
                .await
                .unwrap();
        }

        let snapshot = store.get_snapshot(id).await.unwrap();
        assert_eq!(snapshot.unwrap().version, Version::new(50));

        // Reconstruction from the snapshot agrees with a full replay.
        let from_snapshot = payments.load(id).await.unwrap();
        store.save_snapshot(
            Snapshot::new(id, "SomethingElse", Version::new(1), serde_json::json!({})),
        )
        .await
        .unwrap();
        let ignoring_foreign_snapshot = payments.load(id).await.unwrap();

        assert_eq!(from_snapshot.status(), ignoring_foreign_snapshot.status());
        assert_eq!(from_snapshot.version(), Version::new(50));
        assert_eq!(ignoring_foreign_snapshot.version(), Version::new(50));
    }

    #[tokio::test]
    async fn versions_are_gap_free() {
        let store = Arc::new(InMemoryEventStore::new());
        let payments = payment_store(&store);
        let id = AggregateId::new();

        payments
            .append_events(id, None, vec![initiated(id)])
            .await
            .unwrap();
        payments
            .append_events(
                id,
                None,
                vec![
                    PaymentEvent::funds_reserved(AggregateId::new(), Money::from_cents(10_000)),
                    PaymentEvent::payment_processing(None),
                ],
            )
            .await
            .unwrap();

        let events = store.get_events_for_aggregate(id).await.unwrap();
        let versions: Vec<i64> = events.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }
}
