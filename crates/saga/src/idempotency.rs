//! Idempotency guard for payment creation.
//!
//! Each client-supplied idempotency key maps to at most one payment. The
//! guard decides atomically, under a write lock, whether a request is new,
//! a replay of a finished payment, a retry of a failed one, or a
//! concurrent duplicate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// How long a key binding stays valid.
pub const KEY_TTL_HOURS: i64 = 24;

/// The lifecycle of an idempotency key binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    /// The bound payment is still in flight.
    Processing,

    /// The bound payment reached a terminal state.
    Completed,

    /// The bound payment attempt failed before reaching a terminal state.
    Failed,
}

/// One key binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// The client-supplied key.
    pub key: String,

    /// The payment bound to this key.
    pub payment_id: AggregateId,

    /// Current binding status.
    pub status: IdempotencyStatus,

    /// When the binding was created.
    pub created_at: DateTime<Utc>,

    /// When the binding expires and the key becomes reusable.
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of [`IdempotencyGuard::check_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCheck {
    /// Key unseen (or expired); a fresh binding was created.
    New,

    /// Key bound to a finished payment; return the cached result.
    Completed(AggregateId),

    /// Key bound to a failed attempt; retry under the same payment ID.
    RetryFailed(AggregateId),

    /// Key bound to a payment still in flight; reject as a conflict.
    InFlight(AggregateId),
}

/// In-memory idempotency key registry.
pub struct IdempotencyGuard {
    records: Arc<RwLock<HashMap<String, IdempotencyRecord>>>,
}

impl Clone for IdempotencyGuard {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IdempotencyGuard {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Classifies a key and, if it is new or expired, binds it to
    /// `payment_id` in Processing state.
    ///
    /// The check and the insert happen under one write lock, so two
    /// concurrent requests with the same key cannot both come back `New`.
    pub async fn check_or_create(&self, key: &str, payment_id: AggregateId) -> KeyCheck {
        let now = Utc::now();
        let mut records = self.records.write().await;

        if let Some(record) = records.get_mut(key) {
            if !record.is_expired(now) {
                match record.status {
                    IdempotencyStatus::Completed => return KeyCheck::Completed(record.payment_id),
                    IdempotencyStatus::Processing => return KeyCheck::InFlight(record.payment_id),
                    IdempotencyStatus::Failed => {
                        // Retry reuses the original payment ID so no
                        // duplicate payment row is created.
                        record.status = IdempotencyStatus::Processing;
                        return KeyCheck::RetryFailed(record.payment_id);
                    }
                }
            }
            tracing::debug!(key, "idempotency key expired, rebinding");
        }

        records.insert(
            key.to_string(),
            IdempotencyRecord {
                key: key.to_string(),
                payment_id,
                status: IdempotencyStatus::Processing,
                created_at: now,
                expires_at: now + Duration::hours(KEY_TTL_HOURS),
            },
        );

        KeyCheck::New
    }

    /// Marks a key's payment as finished.
    pub async fn mark_completed(&self, key: &str) {
        self.set_status(key, IdempotencyStatus::Completed).await;
    }

    /// Marks a key's payment attempt as failed, making the key retryable.
    pub async fn mark_failed(&self, key: &str) {
        self.set_status(key, IdempotencyStatus::Failed).await;
    }

    /// Returns the binding for a key, if any.
    pub async fn find(&self, key: &str) -> Option<IdempotencyRecord> {
        self.records.read().await.get(key).cloned()
    }

    async fn set_status(&self, key: &str, status: IdempotencyStatus) {
        let mut records = self.records.write().await;
        match records.get_mut(key) {
            Some(record) => record.status = status,
            None => tracing::warn!(key, "status update for unknown idempotency key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_use_is_new() {
        let guard = IdempotencyGuard::new();
        let payment_id = AggregateId::new();

        assert_eq!(
            guard.check_or_create("key-1", payment_id).await,
            KeyCheck::New
        );

        let record = guard.find("key-1").await.unwrap();
        assert_eq!(record.payment_id, payment_id);
        assert_eq!(record.status, IdempotencyStatus::Processing);
    }

    #[tokio::test]
    async fn in_flight_key_conflicts() {
        let guard = IdempotencyGuard::new();
        let first = AggregateId::new();

        guard.check_or_create("key-1", first).await;
        assert_eq!(
            guard.check_or_create("key-1", AggregateId::new()).await,
            KeyCheck::InFlight(first)
        );
    }

    #[tokio::test]
    async fn completed_key_returns_cached_payment() {
        let guard = IdempotencyGuard::new();
        let first = AggregateId::new();

        guard.check_or_create("key-1", first).await;
        guard.mark_completed("key-1").await;

        assert_eq!(
            guard.check_or_create("key-1", AggregateId::new()).await,
            KeyCheck::Completed(first)
        );
    }

    #[tokio::test]
    async fn failed_key_retries_under_same_payment() {
        let guard = IdempotencyGuard::new();
        let first = AggregateId::new();

        guard.check_or_create("key-1", first).await;
        guard.mark_failed("key-1").await;

        assert_eq!(
            guard.check_or_create("key-1", AggregateId::new()).await,
            KeyCheck::RetryFailed(first)
        );

        // The retry put the key back in flight.
        assert_eq!(
            guard.check_or_create("key-1", AggregateId::new()).await,
            KeyCheck::InFlight(first)
        );
    }

    #[tokio::test]
    async fn expired_key_rebinds() {
        let guard = IdempotencyGuard::new();
        let first = AggregateId::new();

        guard.check_or_create("key-1", first).await;
        guard.mark_completed("key-1").await;

        {
            let mut records = guard.records.write().await;
            let record = records.get_mut("key-1").unwrap();
            record.expires_at = Utc::now() - Duration::minutes(1);
        }

        let second = AggregateId::new();
        assert_eq!(guard.check_or_create("key-1", second).await, KeyCheck::New);
        assert_eq!(guard.find("key-1").await.unwrap().payment_id, second);
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let guard = IdempotencyGuard::new();

        assert_eq!(
            guard.check_or_create("key-1", AggregateId::new()).await,
            KeyCheck::New
        );
        assert_eq!(
            guard.check_or_create("key-2", AggregateId::new()).await,
            KeyCheck::New
        );
    }
}
