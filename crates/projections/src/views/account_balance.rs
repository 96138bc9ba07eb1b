//! Account balance read model — one row per account.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, Money, UserId};
use domain::AccountEvent;
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Denormalized view of a single account's balances.
#[derive(Debug, Clone, Serialize)]
pub struct AccountBalanceSummary {
    pub account_id: AggregateId,
    pub user_id: Option<UserId>,
    pub balance: Money,
    pub reserved_balance: Money,
    /// Running total of all credits ever applied.
    pub total_credited: Money,
    /// Running total of all debits ever applied.
    pub total_debited: Money,
    pub updated_at: DateTime<Utc>,
}

impl AccountBalanceSummary {
    /// Returns the balance not held by reservations.
    pub fn available_balance(&self) -> Money {
        self.balance - self.reserved_balance
    }
}

/// Read model view of account balances, keyed by account ID.
#[derive(Clone)]
pub struct AccountBalanceView {
    accounts: Arc<RwLock<HashMap<AggregateId, AccountBalanceSummary>>>,
    position: Arc<RwLock<ProjectionPosition>>,
    skipped: Arc<RwLock<u64>>,
}

impl AccountBalanceView {
    /// Creates a new empty view.
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            skipped: Arc::new(RwLock::new(0)),
        }
    }

    /// Gets the summary for one account.
    pub async fn get_account(&self, account_id: AggregateId) -> Option<AccountBalanceSummary> {
        self.accounts.read().await.get(&account_id).cloned()
    }

    /// Gets all account summaries.
    pub async fn get_all_accounts(&self) -> Vec<AccountBalanceSummary> {
        self.accounts.read().await.values().cloned().collect()
    }

    /// Gets the summary for a user's account.
    pub async fn get_account_by_user(&self, user_id: &UserId) -> Option<AccountBalanceSummary> {
        self.accounts
            .read()
            .await
            .values()
            .find(|a| a.user_id.as_ref() == Some(user_id))
            .cloned()
    }

    /// Events the view declined to interpret.
    pub async fn skipped_count(&self) -> u64 {
        *self.skipped.read().await
    }

    async fn advance(&self) {
        let mut pos = self.position.write().await;
        *pos = pos.advance();
    }
}

impl Default for AccountBalanceView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for AccountBalanceView {
    fn name(&self) -> &'static str {
        "AccountBalanceView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != "Account" {
            self.advance().await;
            return Ok(());
        }

        let account_event: AccountEvent = match serde_json::from_value(event.payload.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                *self.skipped.write().await += 1;
                tracing::warn!(
                    event_type = %event.event_type,
                    "skipping unrecognized account event: {err}"
                );
                self.advance().await;
                return Ok(());
            }
        };
        let account_id = event.aggregate_id;

        let mut accounts = self.accounts.write().await;

        match account_event {
            AccountEvent::AccountCreated(data) => {
                accounts.insert(
                    account_id,
                    AccountBalanceSummary {
                        account_id: data.account_id,
                        user_id: Some(data.user_id),
                        balance: Money::zero(),
                        reserved_balance: Money::zero(),
                        total_credited: Money::zero(),
                        total_debited: Money::zero(),
                        updated_at: data.created_at,
                    },
                );
            }
            AccountEvent::FundsCredited(data) => {
                if let Some(account) = accounts.get_mut(&account_id) {
                    account.balance += data.amount;
                    account.total_credited += data.amount;
                    account.updated_at = data.credited_at;
                }
            }
            AccountEvent::FundsDebited(data) => {
                if let Some(account) = accounts.get_mut(&account_id) {
                    account.balance -= data.amount;
                    account.total_debited += data.amount;
                    account.updated_at = data.debited_at;
                }
            }
            AccountEvent::ReservationCreated(data) => {
                if let Some(account) = accounts.get_mut(&account_id) {
                    account.reserved_balance += data.amount;
                    account.updated_at = data.reserved_at;
                }
            }
            AccountEvent::ReservationConfirmed(data) => {
                if let Some(account) = accounts.get_mut(&account_id) {
                    account.reserved_balance -= data.amount;
                    account.updated_at = data.confirmed_at;
                }
            }
            AccountEvent::ReservationReleased(data) => {
                if let Some(account) = accounts.get_mut(&account_id) {
                    account.reserved_balance -= data.amount;
                    account.updated_at = data.released_at;
                }
            }
        }

        drop(accounts);
        self.advance().await;
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.accounts.write().await.clear();
        *self.skipped.write().await = 0;
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for AccountBalanceView {
    fn name(&self) -> &'static str {
        "AccountBalanceView"
    }

    fn count(&self) -> usize {
        self.accounts.try_read().map(|a| a.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DomainEvent;
    use event_store::Version;

    fn envelope(account_id: AggregateId, version: i64, event: &AccountEvent) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(account_id)
            .aggregate_type("Account")
            .event_type(event.event_type())
            .version(Version::new(version))
            .payload(event)
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn tracks_balances_through_a_payment_cycle() {
        let view = AccountBalanceView::new();
        let account_id = AggregateId::new();
        let payment_id = AggregateId::new();
        let reservation_id = AggregateId::new();

        view.handle(&envelope(
            account_id,
            1,
            &AccountEvent::account_created(account_id, UserId::new("user-1")),
        ))
        .await
        .unwrap();
        view.handle(&envelope(
            account_id,
            2,
            &AccountEvent::funds_credited(Money::from_cents(10_000)),
        ))
        .await
        .unwrap();
        view.handle(&envelope(
            account_id,
            3,
            &AccountEvent::reservation_created(
                reservation_id,
                payment_id,
                Money::from_cents(4_000),
                Utc::now(),
            ),
        ))
        .await
        .unwrap();

        let account = view.get_account(account_id).await.unwrap();
        assert_eq!(account.balance.cents(), 10_000);
        assert_eq!(account.reserved_balance.cents(), 4_000);
        assert_eq!(account.available_balance().cents(), 6_000);

        view.handle(&envelope(
            account_id,
            4,
            &AccountEvent::funds_debited(Money::from_cents(4_000), Some(payment_id)),
        ))
        .await
        .unwrap();
        view.handle(&envelope(
            account_id,
            5,
            &AccountEvent::reservation_confirmed(
                reservation_id,
                payment_id,
                Money::from_cents(4_000),
            ),
        ))
        .await
        .unwrap();

        let account = view.get_account(account_id).await.unwrap();
        assert_eq!(account.balance.cents(), 6_000);
        assert_eq!(account.reserved_balance.cents(), 0);
        assert_eq!(account.total_credited.cents(), 10_000);
        assert_eq!(account.total_debited.cents(), 4_000);
    }

    #[tokio::test]
    async fn release_restores_available_without_debit() {
        let view = AccountBalanceView::new();
        let account_id = AggregateId::new();
        let payment_id = AggregateId::new();
        let reservation_id = AggregateId::new();

        view.handle(&envelope(
            account_id,
            1,
            &AccountEvent::account_created(account_id, UserId::new("user-1")),
        ))
        .await
        .unwrap();
        view.handle(&envelope(
            account_id,
            2,
            &AccountEvent::funds_credited(Money::from_cents(5_000)),
        ))
        .await
        .unwrap();
        view.handle(&envelope(
            account_id,
            3,
            &AccountEvent::reservation_created(
                reservation_id,
                payment_id,
                Money::from_cents(5_000),
                Utc::now(),
            ),
        ))
        .await
        .unwrap();
        view.handle(&envelope(
            account_id,
            4,
            &AccountEvent::reservation_released(
                reservation_id,
                payment_id,
                Money::from_cents(5_000),
            ),
        ))
        .await
        .unwrap();

        let account = view.get_account(account_id).await.unwrap();
        assert_eq!(account.balance.cents(), 5_000);
        assert_eq!(account.reserved_balance.cents(), 0);
        assert_eq!(account.total_debited.cents(), 0);
    }

    #[tokio::test]
    async fn lookup_by_user() {
        let view = AccountBalanceView::new();
        let account_id = AggregateId::new();

        view.handle(&envelope(
            account_id,
            1,
            &AccountEvent::account_created(account_id, UserId::new("user-7")),
        ))
        .await
        .unwrap();

        let account = view.get_account_by_user(&UserId::new("user-7")).await;
        assert!(account.is_some());
        assert!(view.get_account_by_user(&UserId::new("user-8")).await.is_none());
    }

    #[tokio::test]
    async fn ignores_payment_events() {
        let view = AccountBalanceView::new();

        let event = EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Payment")
            .event_type("PaymentInitiated")
            .version(Version::new(1))
            .payload_raw(serde_json::json!({"type": "PaymentInitiated", "data": {}}))
            .build();

        view.handle(&event).await.unwrap();
        assert_eq!(view.get_all_accounts().await.len(), 0);
        assert_eq!(view.position().await.events_processed, 1);
    }

    #[tokio::test]
    async fn unknown_account_events_are_skipped() {
        let view = AccountBalanceView::new();

        let event = EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Account")
            .event_type("AccountFrozen")
            .version(Version::new(1))
            .payload_raw(serde_json::json!({"type": "AccountFrozen", "data": {}}))
            .build();

        view.handle(&event).await.unwrap();
        assert_eq!(view.skipped_count().await, 1);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let view = AccountBalanceView::new();
        let account_id = AggregateId::new();

        view.handle(&envelope(
            account_id,
            1,
            &AccountEvent::account_created(account_id, UserId::new("user-1")),
        ))
        .await
        .unwrap();
        assert_eq!(view.get_all_accounts().await.len(), 1);

        view.reset().await.unwrap();
        assert_eq!(view.get_all_accounts().await.len(), 0);
        assert_eq!(view.position().await.events_processed, 0);
    }
}
