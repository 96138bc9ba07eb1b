//! Account aggregate implementation.

use common::{AggregateId, Money, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::AccountEvent;

/// Event-sourced fold of an account's balance history.
///
/// Invariant (holds after every applied event, matching the ledger):
/// `balance >= reserved_balance >= 0`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    /// Unique account identifier.
    id: Option<AggregateId>,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    /// The owning user.
    user_id: Option<UserId>,

    /// Total balance, including reserved funds.
    balance: Money,

    /// Portion of the balance held by active reservations.
    reserved_balance: Money,
}

impl Aggregate for AccountState {
    type Event = AccountEvent;

    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            AccountEvent::AccountCreated(data) => {
                self.id = Some(data.account_id);
                self.user_id = Some(data.user_id);
            }
            AccountEvent::FundsCredited(data) => {
                self.balance += data.amount;
            }
            AccountEvent::FundsDebited(data) => {
                self.balance -= data.amount;
            }
            AccountEvent::ReservationCreated(data) => {
                self.reserved_balance += data.amount;
            }
            AccountEvent::ReservationConfirmed(data) => {
                self.reserved_balance -= data.amount;
            }
            AccountEvent::ReservationReleased(data) => {
                self.reserved_balance -= data.amount;
            }
        }
    }
}

impl SnapshotCapable for AccountState {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl AccountState {
    /// Returns the owning user.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Returns the total balance.
    pub fn balance(&self) -> Money {
        self.balance
    }

    /// Returns the reserved portion of the balance.
    pub fn reserved_balance(&self) -> Money {
        self.reserved_balance
    }

    /// Returns the balance not held by reservations.
    pub fn available_balance(&self) -> Money {
        self.balance - self.reserved_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn created(account_id: AggregateId) -> AccountEvent {
        AccountEvent::account_created(account_id, UserId::new("user-1"))
    }

    #[test]
    fn reserve_confirm_cycle() {
        let account_id = AggregateId::new();
        let payment = AggregateId::new();
        let reservation = AggregateId::new();
        let mut account = AccountState::default();

        account.apply(created(account_id));
        account.apply(AccountEvent::funds_credited(Money::from_cents(10_000)));
        assert_eq!(account.balance().cents(), 10_000);
        assert_eq!(account.available_balance().cents(), 10_000);

        account.apply(AccountEvent::reservation_created(
            reservation,
            payment,
            Money::from_cents(10_000),
            Utc::now(),
        ));
        assert_eq!(account.balance().cents(), 10_000);
        assert_eq!(account.reserved_balance().cents(), 10_000);
        assert_eq!(account.available_balance().cents(), 0);

        // Confirm debits the balance and frees the hold.
        account.apply(AccountEvent::funds_debited(
            Money::from_cents(10_000),
            Some(payment),
        ));
        account.apply(AccountEvent::reservation_confirmed(
            reservation,
            payment,
            Money::from_cents(10_000),
        ));
        assert_eq!(account.balance().cents(), 0);
        assert_eq!(account.reserved_balance().cents(), 0);
    }

    #[test]
    fn reserve_release_cycle_restores_available() {
        let account_id = AggregateId::new();
        let payment = AggregateId::new();
        let reservation = AggregateId::new();
        let mut account = AccountState::default();

        account.apply(created(account_id));
        account.apply(AccountEvent::funds_credited(Money::from_cents(10_000)));
        account.apply(AccountEvent::reservation_created(
            reservation,
            payment,
            Money::from_cents(4_000),
            Utc::now(),
        ));
        account.apply(AccountEvent::reservation_released(
            reservation,
            payment,
            Money::from_cents(4_000),
        ));

        assert_eq!(account.balance().cents(), 10_000);
        assert_eq!(account.reserved_balance().cents(), 0);
        assert_eq!(account.available_balance().cents(), 10_000);
    }

    #[test]
    fn invariant_holds_through_history() {
        let account_id = AggregateId::new();
        let mut account = AccountState::default();

        account.apply(created(account_id));
        account.apply(AccountEvent::funds_credited(Money::from_cents(500)));

        for _ in 0..3 {
            let payment = AggregateId::new();
            let reservation = AggregateId::new();
            account.apply(AccountEvent::reservation_created(
                reservation,
                payment,
                Money::from_cents(100),
                Utc::now(),
            ));
            assert!(account.balance() >= account.reserved_balance());
            assert!(!account.reserved_balance().is_negative());
        }
    }
}
