//! The account ledger service.

use std::collections::HashMap;
use std::sync::Arc;

use common::{AggregateId, Money, UserId};
use domain::{AccountEvent, AccountState, AggregateStore};
use event_store::EventStore;
use tokio::sync::RwLock;

use crate::error::{LedgerError, Result};
use crate::model::{Account, FundReservation, ReservationStatus};

/// Working state behind the ledger's writer lock.
#[derive(Default)]
struct LedgerState {
    accounts: HashMap<AggregateId, Account>,
    by_user: HashMap<UserId, AggregateId>,
    /// Reservations keyed by the payment they back (unique per payment).
    reservations: HashMap<AggregateId, FundReservation>,
}

/// Exclusive owner of account and reservation mutation.
///
/// The write lock over [`LedgerState`] is the transaction boundary: the
/// read-check-write of balance and reservation state, plus the event
/// append recording it, happen while the lock is held, so concurrent
/// reservations on one account can never both pass the available-funds
/// check.
pub struct AccountLedger<S: EventStore> {
    state: Arc<RwLock<LedgerState>>,
    accounts: AggregateStore<S, AccountState>,
}

impl<S: EventStore> Clone for AccountLedger<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            accounts: self.accounts.clone(),
        }
    }
}

impl<S: EventStore> AccountLedger<S> {
    /// Creates a new ledger over the given event store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            accounts: AggregateStore::new(store),
        }
    }

    /// Creates an account for a user, optionally funded with an initial
    /// balance. Fails if the user already has an account.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn create_account(
        &self,
        user_id: UserId,
        initial_balance: Money,
    ) -> Result<Account> {
        if initial_balance.is_negative() {
            return Err(LedgerError::InvalidAmount(initial_balance));
        }

        let mut state = self.state.write().await;

        if state.by_user.contains_key(&user_id) {
            return Err(LedgerError::AccountExists(user_id.to_string()));
        }

        let mut account = Account::new(user_id.clone());
        account.balance = initial_balance;

        let mut events = vec![AccountEvent::account_created(account.id, user_id.clone())];
        if initial_balance.is_positive() {
            events.push(AccountEvent::funds_credited(initial_balance));
        }
        self.accounts
            .append_events(account.id, Some(&user_id), events)
            .await?;

        state.by_user.insert(user_id, account.id);
        state.accounts.insert(account.id, account.clone());

        metrics::counter!("ledger_accounts_created_total").increment(1);
        tracing::info!(account_id = %account.id, "account created");

        Ok(account)
    }

    /// Returns the account owned by a user, if any.
    pub async fn find_by_user(&self, user_id: &UserId) -> Option<Account> {
        let state = self.state.read().await;
        let id = state.by_user.get(user_id)?;
        state.accounts.get(id).cloned()
    }

    /// Returns an account by its ID, if it exists.
    pub async fn get_account(&self, account_id: AggregateId) -> Option<Account> {
        let state = self.state.read().await;
        state.accounts.get(&account_id).cloned()
    }

    /// Returns all accounts.
    pub async fn list_accounts(&self) -> Vec<Account> {
        let state = self.state.read().await;
        let mut accounts: Vec<_> = state.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.created_at);
        accounts
    }

    /// Returns the reservation backing a payment, if any.
    pub async fn find_reservation(&self, payment_id: AggregateId) -> Option<FundReservation> {
        let state = self.state.read().await;
        state.reservations.get(&payment_id).cloned()
    }

    /// Reserves funds on a user's account for a payment.
    ///
    /// Idempotent per payment: a repeat call returns the existing
    /// reservation unchanged without double-reserving. Fails with
    /// `InsufficientFunds` without mutating anything when the available
    /// balance cannot cover the amount.
    #[tracing::instrument(skip(self), fields(user_id = %user_id, payment_id = %payment_id))]
    pub async fn reserve_funds(
        &self,
        user_id: &UserId,
        payment_id: AggregateId,
        amount: Money,
    ) -> Result<FundReservation> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.write().await;

        if let Some(existing) = state.reservations.get(&payment_id) {
            tracing::debug!(reservation_id = %existing.id, "reservation already exists");
            return Ok(existing.clone());
        }

        let account_id = *state
            .by_user
            .get(user_id)
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        let account = state
            .accounts
            .get(&account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;

        let available = account.available_balance();
        if available < amount {
            metrics::counter!("ledger_insufficient_funds_total").increment(1);
            return Err(LedgerError::InsufficientFunds {
                available,
                required: amount,
            });
        }

        let reservation = FundReservation::new(account_id, payment_id, amount);
        self.accounts
            .append_events(
                account_id,
                Some(user_id),
                vec![AccountEvent::reservation_created(
                    reservation.id,
                    payment_id,
                    amount,
                    reservation.expires_at,
                )],
            )
            .await?;

        if let Some(account) = state.accounts.get_mut(&account_id) {
            account.reserved_balance += amount;
        }
        state.reservations.insert(payment_id, reservation.clone());

        metrics::counter!("ledger_reservations_total").increment(1);
        tracing::info!(reservation_id = %reservation.id, amount = %amount, "funds reserved");

        Ok(reservation)
    }

    /// Confirms a reservation, debiting the held funds.
    ///
    /// No-op if already confirmed; fails with `InvalidState` for a
    /// released reservation.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn confirm_reservation(&self, payment_id: AggregateId) -> Result<FundReservation> {
        let mut state = self.state.write().await;

        let reservation = state
            .reservations
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| LedgerError::ReservationNotFound(payment_id.to_string()))?;

        match reservation.status {
            ReservationStatus::Confirmed => return Ok(reservation),
            ReservationStatus::Released => {
                return Err(LedgerError::InvalidState {
                    payment_id: payment_id.to_string(),
                    status: reservation.status.as_str(),
                    action: "confirm",
                });
            }
            ReservationStatus::Active => {}
        }

        let user_id = state
            .accounts
            .get(&reservation.account_id)
            .map(|a| a.user_id.clone());
        self.accounts
            .append_events(
                reservation.account_id,
                user_id.as_ref(),
                vec![
                    AccountEvent::funds_debited(reservation.amount, Some(payment_id)),
                    AccountEvent::reservation_confirmed(
                        reservation.id,
                        payment_id,
                        reservation.amount,
                    ),
                ],
            )
            .await?;

        if let Some(account) = state.accounts.get_mut(&reservation.account_id) {
            account.balance -= reservation.amount;
            account.reserved_balance -= reservation.amount;
        }
        let confirmed = {
            let entry = state
                .reservations
                .get_mut(&payment_id)
                .ok_or_else(|| LedgerError::ReservationNotFound(payment_id.to_string()))?;
            entry.status = ReservationStatus::Confirmed;
            entry.clone()
        };

        metrics::counter!("ledger_reservations_confirmed_total").increment(1);
        tracing::info!(reservation_id = %confirmed.id, "reservation confirmed");

        Ok(confirmed)
    }

    /// Releases a reservation, making the held funds available again.
    ///
    /// Missing or non-active reservations are a warn-level no-op, not an
    /// error, so compensation can always run safely.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn release_reservation(
        &self,
        payment_id: AggregateId,
    ) -> Result<Option<FundReservation>> {
        let mut state = self.state.write().await;

        let Some(reservation) = state.reservations.get(&payment_id).cloned() else {
            tracing::warn!("release requested for unknown reservation, ignoring");
            return Ok(None);
        };

        if !reservation.is_active() {
            tracing::warn!(
                status = reservation.status.as_str(),
                "release requested for non-active reservation, ignoring"
            );
            return Ok(None);
        }

        let user_id = state
            .accounts
            .get(&reservation.account_id)
            .map(|a| a.user_id.clone());
        self.accounts
            .append_events(
                reservation.account_id,
                user_id.as_ref(),
                vec![AccountEvent::reservation_released(
                    reservation.id,
                    payment_id,
                    reservation.amount,
                )],
            )
            .await?;

        if let Some(account) = state.accounts.get_mut(&reservation.account_id) {
            account.reserved_balance -= reservation.amount;
        }
        let released = {
            let entry = state
                .reservations
                .get_mut(&payment_id)
                .ok_or_else(|| LedgerError::ReservationNotFound(payment_id.to_string()))?;
            entry.status = ReservationStatus::Released;
            entry.clone()
        };

        metrics::counter!("ledger_reservations_released_total").increment(1);
        tracing::info!(reservation_id = %released.id, "reservation released");

        Ok(Some(released))
    }

    /// Credits a user's account (out-of-band top-up).
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn add_balance(&self, user_id: &UserId, amount: Money) -> Result<Account> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.write().await;

        let account_id = *state
            .by_user
            .get(user_id)
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;

        self.accounts
            .append_events(
                account_id,
                Some(user_id),
                vec![AccountEvent::funds_credited(amount)],
            )
            .await?;

        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        account.balance += amount;

        Ok(account.clone())
    }
}
