//! Account domain events.
//!
//! Each ledger mutation emits events whose effects are disjoint: a confirm
//! emits both FundsDebited (balance) and ReservationConfirmed (reserved
//! balance), so the fold applies each exactly once.

use chrono::{DateTime, Utc};
use common::{AggregateId, Money, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on an account aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AccountEvent {
    /// Account was created for a user.
    AccountCreated(AccountCreatedData),

    /// Balance was increased (top-up or initial funding).
    FundsCredited(FundsCreditedData),

    /// Balance was decreased (reservation confirmed).
    FundsDebited(FundsDebitedData),

    /// Funds were set aside for a payment.
    ReservationCreated(ReservationCreatedData),

    /// A reservation was confirmed; the held funds left the account.
    ReservationConfirmed(ReservationConfirmedData),

    /// A reservation was released; the held funds became available again.
    ReservationReleased(ReservationReleasedData),
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountCreated(_) => "AccountCreated",
            AccountEvent::FundsCredited(_) => "FundsCredited",
            AccountEvent::FundsDebited(_) => "FundsDebited",
            AccountEvent::ReservationCreated(_) => "ReservationCreated",
            AccountEvent::ReservationConfirmed(_) => "ReservationConfirmed",
            AccountEvent::ReservationReleased(_) => "ReservationReleased",
        }
    }
}

/// Data for AccountCreated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCreatedData {
    /// The unique account ID.
    pub account_id: AggregateId,

    /// The owning user.
    pub user_id: UserId,

    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Data for FundsCredited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsCreditedData {
    /// Amount credited.
    pub amount: Money,

    /// When the credit happened.
    pub credited_at: DateTime<Utc>,
}

/// Data for FundsDebited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsDebitedData {
    /// Amount debited.
    pub amount: Money,

    /// The payment whose confirmation caused the debit.
    pub payment_id: Option<AggregateId>,

    /// When the debit happened.
    pub debited_at: DateTime<Utc>,
}

/// Data for ReservationCreated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationCreatedData {
    /// The reservation ID.
    pub reservation_id: AggregateId,

    /// The payment the reservation backs.
    pub payment_id: AggregateId,

    /// Reserved amount.
    pub amount: Money,

    /// When the hold lapses (recorded, not enforced).
    pub expires_at: DateTime<Utc>,

    /// When the reservation was made.
    pub reserved_at: DateTime<Utc>,
}

/// Data for ReservationConfirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfirmedData {
    /// The reservation ID.
    pub reservation_id: AggregateId,

    /// The payment the reservation backed.
    pub payment_id: AggregateId,

    /// Confirmed amount.
    pub amount: Money,

    /// When the confirmation happened.
    pub confirmed_at: DateTime<Utc>,
}

/// Data for ReservationReleased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationReleasedData {
    /// The reservation ID.
    pub reservation_id: AggregateId,

    /// The payment the reservation backed.
    pub payment_id: AggregateId,

    /// Released amount.
    pub amount: Money,

    /// When the release happened.
    pub released_at: DateTime<Utc>,
}

// Convenience constructors for events
impl AccountEvent {
    /// Creates an AccountCreated event.
    pub fn account_created(account_id: AggregateId, user_id: UserId) -> Self {
        AccountEvent::AccountCreated(AccountCreatedData {
            account_id,
            user_id,
            created_at: Utc::now(),
        })
    }

    /// Creates a FundsCredited event.
    pub fn funds_credited(amount: Money) -> Self {
        AccountEvent::FundsCredited(FundsCreditedData {
            amount,
            credited_at: Utc::now(),
        })
    }

    /// Creates a FundsDebited event.
    pub fn funds_debited(amount: Money, payment_id: Option<AggregateId>) -> Self {
        AccountEvent::FundsDebited(FundsDebitedData {
            amount,
            payment_id,
            debited_at: Utc::now(),
        })
    }

    /// Creates a ReservationCreated event.
    pub fn reservation_created(
        reservation_id: AggregateId,
        payment_id: AggregateId,
        amount: Money,
        expires_at: DateTime<Utc>,
    ) -> Self {
        AccountEvent::ReservationCreated(ReservationCreatedData {
            reservation_id,
            payment_id,
            amount,
            expires_at,
            reserved_at: Utc::now(),
        })
    }

    /// Creates a ReservationConfirmed event.
    pub fn reservation_confirmed(
        reservation_id: AggregateId,
        payment_id: AggregateId,
        amount: Money,
    ) -> Self {
        AccountEvent::ReservationConfirmed(ReservationConfirmedData {
            reservation_id,
            payment_id,
            amount,
            confirmed_at: Utc::now(),
        })
    }

    /// Creates a ReservationReleased event.
    pub fn reservation_released(
        reservation_id: AggregateId,
        payment_id: AggregateId,
        amount: Money,
    ) -> Self {
        AccountEvent::ReservationReleased(ReservationReleasedData {
            reservation_id,
            payment_id,
            amount,
            released_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names() {
        let account = AggregateId::new();
        let payment = AggregateId::new();
        let reservation = AggregateId::new();
        let amount = Money::from_cents(5000);

        assert_eq!(
            AccountEvent::account_created(account, UserId::new("user-1")).event_type(),
            "AccountCreated"
        );
        assert_eq!(
            AccountEvent::funds_credited(amount).event_type(),
            "FundsCredited"
        );
        assert_eq!(
            AccountEvent::funds_debited(amount, Some(payment)).event_type(),
            "FundsDebited"
        );
        assert_eq!(
            AccountEvent::reservation_created(reservation, payment, amount, Utc::now())
                .event_type(),
            "ReservationCreated"
        );
        assert_eq!(
            AccountEvent::reservation_confirmed(reservation, payment, amount).event_type(),
            "ReservationConfirmed"
        );
        assert_eq!(
            AccountEvent::reservation_released(reservation, payment, amount).event_type(),
            "ReservationReleased"
        );
    }

    #[test]
    fn reservation_created_serialization() {
        let reservation = AggregateId::new();
        let payment = AggregateId::new();
        let event = AccountEvent::reservation_created(
            reservation,
            payment,
            Money::from_cents(2500),
            Utc::now() + chrono::Duration::minutes(15),
        );

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: AccountEvent = serde_json::from_str(&json).unwrap();

        if let AccountEvent::ReservationCreated(data) = deserialized {
            assert_eq!(data.reservation_id, reservation);
            assert_eq!(data.payment_id, payment);
            assert_eq!(data.amount.cents(), 2500);
        } else {
            panic!("Expected ReservationCreated event");
        }
    }
}
