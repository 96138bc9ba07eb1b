use chrono::{DateTime, Duration, Utc};
use common::{AggregateId, Money, UserId};
use serde::{Deserialize, Serialize};

/// How long a reservation is nominally held before it lapses.
/// Recorded on the reservation for operators; not enforced by a sweeper.
const RESERVATION_TTL_MINUTES: i64 = 15;

/// An account owned by exactly one user.
///
/// Invariant: `balance >= reserved_balance >= 0` at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID; doubles as the account's aggregate ID.
    pub id: AggregateId,

    /// The owning user (unique across accounts).
    pub user_id: UserId,

    /// Total balance, including reserved funds.
    pub balance: Money,

    /// Portion of the balance held by active reservations.
    pub reserved_balance: Money,

    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account for a user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: AggregateId::new(),
            user_id,
            balance: Money::zero(),
            reserved_balance: Money::zero(),
            created_at: Utc::now(),
        }
    }

    /// Returns the balance not held by reservations.
    pub fn available_balance(&self) -> Money {
        self.balance - self.reserved_balance
    }
}

/// Status of a fund reservation.
///
/// Transitions are monotonic: `Active -> Confirmed` or `Active -> Released`,
/// both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Funds are held; the reservation can still be confirmed or released.
    Active,

    /// The held funds were debited (terminal).
    Confirmed,

    /// The hold was dropped and the funds are available again (terminal).
    Released,
}

impl ReservationStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "Active",
            ReservationStatus::Confirmed => "Confirmed",
            ReservationStatus::Released => "Released",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A hold on part of an account's balance, backing exactly one payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundReservation {
    /// Unique reservation ID.
    pub id: AggregateId,

    /// The account the funds are held on.
    pub account_id: AggregateId,

    /// The payment this reservation backs (unique per payment).
    pub payment_id: AggregateId,

    /// Reserved amount.
    pub amount: Money,

    /// Current status.
    pub status: ReservationStatus,

    /// When the hold nominally lapses.
    pub expires_at: DateTime<Utc>,

    /// When the reservation was made.
    pub created_at: DateTime<Utc>,
}

impl FundReservation {
    /// Creates a new active reservation.
    pub fn new(account_id: AggregateId, payment_id: AggregateId, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: AggregateId::new(),
            account_id,
            payment_id,
            amount,
            status: ReservationStatus::Active,
            expires_at: now + Duration::minutes(RESERVATION_TTL_MINUTES),
            created_at: now,
        }
    }

    /// Returns true if the reservation can still be confirmed or released.
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}
