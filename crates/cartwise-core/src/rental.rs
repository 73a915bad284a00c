//! Rental lifecycle state machine.
//!
//! A rental covers one checkout-to-return cycle of a cart. Records are never
//! deleted; once a rental reaches a terminal state it stays in the history.
//!
//! # States
//!
//! - `Active`: cart is out, deadline not yet passed (initial state)
//! - `Overdue`: cart is out and the deadline has passed
//! - `Returned`: cart came back on or before the deadline
//! - `ReturnedLate`: cart came back after the deadline
//! - `Cancelled`: closed administratively
//!
//! # Valid Transitions
//!
//! - Active → Returned | ReturnedLate | Overdue | Cancelled
//! - Overdue → Returned | ReturnedLate | Cancelled
//! - Overdue → Active (only when the deadline is moved into the future)
//!
//! `Returned`, `ReturnedLate` and `Cancelled` are terminal.
//!
//! # Examples
//!
//! ```
//! use cartwise_core::{CartId, LockerId, NewRental, RentalId, RentalRecord, RentalStatus};
//! use chrono::{Duration, Utc};
//!
//! let start = Utc::now();
//! let new = NewRental::new(
//!     CartId::new(3),
//!     "0501234567",
//!     LockerId::new(2).unwrap(),
//!     start,
//!     Duration::minutes(120),
//! );
//! let mut rental = RentalRecord::from_new(RentalId::new(1), new);
//!
//! let status = rental.mark_returned(start + Duration::minutes(30)).unwrap();
//! assert_eq!(status, RentalStatus::Returned);
//! assert!(rental.status.is_terminal());
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{CartId, Error, LockerId, RentalId, Result};

/// Lifecycle state of a rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    /// Cart is out and the deadline has not passed.
    Active,

    /// Cart came back on or before the deadline.
    Returned,

    /// Cart came back after the deadline.
    ReturnedLate,

    /// Cart is out and the deadline has passed.
    Overdue,

    /// Closed by an administrator. Never produced by the monitor.
    Cancelled,
}

impl RentalStatus {
    /// Every status, in declaration order.
    pub const ALL: [RentalStatus; 5] = [
        RentalStatus::Active,
        RentalStatus::Returned,
        RentalStatus::ReturnedLate,
        RentalStatus::Overdue,
        RentalStatus::Cancelled,
    ];

    /// Storage tag for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Active => "active",
            RentalStatus::Returned => "returned",
            RentalStatus::ReturnedLate => "returned_late",
            RentalStatus::Overdue => "overdue",
            RentalStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RentalStatus::Returned | RentalStatus::ReturnedLate | RentalStatus::Cancelled
        )
    }

    /// Whether the cart is still out (Active or Overdue).
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use cartwise_core::RentalStatus;
    ///
    /// assert!(RentalStatus::Active.can_transition_to(&RentalStatus::Overdue));
    /// assert!(RentalStatus::Overdue.can_transition_to(&RentalStatus::ReturnedLate));
    /// assert!(!RentalStatus::Returned.can_transition_to(&RentalStatus::Active));
    /// ```
    pub fn can_transition_to(&self, target: &RentalStatus) -> bool {
        matches!(
            (self, target),
            // From Active
            (
                RentalStatus::Active,
                RentalStatus::Returned
                    | RentalStatus::ReturnedLate
                    | RentalStatus::Overdue
                    | RentalStatus::Cancelled
            )
            // From Overdue
            | (
                RentalStatus::Overdue,
                RentalStatus::Returned
                    | RentalStatus::ReturnedLate
                    | RentalStatus::Cancelled
                    | RentalStatus::Active
            )
        )
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status_str = match self {
            RentalStatus::Active => "Active",
            RentalStatus::Returned => "Returned",
            RentalStatus::ReturnedLate => "ReturnedLate",
            RentalStatus::Overdue => "Overdue",
            RentalStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", status_str)
    }
}

impl std::str::FromStr for RentalStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RentalStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidRecord(format!("Unknown rental status: {s}")))
    }
}

/// A rental that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRental {
    pub cart_id: CartId,
    pub user_phone: String,
    pub locker_id: LockerId,
    pub start_time: DateTime<Utc>,
    pub expected_return: DateTime<Utc>,
    pub notes: Option<String>,
}

impl NewRental {
    pub fn new(
        cart_id: CartId,
        user_phone: impl Into<String>,
        locker_id: LockerId,
        start_time: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            cart_id,
            user_phone: user_phone.into(),
            locker_id,
            start_time,
            expected_return: start_time + duration,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// One checkout-to-return cycle linking a cart, a user and a locker.
///
/// # Thread Safety
///
/// The record itself is plain data. Callers that share records between the
/// monitor and a request path must serialise their read-modify-write cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalRecord {
    pub id: RentalId,
    pub cart_id: CartId,
    pub user_phone: String,
    pub locker_id: LockerId,
    pub start_time: DateTime<Utc>,
    pub expected_return: DateTime<Utc>,
    pub actual_return: Option<DateTime<Utc>>,
    pub status: RentalStatus,
    pub notes: Option<String>,
}

impl RentalRecord {
    /// Build the stored form of a freshly created rental.
    pub fn from_new(id: RentalId, new: NewRental) -> Self {
        Self {
            id,
            cart_id: new.cart_id,
            user_phone: new.user_phone,
            locker_id: new.locker_id,
            start_time: new.start_time,
            expected_return: new.expected_return,
            actual_return: None,
            status: RentalStatus::Active,
            notes: new.notes,
        }
    }

    fn transition_to(&mut self, target: RentalStatus) -> Result<()> {
        if !self.status.can_transition_to(&target) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Close the rental as returned at `at`.
    ///
    /// A return exactly at the deadline counts as on time.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the rental is already closed.
    pub fn mark_returned(&mut self, at: DateTime<Utc>) -> Result<RentalStatus> {
        let target = if at > self.expected_return {
            RentalStatus::ReturnedLate
        } else {
            RentalStatus::Returned
        };
        self.transition_to(target)?;
        self.actual_return = Some(at);
        Ok(target)
    }

    /// Flag the rental as overdue if its deadline has passed.
    ///
    /// Returns `Ok(true)` only when the status actually changed, so repeated
    /// calls while the cart stays out are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the rental is already closed.
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> Result<bool> {
        match self.status {
            RentalStatus::Overdue => Ok(false),
            RentalStatus::Active if now > self.expected_return => {
                self.transition_to(RentalStatus::Overdue)?;
                Ok(true)
            }
            RentalStatus::Active => Ok(false),
            _ => Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: RentalStatus::Overdue.to_string(),
            }),
        }
    }

    /// Close the rental administratively.
    pub fn cancel(&mut self) -> Result<()> {
        self.transition_to(RentalStatus::Cancelled)
    }

    /// Move the deadline of an open rental.
    ///
    /// An overdue rental whose new deadline lies after `now` becomes active again.
    pub fn extend_until(&mut self, expected_return: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: self.status.to_string(),
            });
        }
        if expected_return < self.start_time {
            return Err(Error::InvalidRecord(format!(
                "Deadline {expected_return} precedes rental start {}",
                self.start_time
            )));
        }

        self.expected_return = expected_return;
        if self.status == RentalStatus::Overdue && expected_return >= now {
            self.transition_to(RentalStatus::Active)?;
        }
        Ok(())
    }

    /// Whether the cart is still out.
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Whether the rental is (or ended) past its deadline.
    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RentalStatus::Active | RentalStatus::Overdue => now > self.expected_return,
            RentalStatus::ReturnedLate => true,
            RentalStatus::Returned | RentalStatus::Cancelled => false,
        }
    }

    /// Time left until the deadline (negative once late).
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expected_return - now
    }

    /// Actual duration for closed rentals, running duration otherwise.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.actual_return.unwrap_or(now) - self.start_time
    }
}
