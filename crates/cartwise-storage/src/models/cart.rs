use std::fmt;

use cartwise_core::{CartId, LockerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Available,
    InUse,
    Returned,
    Maintenance,
    Locked,
}

impl fmt::Display for CartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            CartStatus::Available => "available",
            CartStatus::InUse => "in_use",
            CartStatus::Returned => "returned",
            CartStatus::Maintenance => "maintenance",
            CartStatus::Locked => "locked",
        };
        f.write_str(status)
    }
}

/// A physical cart parked in one locker bay.
///
/// # Examples
///
/// ```
/// use cartwise_core::{CartId, LockerId};
/// use cartwise_storage::models::{Cart, CartStatus};
/// use chrono::Utc;
///
/// let mut cart = Cart::new(CartId::new(1), LockerId::new(0).unwrap());
/// cart.assign("0501234567", Utc::now());
/// assert_eq!(cart.status, CartStatus::InUse);
///
/// cart.mark_available();
/// assert!(cart.assigned_to.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub cart_id: CartId,
    pub locker_id: LockerId,
    pub status: CartStatus,
    /// Phone of the renter while the cart is out.
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    /// Last known latch state of the cart's locker.
    pub is_locked: bool,
    /// Out of service until its locker reports it latched again.
    #[serde(default)]
    pub held_until_docked: bool,
}

impl Cart {
    /// An available, latched cart.
    pub fn new(cart_id: CartId, locker_id: LockerId) -> Self {
        Self {
            cart_id,
            locker_id,
            status: CartStatus::Available,
            assigned_to: None,
            assigned_at: None,
            returned_at: None,
            is_locked: true,
            held_until_docked: false,
        }
    }

    /// Hand the cart to `phone`.
    pub fn assign(&mut self, phone: impl Into<String>, at: DateTime<Utc>) {
        self.status = CartStatus::InUse;
        self.assigned_to = Some(phone.into());
        self.assigned_at = Some(at);
        self.returned_at = None;
        self.is_locked = false;
    }

    /// Make the cart rentable again and forget the previous renter.
    pub fn mark_available(&mut self) {
        self.status = CartStatus::Available;
        self.assigned_to = None;
        self.assigned_at = None;
        self.returned_at = None;
        self.is_locked = true;
        self.held_until_docked = false;
    }

    /// Drop the renter but keep the cart out of service until it is docked.
    ///
    /// Used when a rental ends without the cart coming back, so the next
    /// renter is not sent to an empty bay.
    pub fn hold_until_docked(&mut self) {
        self.status = CartStatus::Maintenance;
        self.assigned_to = None;
        self.is_locked = false;
        self.held_until_docked = true;
    }

    pub fn awaiting_dock(&self) -> bool {
        self.held_until_docked
    }

    pub fn is_available(&self) -> bool {
        self.status == CartStatus::Available
    }

    pub fn is_assigned_to(&self, phone: &str) -> bool {
        self.status == CartStatus::InUse && self.assigned_to.as_deref() == Some(phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart() -> Cart {
        Cart::new(CartId::new(2), LockerId::new(1).unwrap())
    }

    #[test]
    fn test_assign_records_renter() {
        let mut cart = cart();
        let at = Utc::now();
        cart.assign("0509999999", at);

        assert!(cart.is_assigned_to("0509999999"));
        assert!(!cart.is_assigned_to("0500000000"));
        assert_eq!(cart.assigned_at, Some(at));
        assert!(!cart.is_locked);
    }

    #[test]
    fn test_mark_available_clears_assignment() {
        let mut cart = cart();
        cart.assign("0509999999", Utc::now());
        cart.mark_available();

        assert_eq!(cart, Cart::new(CartId::new(2), LockerId::new(1).unwrap()));
    }

    #[test]
    fn test_held_cart_is_neither_available_nor_assigned() {
        let mut cart = cart();
        cart.assign("0509999999", Utc::now());
        cart.hold_until_docked();

        assert!(!cart.is_available());
        assert!(!cart.is_assigned_to("0509999999"));
        assert!(cart.awaiting_dock());

        cart.mark_available();
        assert!(!cart.awaiting_dock());
        assert!(cart.is_available());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&CartStatus::InUse).unwrap();
        assert_eq!(json, "\"in_use\"");
        assert_eq!(CartStatus::InUse.to_string(), "in_use");
    }
}
