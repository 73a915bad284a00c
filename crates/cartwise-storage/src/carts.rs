//! In-memory cart table.
//!
//! Maps each cart to its locker and tracks availability. Read by the return
//! monitor, written by both the monitor and the request path.

use std::collections::BTreeMap;
use std::sync::Arc;

use cartwise_core::{CartId, LockerId};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Cart, CartStatus};

/// Shared, cloneable cart table ordered by cart id.
#[derive(Debug, Clone, Default)]
pub struct CartTable {
    carts: Arc<RwLock<BTreeMap<CartId, Cart>>>,
}

impl CartTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed carts `1..=count`, cart `n` parked in locker `n - 1`.
    ///
    /// A board has 16 bays, so at most 16 carts are created.
    ///
    /// # Examples
    ///
    /// ```
    /// use cartwise_core::{CartId, LockerId};
    /// use cartwise_storage::CartTable;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let carts = CartTable::with_default_carts(5);
    ///     assert_eq!(carts.list().await.len(), 5);
    ///     assert_eq!(
    ///         carts.locker_of(CartId::new(3)).await,
    ///         Some(LockerId::new(2).unwrap())
    ///     );
    /// }
    /// ```
    pub fn with_default_carts(count: u8) -> Self {
        let carts = LockerId::all()
            .take(usize::from(count))
            .map(|locker| {
                let cart_id = CartId::new(u32::from(locker.as_u8()) + 1);
                (cart_id, Cart::new(cart_id, locker))
            })
            .collect();
        Self {
            carts: Arc::new(RwLock::new(carts)),
        }
    }

    /// Add or replace a cart. Returns the previous entry.
    pub async fn insert(&self, cart: Cart) -> Option<Cart> {
        self.carts.write().await.insert(cart.cart_id, cart)
    }

    pub async fn get(&self, cart_id: CartId) -> Option<Cart> {
        self.carts.read().await.get(&cart_id).cloned()
    }

    pub async fn locker_of(&self, cart_id: CartId) -> Option<LockerId> {
        self.carts.read().await.get(&cart_id).map(|cart| cart.locker_id)
    }

    pub async fn list(&self) -> Vec<Cart> {
        self.carts.read().await.values().cloned().collect()
    }

    pub async fn available(&self) -> Vec<Cart> {
        self.carts
            .read()
            .await
            .values()
            .filter(|cart| cart.is_available())
            .cloned()
            .collect()
    }

    /// Lowest-numbered available cart.
    pub async fn first_available(&self) -> Option<Cart> {
        self.carts
            .read()
            .await
            .values()
            .find(|cart| cart.is_available())
            .cloned()
    }

    /// Set the status of a cart. `false` if the cart is unknown.
    pub async fn set_status(&self, cart_id: CartId, status: CartStatus) -> bool {
        self.update(cart_id, |cart| cart.status = status).await.is_some()
    }

    /// Hand `cart_id` to `phone`. `false` if the cart is unknown.
    pub async fn assign(&self, cart_id: CartId, phone: &str, at: DateTime<Utc>) -> bool {
        self.update(cart_id, |cart| cart.assign(phone, at)).await.is_some()
    }

    /// Make `cart_id` rentable again. `false` if the cart is unknown.
    pub async fn mark_available(&self, cart_id: CartId) -> bool {
        self.update(cart_id, Cart::mark_available).await.is_some()
    }

    /// Keep `cart_id` out of service until its locker latches it. `false` if
    /// the cart is unknown.
    pub async fn hold_until_docked(&self, cart_id: CartId) -> bool {
        self.update(cart_id, Cart::hold_until_docked).await.is_some()
    }

    /// Carts held until their locker latches them again.
    pub async fn awaiting_dock(&self) -> Vec<Cart> {
        self.carts
            .read()
            .await
            .values()
            .filter(|cart| cart.awaiting_dock())
            .cloned()
            .collect()
    }

    /// Apply `change` to a cart under the write lock; returns the updated cart.
    pub async fn update(&self, cart_id: CartId, change: impl FnOnce(&mut Cart)) -> Option<Cart> {
        let mut carts = self.carts.write().await;
        let cart = carts.get_mut(&cart_id)?;
        change(cart);
        debug!(cart = %cart_id, status = %cart.status, "Cart updated");
        Some(cart.clone())
    }
}
