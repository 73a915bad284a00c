//! Shared rental state.
//!
//! The rental store and the cart table are written by two call paths: the
//! return monitor and the request path. Both take [`Stores::lock`] around each
//! read-modify-write, and re-read the rental after taking it, so a manual
//! return and a detected return never both apply to one record.

use std::sync::Arc;

use cartwise_storage::CartTable;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct Stores<R> {
    pub rentals: R,
    pub carts: CartTable,
    lock: Arc<Mutex<()>>,
}

impl<R> Stores<R> {
    pub fn new(rentals: R, carts: CartTable) -> Self {
        Self {
            rentals,
            carts,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Take the reconciliation lock.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}
