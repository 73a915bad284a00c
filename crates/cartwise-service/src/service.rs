//! Request-path rental operations.
//!
//! Every operation that changes a rental takes the shared reconciliation lock
//! (see [`Stores`]) and re-reads the rental first, so it serialises with the
//! return monitor. Controller calls go through the capped [`ControllerHandle`].

use cartwise_core::{CartId, NewRental, RentalId, RentalRecord};
use cartwise_hardware::ControllerHandle;
use cartwise_storage::{Cart, CartTable, RentalRepository, RentalStatistics};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{Result, ServiceError};
use crate::stores::Stores;

#[derive(Clone)]
pub struct RentalService<R> {
    controller: ControllerHandle,
    stores: Stores<R>,
    rental_duration: chrono::Duration,
}

impl<R: RentalRepository> RentalService<R> {
    pub fn new(controller: ControllerHandle, stores: Stores<R>, rental_duration: chrono::Duration) -> Self {
        Self {
            controller,
            stores,
            rental_duration,
        }
    }

    pub fn carts(&self) -> &CartTable {
        &self.stores.carts
    }

    /// Rent the first available cart to `phone` and release its latch.
    ///
    /// # Errors
    ///
    /// - `ActiveRentalExists` if `phone` already has an open rental
    /// - `NoCartsAvailable` if every cart is out or in maintenance
    /// - `LockFailed` if the unlock frame could not be sent
    /// - `Hardware` if the controller did not answer within the request cap
    pub async fn assign_cart(&self, phone: &str) -> Result<RentalRecord> {
        let _guard = self.stores.lock().await;

        if let Some(existing) = self.stores.rentals.get_active_rental_by_phone(phone).await? {
            return Err(ServiceError::ActiveRentalExists {
                phone: phone.to_string(),
                rental_id: existing.id,
            });
        }
        let cart = self
            .stores
            .carts
            .first_available()
            .await
            .ok_or(ServiceError::NoCartsAvailable)?;

        if !self.controller.unlock(cart.locker_id).await? {
            return Err(ServiceError::LockFailed(cart.locker_id));
        }

        let now = Utc::now();
        self.stores.carts.assign(cart.cart_id, phone, now).await;
        let new = NewRental::new(cart.cart_id, phone, cart.locker_id, now, self.rental_duration);
        let id = match self.stores.rentals.create_rental(&new).await {
            Ok(id) => id,
            Err(e) => {
                self.stores.carts.mark_available(cart.cart_id).await;
                return Err(e.into());
            }
        };

        info!(rental_id = %id, cart = %cart.cart_id, locker = %cart.locker_id, "Cart assigned");
        Ok(RentalRecord::from_new(id, new))
    }

    /// Close the rental of `cart_id` on request of its renter.
    pub async fn manual_return(&self, cart_id: CartId, phone: &str) -> Result<RentalRecord> {
        let _guard = self.stores.lock().await;

        let cart = self.cart(cart_id).await?;
        if !cart.is_assigned_to(phone) {
            return Err(ServiceError::NotAssigned {
                cart_id,
                phone: phone.to_string(),
            });
        }
        let rental = self
            .stores
            .rentals
            .get_active_rental_by_cart(cart_id)
            .await?
            .filter(|rental| rental.user_phone == phone)
            .ok_or(ServiceError::NoOpenRental { cart_id })?;

        self.close(rental, Utc::now()).await
    }

    /// Check the cart's locker once and close its rental if the cart is latched.
    ///
    /// Returns `None` when the cart is not back yet or the board is silent.
    pub async fn check_return(&self, cart_id: CartId) -> Result<Option<RentalRecord>> {
        let cart = self.cart(cart_id).await?;
        let Some(snapshot) = self.controller.query_lock(cart.locker_id).await? else {
            return Ok(None);
        };
        if !snapshot.is_returned(cart.locker_id) {
            return Ok(None);
        }

        let _guard = self.stores.lock().await;
        match self.stores.rentals.get_active_rental_by_cart(cart_id).await? {
            Some(rental) => self.close(rental, Utc::now()).await.map(Some),
            None => Ok(None),
        }
    }

    /// Administratively close an open rental as returned now.
    pub async fn force_complete(&self, rental_id: RentalId) -> Result<RentalRecord> {
        let _guard = self.stores.lock().await;
        let rental = self.rental(rental_id).await?;
        self.close(rental, Utc::now()).await
    }

    /// Administratively cancel an open rental.
    ///
    /// The cart is still out, so it is held until the monitor sees it latched
    /// in its locker rather than offered to the next renter.
    pub async fn cancel(&self, rental_id: RentalId) -> Result<RentalRecord> {
        let _guard = self.stores.lock().await;
        let mut rental = self.rental(rental_id).await?;

        rental.cancel()?;
        self.persist(&rental).await?;
        self.stores.carts.hold_until_docked(rental.cart_id).await;
        info!(rental_id = %rental.id, cart = %rental.cart_id, "Rental cancelled");
        Ok(rental)
    }

    /// Move the deadline of an open rental.
    pub async fn extend(&self, rental_id: RentalId, expected_return: DateTime<Utc>) -> Result<RentalRecord> {
        let _guard = self.stores.lock().await;
        let mut rental = self.rental(rental_id).await?;

        rental.extend_until(expected_return, Utc::now())?;
        self.persist(&rental).await?;
        info!(rental_id = %rental.id, until = %expected_return, "Rental extended");
        Ok(rental)
    }

    pub async fn active_rental(&self, phone: &str) -> Result<Option<RentalRecord>> {
        Ok(self.stores.rentals.get_active_rental_by_phone(phone).await?)
    }

    pub async fn history(&self, phone: Option<&str>, limit: u32) -> Result<Vec<RentalRecord>> {
        Ok(self.stores.rentals.get_history(phone, limit).await?)
    }

    pub async fn overdue(&self) -> Result<Vec<RentalRecord>> {
        Ok(self.stores.rentals.list_overdue(Utc::now()).await?)
    }

    pub async fn statistics(&self) -> Result<RentalStatistics> {
        Ok(self.stores.rentals.statistics(Utc::now()).await?)
    }

    async fn cart(&self, cart_id: CartId) -> Result<Cart> {
        self.stores
            .carts
            .get(cart_id)
            .await
            .ok_or(ServiceError::CartNotFound(cart_id))
    }

    async fn rental(&self, rental_id: RentalId) -> Result<RentalRecord> {
        self.stores
            .rentals
            .get_rental(rental_id)
            .await?
            .ok_or(ServiceError::RentalNotFound(rental_id))
    }

    async fn persist(&self, rental: &RentalRecord) -> Result<()> {
        if self.stores.rentals.update_rental(rental).await? {
            Ok(())
        } else {
            Err(ServiceError::RentalNotFound(rental.id))
        }
    }

    /// Mark returned, persist, free the cart. Caller holds the lock.
    async fn close(&self, mut rental: RentalRecord, at: DateTime<Utc>) -> Result<RentalRecord> {
        let status = rental.mark_returned(at)?;
        self.persist(&rental).await?;
        self.stores.carts.mark_available(rental.cart_id).await;

        if rental.is_late(at) {
            warn!(rental_id = %rental.id, cart = %rental.cart_id, status = %status, "Rental closed late");
        } else {
            info!(rental_id = %rental.id, cart = %rental.cart_id, status = %status, "Rental closed");
        }
        Ok(rental)
    }
}
