use cartwise_core::{CartId, LockerId, RentalId};
use cartwise_hardware::HardwareError;
use cartwise_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the rental service and the application context.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Cart {0} not found")]
    CartNotFound(CartId),

    #[error("Rental {0} not found")]
    RentalNotFound(RentalId),

    #[error("Cart {cart_id} has no open rental")]
    NoOpenRental { cart_id: CartId },

    #[error("Cart {cart_id} is not assigned to {phone}")]
    NotAssigned { cart_id: CartId, phone: String },

    #[error("No carts available")]
    NoCartsAvailable,

    #[error("{phone} already has open rental {rental_id}")]
    ActiveRentalExists { phone: String, rental_id: RentalId },

    #[error("Locker {0} could not be unlocked")]
    LockFailed(LockerId),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Illegal rental transition, invalid configuration and other domain errors
    #[error(transparent)]
    Core(#[from] cartwise_core::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
