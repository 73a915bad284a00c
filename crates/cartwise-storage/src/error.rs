use thiserror::Error;

/// Storage-specific error types for the rental store.
///
/// Propagated to the caller of the store. The return monitor logs them and
/// moves on to the next rental; the request path reports them.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row does not map back to a valid record
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// The cart already has an open rental
    #[error("Cart {cart_id} already has an open rental")]
    OpenRentalExists { cart_id: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<cartwise_core::Error> for StorageError {
    fn from(error: cartwise_core::Error) -> Self {
        Self::CorruptRow(error.to_string())
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rental_exists_display() {
        let error = StorageError::OpenRentalExists { cart_id: 4 };
        assert_eq!(error.to_string(), "Cart 4 already has an open rental");
    }

    #[test]
    fn test_core_error_becomes_corrupt_row() {
        let error: StorageError = cartwise_core::Error::InvalidLockerId(20).into();
        assert!(matches!(error, StorageError::CorruptRow(_)));
    }
}
