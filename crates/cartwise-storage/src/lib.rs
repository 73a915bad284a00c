//! Storage layer for the CartWise rental station.
//!
//! Two stores live here:
//!
//! - the rental history, persisted in SQLite through [`RentalRepository`]
//!   ([`SqliteRentalRepository`] is the production implementation)
//! - the [`CartTable`], an in-memory map from cart to locker and availability
//!
//! # Schema
//!
//! One `rentals` table, created by the embedded migrations under the
//! workspace `migrations/` directory. Rows are never deleted: closed rentals
//! form the history. A partial unique index keeps at most one Active or
//! Overdue rental per cart.
//!
//! # Example
//!
//! ```no_run
//! use cartwise_core::{CartId, LockerId, NewRental};
//! use cartwise_storage::{Database, DatabaseConfig, RentalRepository, SqliteRentalRepository};
//! use chrono::{Duration, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("data/rentals.db")).await?;
//! let rentals = SqliteRentalRepository::new(db.pool().clone());
//!
//! let id = rentals
//!     .create_rental(&NewRental::new(
//!         CartId::new(1),
//!         "0501234567",
//!         LockerId::new(0)?,
//!         Utc::now(),
//!         Duration::minutes(120),
//!     ))
//!     .await?;
//!
//! let rental = rentals.get_rental(id).await?;
//! assert!(rental.is_some());
//! # Ok(())
//! # }
//! ```

pub mod carts;
pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use carts::CartTable;
pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{Cart, CartStatus, RentalStatistics};
pub use repositories::{RentalRepository, SqliteRentalRepository};
