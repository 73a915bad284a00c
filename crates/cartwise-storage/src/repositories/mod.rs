pub mod rental;

pub use rental::{RentalRepository, SqliteRentalRepository};
