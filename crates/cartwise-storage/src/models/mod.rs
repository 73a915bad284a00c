pub mod cart;
pub mod rental;

pub use cart::{Cart, CartStatus};
pub use rental::{RentalRow, RentalStatistics};
