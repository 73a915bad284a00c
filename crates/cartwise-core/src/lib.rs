pub mod constants;
pub mod error;
pub mod rental;
pub mod types;

pub use error::{Error, FrameError, Result};
pub use rental::{NewRental, RentalRecord, RentalStatus};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
