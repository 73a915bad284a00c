//! Rental reconciliation for the CartWise station.
//!
//! This crate wires the lock board and the rental store together:
//!
//! - [`ReturnMonitor`] polls the board and closes or flags rentals
//! - [`RentalService`] is the request path: assign, return, cancel
//! - [`AppContext`] builds both from a [`ServiceConfig`] and owns their lifetimes
//!
//! # Example
//!
//! ```no_run
//! use cartwise_service::{AppContext, ServiceConfig, logging};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::from_env()?;
//!     logging::init(&config.log_level);
//!
//!     let app = AppContext::start(config).await?;
//!     let rental = app.rental_service().assign_cart("0501234567").await?;
//!     println!("cart {} is yours until {}", rental.cart_id, rental.expected_return);
//!
//!     app.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod service;
pub mod stores;

pub use config::ServiceConfig;
pub use context::AppContext;
pub use error::{Result, ServiceError};
pub use monitor::{MonitorHandle, MonitorStatus, RentalEvent, ReturnMonitor, TickReport};
pub use service::RentalService;
pub use stores::Stores;
