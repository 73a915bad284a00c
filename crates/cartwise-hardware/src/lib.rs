//! Lock-controller access for the CartWise rental station.
//!
//! This crate talks to KR-CU16 lock boards over RS-485 and hides the
//! adapter's flakiness behind a small, value-returning API.
//!
//! # Layers
//!
//! - [`link`]: [`LinkSession`] owns one serial port and turns a request into
//!   reply bytes, retrying and reopening the port as needed
//! - [`controller`]: [`Cu16Controller`] builds frames, decodes status replies,
//!   unlocks with the mandatory busy-clear pulse and probes baud rates
//! - [`simulated`]: [`SimulatedBoard`], an in-memory board for running
//!   without hardware
//! - [`devices`]: [`AnyLockController`], the variant chosen at startup
//! - [`actor`]: [`ControllerHandle`], the single owner thread every caller
//!   goes through
//!
//! # Example
//!
//! ```no_run
//! use cartwise_core::LockerId;
//! use cartwise_hardware::{
//!     AnyLockController, ControllerConfig, ControllerHandle, LinkConfig, PortSettings,
//! };
//!
//! #[tokio::main]
//! async fn main() -> cartwise_hardware::Result<()> {
//!     let (controller, _sensors) = AnyLockController::open_or_simulate(
//!         PortSettings::new("/dev/ttyUSB0", 9600),
//!         LinkConfig::default(),
//!         ControllerConfig::default(),
//!     );
//!     let handle = ControllerHandle::spawn(controller)?;
//!
//!     if let Some(snapshot) = handle.query_all().await? {
//!         let locker = LockerId::new(3).unwrap();
//!         println!("locker 3 returned: {}", snapshot.is_returned(locker));
//!     }
//!
//!     handle.shutdown().await
//! }
//! ```
//!
//! # Error Handling
//!
//! Link failures stay inside the link and surface as `None`, `false` or
//! [`LockStatus::Unknown`]. [`HardwareError`] is reserved for the handle
//! itself: a stopped controller thread or an exceeded request cap.

pub mod actor;
pub mod controller;
pub mod devices;
pub mod error;
pub mod link;
pub mod mock;
pub mod serial;
pub mod simulated;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use actor::ControllerHandle;
pub use controller::{ControllerConfig, Cu16Controller};
pub use devices::AnyLockController;
pub use error::{HardwareError, LinkError, Result};
pub use link::{LinkConfig, LinkSession, PortOpener, PortSettings, SerialLink};
pub use serial::SerialPortOpener;
pub use simulated::{SimulatedBoard, SimulatedBoardHandle};
pub use traits::LockBoard;
pub use types::{ControllerKind, LockStatus};
