//! Enum wrapper for lock-controller dispatch.
//!
//! The controller variant is chosen once at startup: a real KR-CU16 on a
//! serial port, or the simulated board when the port is missing. Code
//! downstream only ever sees [`AnyLockController`] (or the handle wrapping
//! it) and never checks for an absent controller.
//!
//! # Examples
//!
//! ```
//! use cartwise_hardware::devices::AnyLockController;
//! use cartwise_hardware::simulated::SimulatedBoard;
//! use cartwise_hardware::traits::LockBoard;
//! use cartwise_hardware::types::ControllerKind;
//!
//! let (board, _handle) = SimulatedBoard::new();
//! let controller = AnyLockController::Simulated(board);
//! assert_eq!(controller.kind(), ControllerKind::Simulated);
//! ```

use cartwise_core::LockerId;
use cartwise_protocol::LockStateSnapshot;
use tracing::{info, warn};

use crate::controller::{ControllerConfig, Cu16Controller};
use crate::link::{LinkConfig, LinkSession, PortSettings};
use crate::serial::SerialPortOpener;
use crate::simulated::{SimulatedBoard, SimulatedBoardHandle};
use crate::traits::LockBoard;
use crate::types::{ControllerKind, LockStatus};

/// Lock controller selected at startup.
pub enum AnyLockController {
    /// KR-CU16 on a serial port.
    Hardware(Cu16Controller<SerialPortOpener>),

    /// In-memory board for degraded "no hardware" mode and development.
    Simulated(SimulatedBoard),
}

impl AnyLockController {
    /// Open the serial port once and wrap it, or fall back to a simulated board.
    ///
    /// A port that cannot be opened is logged once here; the returned
    /// controller is always usable. The simulated board handle is returned
    /// only in the fallback case.
    pub fn open_or_simulate(
        settings: PortSettings,
        link_config: LinkConfig,
        controller_config: ControllerConfig,
    ) -> (Self, Option<SimulatedBoardHandle>) {
        let mut link = LinkSession::new(SerialPortOpener, settings, link_config);
        match link.open() {
            Ok(()) => {
                info!(port = %link.settings().path, "Lock controller connected");
                (
                    Self::Hardware(Cu16Controller::new(link, controller_config)),
                    None,
                )
            }
            Err(e) => {
                warn!(error = %e, "Lock controller unavailable, running with simulated board");
                let (board, handle) = SimulatedBoard::new();
                (Self::Simulated(board), Some(handle))
            }
        }
    }
}

impl LockBoard for AnyLockController {
    fn query_lock(&mut self, locker: LockerId) -> Option<LockStateSnapshot> {
        match self {
            Self::Hardware(device) => device.query_lock(locker),
            Self::Simulated(device) => device.query_lock(locker),
        }
    }

    fn query_all(&mut self) -> Option<LockStateSnapshot> {
        match self {
            Self::Hardware(device) => device.query_all(),
            Self::Simulated(device) => device.query_all(),
        }
    }

    fn release(&mut self, locker: LockerId) -> bool {
        match self {
            Self::Hardware(device) => device.release(locker),
            Self::Simulated(device) => device.release(locker),
        }
    }

    fn clear_busy(&mut self) {
        match self {
            Self::Hardware(device) => device.clear_busy(),
            Self::Simulated(device) => device.clear_busy(),
        }
    }

    fn lock_status(&mut self, locker: LockerId) -> LockStatus {
        match self {
            Self::Hardware(device) => device.lock_status(locker),
            Self::Simulated(device) => device.lock_status(locker),
        }
    }

    fn kind(&self) -> ControllerKind {
        match self {
            Self::Hardware(device) => LockBoard::kind(device),
            Self::Simulated(device) => device.kind(),
        }
    }

    fn shutdown(&mut self) {
        match self {
            Self::Hardware(device) => LockBoard::shutdown(device),
            Self::Simulated(device) => device.shutdown(),
        }
    }
}
