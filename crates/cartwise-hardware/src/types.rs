//! Small value types shared by controller implementations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simplified latch state of one locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Locked,
    Unlocked,
    /// The board did not answer.
    Unknown,
}

/// Which controller variant was selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// A KR-CU16 board on a serial port.
    Hardware,
    /// In-memory board used when no port is available.
    Simulated,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}
