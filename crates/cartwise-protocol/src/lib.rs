//! Wire protocol for the KR-CU16 lock-controller board.
//!
//! - [`Command`]: command byte set
//! - [`Frame`]: one addressed frame with encode/decode and checksum
//! - [`LockStateSnapshot`]: decoded hook and presence planes of a status reply
//! - [`Cu16Codec`]: tokio-util codec splitting a byte stream into frames

pub mod codec;
pub mod commands;
pub mod frame;
pub mod snapshot;

pub use codec::Cu16Codec;
pub use commands::Command;
pub use frame::{Address, Frame, checksum, hex};
pub use snapshot::LockStateSnapshot;
