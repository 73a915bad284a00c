//! Mock serial wire for testing without an RS-485 adapter.
//!
//! [`MockOpener`] plugs into a [`LinkSession`](crate::link::LinkSession) in
//! place of the real port; the paired [`MockWire`] scripts what the "board"
//! does and records what the host sent.

pub mod wire;

// Re-export commonly used types
pub use wire::{MockOpener, MockPort, MockWire};
