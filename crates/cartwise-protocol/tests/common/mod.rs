//! Common test utilities for protocol integration tests.
//!
//! Creation helpers (`locker`, `status_reply`) build frames with sensible
//! defaults; assertion helpers check a decoded reply in one call.

#![allow(dead_code)]

use cartwise_core::LockerId;
use cartwise_protocol::{Address, Command, Frame, LockStateSnapshot};

/// Address of a single locker. Panics on an out-of-range id.
pub fn locker(id: u8) -> Address {
    Address::Locker(LockerId::new(id).unwrap())
}

/// Status reply as the board sends it for `command`, addressed from locker 0.
pub fn status_reply(command: Command, snapshot: LockStateSnapshot) -> Frame {
    snapshot.to_frame(locker(0), command).unwrap()
}

/// Snapshot in which every listed locker holds a latched cart.
pub fn docked(lockers: &[u8]) -> LockStateSnapshot {
    lockers.iter().fold(LockStateSnapshot::default(), |snapshot, id| {
        let id = LockerId::new(*id).unwrap();
        snapshot.with_hook(id, true).with_presence(id, true)
    })
}

/// Assert that `frame` is a status reply whose returned lockers are exactly `expected`.
pub fn assert_returned_lockers(frame: &Frame, expected: &[u8]) {
    let snapshot = LockStateSnapshot::from_frame(frame).unwrap();
    let returned: Vec<u8> = snapshot.returned_lockers().map(|id| id.as_u8()).collect();
    assert_eq!(returned, expected, "returned lockers in {frame}");
}
