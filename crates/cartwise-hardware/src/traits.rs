//! Controller trait shared by the real board and the simulated one.
//!
//! Methods are blocking: the serial driver is synchronous and every board is
//! owned by one dedicated thread (see [`crate::actor`]). Async callers go
//! through [`ControllerHandle`](crate::actor::ControllerHandle).

use cartwise_core::LockerId;
use cartwise_protocol::LockStateSnapshot;

use crate::types::{ControllerKind, LockStatus};

/// A board of up to 16 lockers with hook and presence sensors.
///
/// # Contract
///
/// - Queries return `None` when the board does not answer; they never fail.
/// - `release` returns `true` once the command was transmitted, whether or
///   not the board acknowledged it.
/// - `clear_busy` runs after every `release`; until it does the board may
///   ignore further commands.
pub trait LockBoard: Send {
    /// Status query addressed to one locker.
    fn query_lock(&mut self, locker: LockerId) -> Option<LockStateSnapshot>;

    /// Board-wide status query covering all 16 lockers.
    fn query_all(&mut self) -> Option<LockStateSnapshot>;

    /// Send the unlock command for `locker`, nothing else.
    fn release(&mut self, locker: LockerId) -> bool;

    /// Put the board back into a state where it accepts commands.
    fn clear_busy(&mut self) {}

    /// Release the latch of `locker`, then clear the busy state.
    fn unlock(&mut self, locker: LockerId) -> bool {
        let sent = self.release(locker);
        self.clear_busy();
        sent
    }

    /// Whether `locker` holds a latched cart.
    fn is_returned(&self, locker: LockerId, snapshot: &LockStateSnapshot) -> bool {
        snapshot.is_returned(locker)
    }

    /// Latch state of one locker.
    fn lock_status(&mut self, locker: LockerId) -> LockStatus {
        match self.query_lock(locker) {
            Some(snapshot) if snapshot.is_hook_closed(locker) => LockStatus::Locked,
            Some(_) => LockStatus::Unlocked,
            None => LockStatus::Unknown,
        }
    }

    fn kind(&self) -> ControllerKind;

    /// Release any underlying resources. Called once by the owner thread on exit.
    fn shutdown(&mut self) {}
}
