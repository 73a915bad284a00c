//! Decoded sensor state of one board at one instant.
//!
//! A status reply carries four 8-bit planes:
//!
//! | Payload byte | Plane                 |
//! |--------------|-----------------------|
//! | 0            | hook closed, 0-7      |
//! | 1            | hook closed, 8-15     |
//! | 2            | infrared presence, 0-7  |
//! | 3            | infrared presence, 8-15 |
//!
//! Locker `n` is bit `n mod 8` of the plane for its group.

use crate::{
    commands::Command,
    frame::{Address, Frame},
};
use cartwise_core::{FrameError, LockerId, constants::STATUS_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};

const HOOKS_LO: usize = 0;
const INFRARED_LO: usize = 2;

/// Immutable hook and presence planes for 16 lockers.
///
/// # Examples
/// ```
/// use cartwise_core::LockerId;
/// use cartwise_protocol::LockStateSnapshot;
///
/// let snapshot = LockStateSnapshot::from_planes(0b0000_1000, 0, 0b0000_1000, 0);
/// let locker = LockerId::new(3).unwrap();
/// assert!(snapshot.is_hook_closed(locker));
/// assert!(snapshot.has_presence(locker));
/// assert!(snapshot.is_returned(locker));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockStateSnapshot {
    planes: [u8; STATUS_PAYLOAD_LEN],
}

impl LockStateSnapshot {
    pub fn from_planes(hooks_lo: u8, hooks_hi: u8, infrared_lo: u8, infrared_hi: u8) -> Self {
        Self {
            planes: [hooks_lo, hooks_hi, infrared_lo, infrared_hi],
        }
    }

    /// Decode the four-byte payload of a status reply.
    ///
    /// # Errors
    /// Returns `FrameError::Malformed` unless the payload is exactly four bytes.
    pub fn from_payload(payload: &[u8]) -> Result<Self, FrameError> {
        let planes: [u8; STATUS_PAYLOAD_LEN] = payload.try_into().map_err(|_| {
            FrameError::malformed(format!(
                "status payload has {} bytes, expected {STATUS_PAYLOAD_LEN}",
                payload.len()
            ))
        })?;
        Ok(Self { planes })
    }

    /// Decode a status reply frame.
    ///
    /// # Errors
    /// Returns `FrameError::Malformed` for a non-status command or a payload
    /// that is not four bytes long.
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        if !frame.command().expects_status_reply() {
            return Err(FrameError::malformed(format!(
                "{} does not carry lock state",
                frame.command()
            )));
        }
        Self::from_payload(frame.payload())
    }

    /// Build a status reply frame carrying this snapshot.
    pub fn to_frame(&self, address: Address, command: Command) -> Result<Frame, FrameError> {
        Frame::new(address, command, self.planes.to_vec())
    }

    pub fn planes(&self) -> [u8; STATUS_PAYLOAD_LEN] {
        self.planes
    }

    fn bit(&self, base: usize, locker: LockerId) -> bool {
        (self.planes[base + locker.plane()] >> locker.bit()) & 1 == 1
    }

    fn with_bit(mut self, base: usize, locker: LockerId, on: bool) -> Self {
        let mask = 1u8 << locker.bit();
        let plane = &mut self.planes[base + locker.plane()];
        if on {
            *plane |= mask;
        } else {
            *plane &= !mask;
        }
        self
    }

    pub fn is_hook_closed(&self, locker: LockerId) -> bool {
        self.bit(HOOKS_LO, locker)
    }

    pub fn has_presence(&self, locker: LockerId) -> bool {
        self.bit(INFRARED_LO, locker)
    }

    /// A cart counts as returned only when it is inside the bay and latched.
    /// Presence without a closed hook is an inserted but unlatched cart.
    pub fn is_returned(&self, locker: LockerId) -> bool {
        self.is_hook_closed(locker) && self.has_presence(locker)
    }

    /// Copy of this snapshot with one locker's hook bit changed.
    pub fn with_hook(self, locker: LockerId, closed: bool) -> Self {
        self.with_bit(HOOKS_LO, locker, closed)
    }

    /// Copy of this snapshot with one locker's presence bit changed.
    pub fn with_presence(self, locker: LockerId, present: bool) -> Self {
        self.with_bit(INFRARED_LO, locker, present)
    }

    /// Hook-closed bits for all 16 lockers, locker 0 in bit 0.
    pub fn hooks(&self) -> u16 {
        u16::from_le_bytes([self.planes[0], self.planes[1]])
    }

    /// Presence bits for all 16 lockers, locker 0 in bit 0.
    pub fn presence(&self) -> u16 {
        u16::from_le_bytes([self.planes[2], self.planes[3]])
    }

    /// Lockers currently holding a latched cart.
    pub fn returned_lockers(&self) -> impl Iterator<Item = LockerId> + '_ {
        LockerId::all().filter(|id| self.is_returned(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(n: u8) -> LockerId {
        LockerId::new(n).unwrap()
    }

    #[rstest]
    #[case(false, false, false)]
    #[case(true, false, false)]
    #[case(false, true, false)]
    #[case(true, true, true)]
    fn test_returned_requires_hook_and_presence(
        #[case] hook: bool,
        #[case] presence: bool,
        #[case] returned: bool,
    ) {
        for n in [0, 7, 8, 15] {
            let snapshot = LockStateSnapshot::default()
                .with_hook(id(n), hook)
                .with_presence(id(n), presence);
            assert_eq!(snapshot.is_returned(id(n)), returned, "locker {n}");
        }
    }

    #[test]
    fn test_high_group_reads_second_plane() {
        let snapshot = LockStateSnapshot::from_planes(0x00, 0b0000_0010, 0x00, 0b0000_0010);
        assert!(snapshot.is_returned(id(9)));
        assert!(!snapshot.is_returned(id(1)));
        assert_eq!(snapshot.returned_lockers().collect::<Vec<_>>(), vec![id(9)]);
    }

    #[test]
    fn test_payload_length_enforced() {
        assert!(LockStateSnapshot::from_payload(&[0, 0, 0]).is_err());
        assert!(LockStateSnapshot::from_payload(&[0, 0, 0, 0, 0]).is_err());
        assert!(LockStateSnapshot::from_payload(&[1, 2, 3, 4]).is_ok());
    }

    #[test]
    fn test_frame_round_trip() {
        let snapshot = LockStateSnapshot::default()
            .with_hook(id(3), true)
            .with_presence(id(3), true);
        let frame = snapshot
            .to_frame(Address::Locker(id(0)), Command::GetAllStatus)
            .unwrap();
        assert_eq!(LockStateSnapshot::from_frame(&frame).unwrap(), snapshot);
    }

    #[test]
    fn test_non_status_frame_rejected() {
        let frame = Frame::request(Address::Locker(id(0)), Command::Unlock);
        assert!(LockStateSnapshot::from_frame(&frame).is_err());
    }

    #[test]
    fn test_bit_views() {
        let snapshot = LockStateSnapshot::from_planes(0x01, 0x80, 0xFF, 0x00);
        assert_eq!(snapshot.hooks(), 0x8001);
        assert_eq!(snapshot.presence(), 0x00FF);
    }
}
