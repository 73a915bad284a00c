use crate::commands::Command;
use bytes::{BufMut, Bytes, BytesMut};
use cartwise_core::{FrameError, LockerId, constants::*};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Low byte of the sum of every byte in `bytes`.
///
/// # Examples
/// ```
/// use cartwise_protocol::checksum;
///
/// assert_eq!(checksum(&[0x02, 0x03, 0x31, 0x03]), 0x39);
/// assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
/// ```
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Target of a frame: one locker on the board or every board on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    Locker(LockerId),
    Broadcast,
}

impl Address {
    pub fn as_u8(self) -> u8 {
        match self {
            Address::Locker(id) => id.as_u8(),
            Address::Broadcast => BROADCAST_ADDRESS,
        }
    }

    pub fn locker(self) -> Option<LockerId> {
        match self {
            Address::Locker(id) => Some(id),
            Address::Broadcast => None,
        }
    }
}

impl From<LockerId> for Address {
    fn from(id: LockerId) -> Self {
        Address::Locker(id)
    }
}

impl TryFrom<u8> for Address {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value == BROADCAST_ADDRESS {
            return Ok(Address::Broadcast);
        }
        LockerId::new(value)
            .map(Address::Locker)
            .map_err(|_| FrameError::malformed(format!("invalid address byte {value:#04X}")))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Locker(id) => write!(f, "locker {id}"),
            Address::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// One KR-CU16 frame.
///
/// # Wire Format
/// ```text
/// <STX> ADDR CMD [DATA 0..4] <ETX> SUM
/// ```
/// `SUM` is the low byte of the sum of every preceding byte, markers included.
///
/// # Examples
/// ```
/// use cartwise_core::LockerId;
/// use cartwise_protocol::{Address, Command, Frame};
///
/// let frame = Frame::request(Address::Locker(LockerId::new(3).unwrap()), Command::Unlock);
/// let bytes = frame.encode();
/// assert_eq!(&bytes[..], &[0x02, 0x03, 0x31, 0x03, 0x39]);
///
/// let decoded = Frame::decode(&bytes).unwrap();
/// assert_eq!(decoded, frame);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    address: Address,
    command: Command,
    payload: Bytes,
}

impl Frame {
    /// Build a frame carrying `payload`.
    ///
    /// # Errors
    /// Returns `FrameError::Malformed` if the payload exceeds four bytes.
    pub fn new(
        address: Address,
        command: Command,
        payload: impl Into<Bytes>,
    ) -> Result<Self, FrameError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::malformed(format!(
                "payload of {} bytes exceeds {MAX_PAYLOAD_LEN}",
                payload.len()
            )));
        }
        Ok(Frame {
            address,
            command,
            payload,
        })
    }

    /// Build a frame without payload.
    pub fn request(address: Address, command: Command) -> Self {
        Frame {
            address,
            command,
            payload: Bytes::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Length of this frame on the wire.
    pub fn wire_len(&self) -> usize {
        MIN_FRAME_LEN + self.payload.len()
    }

    /// Append the wire form of this frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let start = dst.len();
        dst.reserve(self.wire_len());
        dst.put_u8(STX);
        dst.put_u8(self.address.as_u8());
        dst.put_u8(self.command.code());
        dst.put_slice(&self.payload);
        dst.put_u8(ETX);
        let sum = checksum(&dst[start..]);
        dst.put_u8(sum);
    }

    /// Wire form of this frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Decode exactly one frame occupying all of `bytes`.
    ///
    /// Checks run in this order: length, checksum, markers, address, command.
    /// A frame whose trailing byte disagrees with the computed sum is always a
    /// `ChecksumMismatch`, whatever else is wrong with it.
    ///
    /// # Errors
    /// - `FrameError::Malformed` for a frame shorter than five bytes, longer
    ///   than nine, with wrong STX/ETX markers, an invalid address byte or an
    ///   unknown command byte
    /// - `FrameError::ChecksumMismatch` when the trailing byte is wrong
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(FrameError::malformed(format!(
                "frame of {} bytes is shorter than {MIN_FRAME_LEN}",
                bytes.len()
            )));
        }
        if bytes.len() > MAX_FRAME_LEN {
            return Err(FrameError::malformed(format!(
                "frame of {} bytes is longer than {MAX_FRAME_LEN}",
                bytes.len()
            )));
        }

        let (body, sum) = bytes.split_at(bytes.len() - 1);
        let expected = checksum(body);
        if sum[0] != expected {
            return Err(FrameError::ChecksumMismatch {
                expected,
                actual: sum[0],
            });
        }

        if body[0] != STX {
            return Err(FrameError::malformed(format!(
                "expected STX, found {:#04X}",
                body[0]
            )));
        }
        let etx = body[body.len() - 1];
        if etx != ETX {
            return Err(FrameError::malformed(format!(
                "expected ETX, found {etx:#04X}"
            )));
        }

        let address = Address::try_from(body[1])?;
        let command = Command::try_from(body[2])?;
        let payload = Bytes::copy_from_slice(&body[3..body.len() - 1]);

        Ok(Frame {
            address,
            command,
            payload,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.command, self.address)?;
        if !self.payload.is_empty() {
            write!(f, " [{}]", hex(&self.payload))?;
        }
        Ok(())
    }
}

/// Upper-case hex rendering used when logging raw bus traffic.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn locker(id: u8) -> Address {
        Address::Locker(LockerId::new(id).unwrap())
    }

    #[test]
    fn test_encode_unlock_locker_3() {
        let frame = Frame::request(locker(3), Command::Unlock);
        assert_eq!(&frame.encode()[..], &[0x02, 0x03, 0x31, 0x03, 0x39]);
    }

    #[test]
    fn test_encode_busy_clear_pulse() {
        let frame = Frame::request(locker(0), Command::ResetUnlockTime);
        assert_eq!(&frame.encode()[..], &[0x02, 0x00, 0x38, 0x03, 0x3D]);
    }

    #[test]
    fn test_encode_broadcast_status() {
        let frame = Frame::request(Address::Broadcast, Command::GetAllStatus);
        let bytes = frame.encode();
        assert_eq!(bytes[1], 0xF0);
        assert_eq!(bytes[4], checksum(&bytes[..4]));
    }

    #[test]
    fn test_decode_status_reply() {
        let bytes = [0x02, 0x00, 0x30, 0x08, 0x00, 0x08, 0x00, 0x03, 0x45];
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.address(), locker(0));
        assert_eq!(frame.command(), Command::GetStatus);
        assert_eq!(frame.payload(), &[0x08, 0x00, 0x08, 0x00]);
    }

    #[test]
    fn test_payload_limit() {
        assert!(Frame::new(locker(1), Command::SetUnlockTime, vec![0u8; 4]).is_ok());
        assert!(matches!(
            Frame::new(locker(1), Command::SetUnlockTime, vec![0u8; 5]),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[rstest]
    #[case(&[][..])]
    #[case(&[0x02][..])]
    #[case(&[0x02, 0x00, 0x30, 0x03][..])]
    fn test_decode_too_short(#[case] bytes: &[u8]) {
        assert!(matches!(
            Frame::decode(bytes),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_too_long() {
        let mut bytes = vec![0x02, 0x00, 0x30, 0, 0, 0, 0, 0, 0x03];
        bytes.push(checksum(&bytes));
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let bytes = [0x02, 0x03, 0x31, 0x03, 0x3A];
        assert_eq!(
            Frame::decode(&bytes),
            Err(FrameError::ChecksumMismatch {
                expected: 0x39,
                actual: 0x3A
            })
        );
    }

    #[rstest]
    #[case::bad_stx(&[0x04, 0x03, 0x31, 0x03][..])]
    #[case::bad_etx(&[0x02, 0x03, 0x31, 0x04][..])]
    #[case::bad_address(&[0x02, 0x10, 0x31, 0x03][..])]
    #[case::bad_command(&[0x02, 0x03, 0x34, 0x03][..])]
    fn test_decode_malformed_with_valid_checksum(#[case] body: &[u8]) {
        let mut bytes = body.to_vec();
        bytes.push(checksum(body));
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[test]
    fn test_address_bytes() {
        assert_eq!(Address::try_from(0xF0).unwrap(), Address::Broadcast);
        assert_eq!(Address::try_from(0x0F).unwrap(), locker(15));
        assert!(Address::try_from(0x10).is_err());
        assert_eq!(Address::Broadcast.locker(), None);
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x02, 0xF0, 0x32]), "02 F0 32");
    }
}
