//! Command bytes understood by the KR-CU16 board.
//!
//! The command sits in the third byte of every frame:
//!
//! ```text
//! <STX> ADDR CMD [DATA...] <ETX> SUM
//!            ^^^
//! ```
//!
//! # Command Groups
//!
//! ## Status
//! - `GetStatus` (0x30): hook and presence planes, addressed to one locker
//! - `GetAllStatus` (0x32): same reply shape, covering all 16 lockers
//! - `ReturnSingleData` (0x35) / `ReturnAllData` (0x36): board-initiated reports
//!
//! ## Actuation
//! - `Unlock` (0x31), `UnlockAll` (0x33), `DelayedUnlock` (0x39)
//!
//! ## Timing
//! - `SetUnlockTime` (0x37)
//! - `ResetUnlockTime` (0x38): only ever sent as a busy-clear pulse after an
//!   unlock, never to change the board configuration
//!
//! # Examples
//!
//! ```
//! use cartwise_protocol::Command;
//!
//! let cmd = Command::try_from(0x31).unwrap();
//! assert_eq!(cmd, Command::Unlock);
//! assert_eq!(cmd.code(), 0x31);
//! assert!(Command::try_from(0x34).is_err());
//! ```

use cartwise_core::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command byte of a KR-CU16 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    GetStatus = 0x30,
    Unlock = 0x31,
    GetAllStatus = 0x32,
    UnlockAll = 0x33,
    ReturnSingleData = 0x35,
    ReturnAllData = 0x36,
    SetUnlockTime = 0x37,
    ResetUnlockTime = 0x38,
    DelayedUnlock = 0x39,
}

impl Command {
    /// Every defined command in code order.
    pub const ALL: [Command; 9] = [
        Command::GetStatus,
        Command::Unlock,
        Command::GetAllStatus,
        Command::UnlockAll,
        Command::ReturnSingleData,
        Command::ReturnAllData,
        Command::SetUnlockTime,
        Command::ResetUnlockTime,
        Command::DelayedUnlock,
    ];

    /// Wire byte for this command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the board answers this command with a four-plane status reply.
    pub fn expects_status_reply(self) -> bool {
        matches!(self, Command::GetStatus | Command::GetAllStatus)
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::GetStatus => "GetStatus",
            Command::Unlock => "Unlock",
            Command::GetAllStatus => "GetAllStatus",
            Command::UnlockAll => "UnlockAll",
            Command::ReturnSingleData => "ReturnSingleData",
            Command::ReturnAllData => "ReturnAllData",
            Command::SetUnlockTime => "SetUnlockTime",
            Command::ResetUnlockTime => "ResetUnlockTime",
            Command::DelayedUnlock => "DelayedUnlock",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.code() == value)
            .ok_or_else(|| FrameError::malformed(format!("unknown command byte {value:#04X}")))
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        cmd.code()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04X})", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x30, Command::GetStatus)]
    #[case(0x31, Command::Unlock)]
    #[case(0x32, Command::GetAllStatus)]
    #[case(0x33, Command::UnlockAll)]
    #[case(0x35, Command::ReturnSingleData)]
    #[case(0x36, Command::ReturnAllData)]
    #[case(0x37, Command::SetUnlockTime)]
    #[case(0x38, Command::ResetUnlockTime)]
    #[case(0x39, Command::DelayedUnlock)]
    fn test_command_codes(#[case] code: u8, #[case] expected: Command) {
        assert_eq!(Command::try_from(code).unwrap(), expected);
        assert_eq!(expected.code(), code);
    }

    #[rstest]
    #[case(0x00)]
    #[case(0x2F)]
    #[case(0x34)]
    #[case(0x3A)]
    #[case(0xFF)]
    fn test_unknown_command_is_malformed(#[case] code: u8) {
        assert!(matches!(
            Command::try_from(code),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[test]
    fn test_status_commands() {
        let status: Vec<Command> = Command::ALL
            .into_iter()
            .filter(|cmd| cmd.expects_status_reply())
            .collect();
        assert_eq!(status, vec![Command::GetStatus, Command::GetAllStatus]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::ResetUnlockTime.to_string(), "ResetUnlockTime (0x38)");
    }
}
