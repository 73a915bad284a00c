use thiserror::Error;

/// Decode-time rejection of a lock-controller frame.
///
/// Always recoverable: the caller discards the offending bytes and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed frame: {reason}")]
    Malformed { reason: String },

    #[error("Checksum mismatch: expected {expected:#04X}, got {actual:#04X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

impl FrameError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Invalid locker id: {0} (expected 0-15)")]
    InvalidLockerId(u16),

    // Domain errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    // Stream errors from a `Framed` transport using `Cu16Codec`
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
