use crate::{Result, constants::MAX_LOCKER_ID, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a bay on a controller board (0-15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u8")]
pub struct LockerId(u8);

impl LockerId {
    /// First bay on the board. Also the board's own bus address.
    pub const FIRST: LockerId = LockerId(0);

    /// Create a new locker id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidLockerId` if the id is outside 0-15.
    pub fn new(id: u8) -> Result<Self> {
        if id > MAX_LOCKER_ID {
            return Err(Error::InvalidLockerId(id.into()));
        }
        Ok(LockerId(id))
    }

    /// Get the raw locker index.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Index of the 8-bit sensor plane holding this locker (0 or 1).
    #[must_use]
    pub fn plane(&self) -> usize {
        usize::from(self.0 / 8)
    }

    /// Bit position of this locker inside its plane.
    #[must_use]
    pub fn bit(&self) -> u8 {
        self.0 % 8
    }

    /// Every locker on a board, in address order.
    pub fn all() -> impl Iterator<Item = LockerId> {
        (0..=MAX_LOCKER_ID).map(LockerId)
    }
}

impl fmt::Display for LockerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LockerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u16 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidRecord(format!("Invalid locker id: {s}")))?;
        LockerId::try_from(id)
    }
}

impl TryFrom<u16> for LockerId {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        let id = u8::try_from(value).map_err(|_| Error::InvalidLockerId(value))?;
        LockerId::new(id)
    }
}

impl TryFrom<i64> for LockerId {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        let id = u16::try_from(value)
            .map_err(|_| Error::InvalidRecord(format!("Invalid locker id: {value}")))?;
        LockerId::try_from(id)
    }
}

impl From<LockerId> for u8 {
    fn from(id: LockerId) -> Self {
        id.0
    }
}

/// Identifier of a physical cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(u32);

impl CartId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        CartId(id)
    }

    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CartId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for CartId {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u32::try_from(value)
            .map(CartId)
            .map_err(|_| Error::InvalidRecord(format!("Invalid cart id: {value}")))
    }
}

/// Identifier assigned to a rental by the rental store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RentalId(i64);

impl RentalId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        RentalId(id)
    }

    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RentalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
