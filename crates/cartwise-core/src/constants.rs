//! Core constants for the KR-CU16 lock-controller protocol and the rental loop.
//!
//! Every frame on the RS-485 bus has the same shape:
//!
//! ```text
//! <STX> ADDR CMD [DATA...] <ETX> SUM
//! ```
//!
//! Where:
//! - `<STX>` - Start of frame marker (0x02)
//! - `ADDR` - Locker index (0x00-0x0F) or the broadcast marker (0xF0)
//! - `CMD` - Command byte (0x30-0x39)
//! - `DATA` - Zero to four payload bytes
//! - `<ETX>` - End of frame marker (0x03)
//! - `SUM` - Low byte of the sum of every preceding byte
//!
//! # Usage
//!
//! ```
//! use cartwise_core::constants::*;
//!
//! let body = [STX, 0x03, 0x31, ETX];
//! let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
//! assert_eq!(sum, 0x39);
//! assert!(body.len() + 1 >= MIN_FRAME_LEN);
//! ```
//!
//! # Protocol Compliance
//!
//! The byte values below must match the controller board bit for bit.
//! Timing values are defaults only and can be overridden through configuration.

// ============================================================================
// Framing
// ============================================================================

/// Start of frame marker.
pub const STX: u8 = 0x02;

/// End of frame marker (precedes the checksum byte).
pub const ETX: u8 = 0x03;

/// Address byte used for board-wide queries across the bus.
pub const BROADCAST_ADDRESS: u8 = 0xF0;

/// Smallest valid frame: STX, ADDR, CMD, ETX, SUM.
pub const MIN_FRAME_LEN: usize = 5;

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD_LEN: usize = 4;

/// Largest valid frame: the minimum plus a full payload.
pub const MAX_FRAME_LEN: usize = MIN_FRAME_LEN + MAX_PAYLOAD_LEN;

/// Payload length of a lock status reply (four 8-bit planes).
pub const STATUS_PAYLOAD_LEN: usize = 4;

/// Length of a complete lock status reply on the wire.
pub const STATUS_RESPONSE_LEN: usize = MIN_FRAME_LEN + STATUS_PAYLOAD_LEN;

// ============================================================================
// Board Geometry
// ============================================================================

/// Number of lockers a single board drives.
pub const LOCKERS_PER_BOARD: u8 = 16;

/// Highest valid locker index on a board.
pub const MAX_LOCKER_ID: u8 = LOCKERS_PER_BOARD - 1;

/// Lockers covered by one 8-bit sensor plane.
pub const LOCKERS_PER_PLANE: u8 = 8;

// ============================================================================
// Serial Link Defaults
// ============================================================================

/// Baud rate used when nothing is configured.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Factory baud rate of a fresh KR-CU16 board.
pub const FACTORY_BAUD_RATE: u32 = 19200;

/// Baud rates tried, in order, by automatic rate detection.
pub const COMMON_BAUD_RATES: [u32; 4] = [19200, 9600, 38400, 115200];

/// Fixed read timeout for one response (milliseconds).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Attempts per transaction before giving up with a timeout.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base settle delay between write and read (milliseconds).
pub const SETTLE_BASE_MS: u64 = 100;

/// Additional settle delay per retry attempt (milliseconds).
pub const SETTLE_STEP_MS: u64 = 50;

/// Delay between closing and reopening a frozen port (milliseconds).
pub const REOPEN_DELAY_MS: u64 = 200;

/// Delay after an unlock before the busy-clear pulse (milliseconds).
pub const BUSY_CLEAR_DELAY_MS: u64 = 100;

// ============================================================================
// Rental Loop Defaults
// ============================================================================

/// Seconds between two reconciliation ticks.
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 5;

/// Length of a rental when the caller does not say otherwise.
pub const DEFAULT_RENTAL_DURATION_MINUTES: i64 = 120;

/// Hard cap for a single controller call made from a request path (milliseconds).
///
/// Above two worst-case transactions at the default link settings plus the
/// busy-clear delay (10 200 ms).
pub const DEFAULT_REQUEST_CAP_MS: u64 = 12_000;

/// Carts seeded into the cart table on a fresh start.
pub const DEFAULT_CART_COUNT: u8 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bounds() {
        assert_eq!(MIN_FRAME_LEN, 5);
        assert_eq!(MAX_FRAME_LEN, 9);
        assert_eq!(STATUS_RESPONSE_LEN, 9);
    }

    #[test]
    fn test_board_geometry() {
        assert_eq!(MAX_LOCKER_ID, 15);
        assert_eq!(LOCKERS_PER_BOARD / LOCKERS_PER_PLANE, 2);
        assert!(BROADCAST_ADDRESS > MAX_LOCKER_ID);
    }
}
