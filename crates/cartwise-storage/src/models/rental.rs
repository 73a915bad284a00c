use cartwise_core::{CartId, LockerId, RentalId, RentalRecord, RentalStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{StorageError, StorageResult};

/// Raw row of the `rentals` table.
///
/// Timestamps are stored as RFC 3339 UTC text with microsecond precision, so
/// string order equals time order inside SQL comparisons.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RentalRow {
    pub rental_id: i64,
    pub cart_id: i64,
    pub user_phone: String,
    pub locker_id: i64,
    pub start_time: String,
    pub expected_return: String,
    pub actual_return: Option<String>,
    pub status: String,
    pub notes: Option<String>,
}

impl TryFrom<RentalRow> for RentalRecord {
    type Error = StorageError;

    fn try_from(row: RentalRow) -> StorageResult<Self> {
        Ok(RentalRecord {
            id: RentalId::new(row.rental_id),
            cart_id: CartId::try_from(row.cart_id)?,
            user_phone: row.user_phone,
            locker_id: LockerId::try_from(row.locker_id)?,
            start_time: parse_timestamp(&row.start_time)?,
            expected_return: parse_timestamp(&row.expected_return)?,
            actual_return: row.actual_return.as_deref().map(parse_timestamp).transpose()?,
            status: row.status.parse::<RentalStatus>()?,
            notes: row.notes,
        })
    }
}

/// Format a timestamp the way the `rentals` table stores it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow(format!("Invalid timestamp {raw:?}: {e}")))
}

/// Aggregate counts over the rental history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RentalStatistics {
    /// Every rental ever created.
    pub total: i64,

    /// Rentals with status Active.
    pub active: i64,

    /// Open rentals past their deadline (flagged Overdue or not yet flagged).
    pub overdue: i64,

    /// Rentals closed as ReturnedLate.
    pub late_returns: i64,
}
