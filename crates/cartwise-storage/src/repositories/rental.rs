use std::future::Future;

use cartwise_core::{CartId, NewRental, RentalId, RentalRecord, RentalStatus};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::models::rental::{RentalRow, RentalStatistics, format_timestamp};

const RENTAL_COLUMNS: &str = "rental_id, cart_id, user_phone, locker_id, start_time, \
                              expected_return, actual_return, status, notes";

/// Repository trait for rental records.
///
/// Methods spell out `+ Send` on their futures so callers can drive them from
/// spawned tasks (the return monitor runs on its own task).
pub trait RentalRepository: Send + Sync {
    /// Store a new Active rental and return its id.
    ///
    /// Fails with `StorageError::OpenRentalExists` if the cart already has an
    /// Active or Overdue rental.
    fn create_rental(&self, rental: &NewRental) -> impl Future<Output = StorageResult<RentalId>> + Send;

    fn get_rental(&self, id: RentalId) -> impl Future<Output = StorageResult<Option<RentalRecord>>> + Send;

    /// Most recent open rental of a user.
    fn get_active_rental_by_phone(
        &self,
        phone: &str,
    ) -> impl Future<Output = StorageResult<Option<RentalRecord>>> + Send;

    /// The open rental of a cart.
    fn get_active_rental_by_cart(
        &self,
        cart_id: CartId,
    ) -> impl Future<Output = StorageResult<Option<RentalRecord>>> + Send;

    /// Overwrite a stored rental. `Ok(false)` if no row has that id.
    fn update_rental(&self, rental: &RentalRecord) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Open rentals whose deadline is before `now`, earliest deadline first.
    fn list_overdue(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StorageResult<Vec<RentalRecord>>> + Send;

    /// Active and Overdue rentals, oldest first.
    fn list_open(&self) -> impl Future<Output = StorageResult<Vec<RentalRecord>>> + Send;

    /// Newest-first history, optionally for one phone.
    fn get_history(
        &self,
        phone: Option<&str>,
        limit: u32,
    ) -> impl Future<Output = StorageResult<Vec<RentalRecord>>> + Send;

    fn statistics(&self, now: DateTime<Utc>) -> impl Future<Output = StorageResult<RentalStatistics>> + Send;
}

/// SQLite implementation of [`RentalRepository`].
#[derive(Debug, Clone)]
pub struct SqliteRentalRepository {
    pool: SqlitePool,
}

impl SqliteRentalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn into_records(rows: Vec<RentalRow>) -> StorageResult<Vec<RentalRecord>> {
    rows.into_iter().map(RentalRecord::try_from).collect()
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl RentalRepository for SqliteRentalRepository {
    async fn create_rental(&self, rental: &NewRental) -> StorageResult<RentalId> {
        let result = sqlx::query(
            r#"
            INSERT INTO rentals (
                cart_id, user_phone, locker_id,
                start_time, expected_return, status, notes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(i64::from(rental.cart_id.as_u32()))
        .bind(&rental.user_phone)
        .bind(i64::from(rental.locker_id.as_u8()))
        .bind(format_timestamp(rental.start_time))
        .bind(format_timestamp(rental.expected_return))
        .bind(RentalStatus::Active.as_str())
        .bind(&rental.notes)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::OpenRentalExists {
                    cart_id: rental.cart_id.as_u32(),
                }
            } else {
                StorageError::Database(e)
            }
        })?;

        let id = RentalId::new(result.last_insert_rowid());
        debug!(rental_id = %id, cart = %rental.cart_id, "Rental created");
        Ok(id)
    }

    async fn get_rental(&self, id: RentalId) -> StorageResult<Option<RentalRecord>> {
        let sql = format!("SELECT {RENTAL_COLUMNS} FROM rentals WHERE rental_id = ?");
        let row = sqlx::query_as::<_, RentalRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(RentalRecord::try_from).transpose()
    }

    async fn get_active_rental_by_phone(&self, phone: &str) -> StorageResult<Option<RentalRecord>> {
        let sql = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals \
             WHERE user_phone = ? AND status IN ('active', 'overdue') \
             ORDER BY start_time DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, RentalRow>(&sql)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RentalRecord::try_from).transpose()
    }

    async fn get_active_rental_by_cart(&self, cart_id: CartId) -> StorageResult<Option<RentalRecord>> {
        let sql = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals \
             WHERE cart_id = ? AND status IN ('active', 'overdue') \
             ORDER BY start_time DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, RentalRow>(&sql)
            .bind(i64::from(cart_id.as_u32()))
            .fetch_optional(&self.pool)
            .await?;
        row.map(RentalRecord::try_from).transpose()
    }

    async fn update_rental(&self, rental: &RentalRecord) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rentals
            SET cart_id = ?, user_phone = ?, locker_id = ?,
                start_time = ?, expected_return = ?, actual_return = ?,
                status = ?, notes = ?
            WHERE rental_id = ?
            "#,
        )
        .bind(i64::from(rental.cart_id.as_u32()))
        .bind(&rental.user_phone)
        .bind(i64::from(rental.locker_id.as_u8()))
        .bind(format_timestamp(rental.start_time))
        .bind(format_timestamp(rental.expected_return))
        .bind(rental.actual_return.map(format_timestamp))
        .bind(rental.status.as_str())
        .bind(&rental.notes)
        .bind(rental.id.as_i64())
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        debug!(rental_id = %rental.id, status = %rental.status, updated, "Rental updated");
        Ok(updated)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> StorageResult<Vec<RentalRecord>> {
        let sql = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals \
             WHERE status IN ('active', 'overdue') AND expected_return < ? \
             ORDER BY expected_return ASC"
        );
        let rows = sqlx::query_as::<_, RentalRow>(&sql)
            .bind(format_timestamp(now))
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn list_open(&self) -> StorageResult<Vec<RentalRecord>> {
        let sql = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals \
             WHERE status IN ('active', 'overdue') \
             ORDER BY start_time ASC, rental_id ASC"
        );
        let rows = sqlx::query_as::<_, RentalRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn get_history(&self, phone: Option<&str>, limit: u32) -> StorageResult<Vec<RentalRecord>> {
        let rows = match phone {
            Some(phone) => {
                let sql = format!(
                    "SELECT {RENTAL_COLUMNS} FROM rentals WHERE user_phone = ? \
                     ORDER BY start_time DESC, rental_id DESC LIMIT ?"
                );
                sqlx::query_as::<_, RentalRow>(&sql)
                    .bind(phone)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {RENTAL_COLUMNS} FROM rentals \
                     ORDER BY start_time DESC, rental_id DESC LIMIT ?"
                );
                sqlx::query_as::<_, RentalRow>(&sql)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        into_records(rows)
    }

    async fn statistics(&self, now: DateTime<Utc>) -> StorageResult<RentalStatistics> {
        let (total, active, overdue, late_returns): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(status = 'active'), 0),
                COALESCE(SUM(status = 'overdue'
                             OR (status = 'active' AND expected_return < ?)), 0),
                COALESCE(SUM(status = 'returned_late'), 0)
            FROM rentals
            "#,
        )
        .bind(format_timestamp(now))
        .fetch_one(&self.pool)
        .await?;

        Ok(RentalStatistics {
            total,
            active,
            overdue,
            late_returns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use cartwise_core::LockerId;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    fn new_rental(cart: u32, phone: &str, start: DateTime<Utc>) -> NewRental {
        NewRental::new(
            CartId::new(cart),
            phone,
            LockerId::new((cart - 1) as u8).unwrap(),
            start,
            Duration::minutes(120),
        )
    }

    async fn repo() -> SqliteRentalRepository {
        let db = Database::in_memory().await.unwrap();
        SqliteRentalRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo().await;
        let id = repo
            .create_rental(&new_rental(3, "0501234567", t0()).with_notes("first"))
            .await
            .unwrap();

        let stored = repo.get_rental(id).await.unwrap().unwrap();
        assert_eq!(stored.cart_id, CartId::new(3));
        assert_eq!(stored.status, RentalStatus::Active);
        assert_eq!(stored.expected_return, t0() + Duration::minutes(120));
        assert_eq!(stored.notes.as_deref(), Some("first"));
        assert!(repo.get_rental(RentalId::new(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_open_rental_for_cart_rejected() {
        let repo = repo().await;
        repo.create_rental(&new_rental(1, "0501111111", t0())).await.unwrap();

        let error = repo
            .create_rental(&new_rental(1, "0502222222", t0()))
            .await
            .unwrap_err();
        assert!(matches!(error, StorageError::OpenRentalExists { cart_id: 1 }));
    }

    #[tokio::test]
    async fn test_closed_rental_frees_cart() {
        let repo = repo().await;
        let id = repo.create_rental(&new_rental(1, "0501111111", t0())).await.unwrap();

        let mut rental = repo.get_rental(id).await.unwrap().unwrap();
        rental.mark_returned(t0() + Duration::minutes(5)).unwrap();
        assert!(repo.update_rental(&rental).await.unwrap());

        assert!(repo.get_active_rental_by_cart(CartId::new(1)).await.unwrap().is_none());
        repo.create_rental(&new_rental(1, "0502222222", t0() + Duration::hours(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_unknown_rental_reports_false() {
        let repo = repo().await;
        let ghost = RentalRecord::from_new(RentalId::new(77), new_rental(2, "0500000000", t0()));
        assert!(!repo.update_rental(&ghost).await.unwrap());
    }

    #[tokio::test]
    async fn test_overdue_listing_and_statistics() {
        let repo = repo().await;
        let now = t0() + Duration::hours(3);

        // due at t0+2h: past deadline
        repo.create_rental(&new_rental(1, "0501111111", t0())).await.unwrap();
        // due at t0+4h: not yet due
        repo.create_rental(&new_rental(2, "0502222222", t0() + Duration::hours(2)))
            .await
            .unwrap();
        // returned late
        let late = repo.create_rental(&new_rental(3, "0503333333", t0())).await.unwrap();
        let mut rental = repo.get_rental(late).await.unwrap().unwrap();
        rental.mark_returned(now).unwrap();
        repo.update_rental(&rental).await.unwrap();

        let overdue = repo.list_overdue(now).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].cart_id, CartId::new(1));

        let stats = repo.statistics(now).await.unwrap();
        assert_eq!(
            stats,
            RentalStatistics {
                total: 3,
                active: 2,
                overdue: 1,
                late_returns: 1,
            }
        );
        assert_eq!(repo.list_open().await.unwrap().len(), 2);
    }
}
