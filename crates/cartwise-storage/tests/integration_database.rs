//! Integration tests for the rental database: pooling, migrations, files on
//! disk and concurrent writers.

use std::sync::Arc;

use cartwise_core::{CartId, LockerId, NewRental, RentalStatus};
use cartwise_storage::{
    Database, DatabaseConfig, RentalRepository, SqliteRentalRepository, StorageError,
};
use chrono::{Duration, Utc};
use rstest::rstest;
use tokio::sync::Barrier;

fn rental(cart: u32, phone: &str) -> NewRental {
    NewRental::new(
        CartId::new(cart),
        phone,
        LockerId::new((cart % 16) as u8).unwrap(),
        Utc::now(),
        Duration::minutes(120),
    )
}

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let (tables,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='rentals'")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(tables, 1);

    db.close().await;
}

#[rstest]
#[case("idx_rentals_user_phone")]
#[case("idx_rentals_status")]
#[case("idx_rentals_cart_id")]
#[case("idx_rentals_open_cart")]
#[tokio::test]
async fn test_indexes_exist(#[case] index: &str) {
    let db = Database::in_memory().await.unwrap();

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name=?")
            .bind(index)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("rentals.db");
    let path = path.to_str().unwrap().to_string();

    let id = {
        let db = Database::new(DatabaseConfig::new(&path)).await.unwrap();
        let repo = SqliteRentalRepository::new(db.pool().clone());
        let id = repo.create_rental(&rental(4, "0504444444")).await.unwrap();
        db.close().await;
        id
    };

    let db = Database::new(DatabaseConfig::new(&path)).await.unwrap();
    let repo = SqliteRentalRepository::new(db.pool().clone());
    let stored = repo.get_rental(id).await.unwrap().unwrap();
    assert_eq!(stored.user_phone, "0504444444");
    assert_eq!(stored.status, RentalStatus::Active);
    db.close().await;
}

#[tokio::test]
async fn test_concurrent_creates_for_one_cart_admit_exactly_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rentals.db");
    let db = Database::new(DatabaseConfig::new(path.to_str().unwrap()))
        .await
        .unwrap();

    const TASKS: usize = 6;
    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = Vec::new();

    for i in 0..TASKS {
        let repo = SqliteRentalRepository::new(db.pool().clone());
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            repo.create_rental(&rental(7, &format!("05000000{i:02}"))).await
        }));
    }

    let results = futures::future::join_all(handles).await;
    let created = results
        .iter()
        .filter(|result| matches!(result, Ok(Ok(_))))
        .count();
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Ok(Err(StorageError::OpenRentalExists { .. }))))
        .count();

    assert_eq!(created, 1);
    assert_eq!(rejected, TASKS - 1);
    db.close().await;
}

#[tokio::test]
async fn test_history_is_newest_first_and_limited() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteRentalRepository::new(db.pool().clone());
    let start = Utc::now() - Duration::days(1);

    for hour in 0..4 {
        let new = NewRental::new(
            CartId::new(1),
            "0501111111",
            LockerId::new(0).unwrap(),
            start + Duration::hours(hour),
            Duration::minutes(30),
        );
        let id = repo.create_rental(&new).await.unwrap();
        let mut stored = repo.get_rental(id).await.unwrap().unwrap();
        stored
            .mark_returned(stored.start_time + Duration::minutes(10))
            .unwrap();
        repo.update_rental(&stored).await.unwrap();
    }
    repo.create_rental(&rental(2, "0502222222")).await.unwrap();

    let mine = repo.get_history(Some("0501111111"), 3).await.unwrap();
    assert_eq!(mine.len(), 3);
    assert!(mine.windows(2).all(|pair| pair[0].start_time >= pair[1].start_time));
    assert!(mine.iter().all(|r| r.status == RentalStatus::Returned));

    let everyone = repo.get_history(None, 100).await.unwrap();
    assert_eq!(everyone.len(), 5);
}

#[tokio::test]
async fn test_active_rental_lookup_by_phone_includes_overdue() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteRentalRepository::new(db.pool().clone());

    let new = NewRental::new(
        CartId::new(5),
        "0505555555",
        LockerId::new(4).unwrap(),
        Utc::now() - Duration::hours(3),
        Duration::minutes(120),
    );
    let id = repo.create_rental(&new).await.unwrap();
    let mut stored = repo.get_rental(id).await.unwrap().unwrap();
    assert!(stored.mark_overdue(Utc::now()).unwrap());
    repo.update_rental(&stored).await.unwrap();

    let found = repo
        .get_active_rental_by_phone("0505555555")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.status, RentalStatus::Overdue);
    assert!(repo.get_active_rental_by_phone("0500000000").await.unwrap().is_none());
}
