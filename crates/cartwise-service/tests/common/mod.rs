//! Shared fixtures: an in-memory store, a simulated board behind a real
//! controller thread, and a small cart table.

#![allow(dead_code)]

use std::time::Duration;

use cartwise_core::{CartId, LockerId, NewRental, RentalId, RentalRecord};
use cartwise_hardware::{ControllerHandle, LockBoard, SimulatedBoard, SimulatedBoardHandle};
use cartwise_service::{RentalService, ReturnMonitor, Stores};
use cartwise_storage::{Cart, CartTable, Database, RentalRepository, SqliteRentalRepository};
use chrono::{DateTime, Utc};

pub type Repo = SqliteRentalRepository;

pub struct Station {
    pub stores: Stores<Repo>,
    pub sensors: SimulatedBoardHandle,
    pub controller: ControllerHandle,
    // Keeps the single in-memory connection alive.
    pub database: Database,
}

impl Station {
    /// Carts 1..=3 parked in lockers 1..=3.
    pub async fn new() -> Self {
        Self::with_carts(parked_carts().await).await
    }

    pub async fn with_carts(carts: CartTable) -> Self {
        let (board, sensors) = SimulatedBoard::new();
        let controller = ControllerHandle::spawn(board).unwrap();
        Self::with_controller(carts, controller, sensors).await
    }

    /// Any board behind a handle with the given request cap; `sensors` are
    /// whatever simulated sensors the board reads, if any.
    pub async fn with_board(
        carts: CartTable,
        board: impl LockBoard + 'static,
        sensors: SimulatedBoardHandle,
        request_cap: Duration,
    ) -> Self {
        let controller = ControllerHandle::spawn_with_cap(board, request_cap).unwrap();
        Self::with_controller(carts, controller, sensors).await
    }

    async fn with_controller(
        carts: CartTable,
        controller: ControllerHandle,
        sensors: SimulatedBoardHandle,
    ) -> Self {
        let database = Database::in_memory().await.unwrap();
        let rentals = SqliteRentalRepository::new(database.pool().clone());
        Self {
            stores: Stores::new(rentals, carts),
            sensors,
            controller,
            database,
        }
    }

    pub fn monitor(&self) -> ReturnMonitor<Repo> {
        ReturnMonitor::new(
            self.controller.clone(),
            self.stores.clone(),
            Duration::from_millis(20),
        )
    }

    pub fn service(&self) -> RentalService<Repo> {
        RentalService::new(
            self.controller.clone(),
            self.stores.clone(),
            chrono::Duration::minutes(120),
        )
    }

    /// Store an Active rental of `cart` and mark the cart in use.
    pub async fn rent(&self, cart: u32, phone: &str, start: DateTime<Utc>) -> RentalId {
        let cart_id = CartId::new(cart);
        let bay = self
            .stores
            .carts
            .locker_of(cart_id)
            .await
            .unwrap_or_else(|| locker(9));
        let new = NewRental::new(cart_id, phone, bay, start, chrono::Duration::minutes(120));
        let id = self.stores.rentals.create_rental(&new).await.unwrap();
        self.stores.carts.assign(cart_id, phone, start).await;
        id
    }

    pub async fn rental(&self, id: RentalId) -> RentalRecord {
        self.stores.rentals.get_rental(id).await.unwrap().unwrap()
    }
}

/// Carts 1..=3 parked in lockers 1..=3.
pub async fn parked_carts() -> CartTable {
    let carts = CartTable::new();
    for n in 1..=3u8 {
        carts
            .insert(Cart::new(CartId::new(u32::from(n)), locker(n)))
            .await;
    }
    carts
}

pub fn locker(n: u8) -> LockerId {
    LockerId::new(n).unwrap()
}

/// 2026-03-01 10:00:00 UTC plus `minutes`.
pub fn at(minutes: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + chrono::Duration::minutes(minutes)
}
