//! Application context.
//!
//! Built once at startup and handed to whatever serves requests. It owns the
//! database, the controller thread, the cart table and the return monitor.

use cartwise_hardware::{AnyLockController, ControllerHandle, SimulatedBoardHandle};
use cartwise_storage::{CartTable, Database, RentalRepository, SqliteRentalRepository};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::monitor::{MonitorHandle, ReturnMonitor};
use crate::service::RentalService;
use crate::stores::Stores;

pub struct AppContext {
    config: ServiceConfig,
    database: Database,
    controller: ControllerHandle,
    simulator: Option<SimulatedBoardHandle>,
    carts: CartTable,
    monitor: MonitorHandle,
    service: RentalService<SqliteRentalRepository>,
}

impl AppContext {
    /// Open the database and the lock board, then start the monitor.
    ///
    /// A serial port that cannot be opened is not an error: the context runs
    /// against a simulated board and [`AppContext::simulator`] returns its handle.
    /// A request cap too short for an unlock is.
    pub async fn start(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let database = Database::new(config.database_config()).await?;
        let rentals = SqliteRentalRepository::new(database.pool().clone());

        let (board, simulator) = AnyLockController::open_or_simulate(
            config.port_settings(),
            config.link_config(),
            config.controller_config(),
        );
        let controller = ControllerHandle::spawn_with_cap(board, config.request_cap)?;

        let carts = CartTable::with_default_carts(config.cart_count);
        restore_assignments(&rentals, &carts).await?;

        let stores = Stores::new(rentals, carts.clone());
        let monitor =
            ReturnMonitor::new(controller.clone(), stores.clone(), config.monitor_interval).spawn();
        let service = RentalService::new(controller.clone(), stores, config.rental_duration);

        info!(
            controller = %controller.kind(),
            carts = config.cart_count,
            database = %config.database_path,
            "CartWise started"
        );
        Ok(Self {
            config,
            database,
            controller,
            simulator,
            carts,
            monitor,
            service,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn rental_service(&self) -> &RentalService<SqliteRentalRepository> {
        &self.service
    }

    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    pub fn carts(&self) -> &CartTable {
        &self.carts
    }

    /// Sensor handle of the simulated board, when no hardware was found.
    pub fn simulator(&self) -> Option<&SimulatedBoardHandle> {
        self.simulator.as_ref()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Stop the monitor after its current tick, then the controller, then the database.
    pub async fn shutdown(mut self) {
        self.monitor.stop().await;
        if let Err(e) = self.controller.shutdown().await {
            warn!(error = %e, "Controller did not shut down cleanly");
        }
        self.database.close().await;
        info!("CartWise stopped");
    }
}

/// Mark carts with an open rental from a previous run as in use.
async fn restore_assignments<R: RentalRepository>(rentals: &R, carts: &CartTable) -> Result<()> {
    for rental in rentals.list_open().await? {
        if !carts
            .assign(rental.cart_id, &rental.user_phone, rental.start_time)
            .await
        {
            warn!(rental_id = %rental.id, cart = %rental.cart_id, "Open rental for unknown cart");
        }
    }
    Ok(())
}
