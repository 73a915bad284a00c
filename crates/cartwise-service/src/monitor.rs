//! Background return detection.
//!
//! One task polls the lock board on a fixed interval and reconciles what it
//! sees with the open rentals:
//!
//! 1. Query all lockers. No snapshot means the tick is skipped.
//! 2. Every open rental (Active or Overdue) whose locker shows a latched cart
//!    is closed as Returned or ReturnedLate and its cart becomes Available.
//! 3. Every remaining Active rental past its deadline becomes Overdue, once.
//! 4. Carts held after a cancelled rental become Available once their locker
//!    shows them latched.
//!
//! Each rental is handled inside its own failure boundary: an error is logged
//! and counted, and the rest of the tick carries on. Stopping is cooperative:
//! the tick in flight completes before the task exits.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cartwise_core::{CartId, RentalId, RentalRecord, RentalStatus};
use cartwise_hardware::{ControllerHandle, ControllerKind};
use cartwise_protocol::LockStateSnapshot;
use cartwise_storage::RentalRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ServiceError};
use crate::stores::Stores;

/// Capacity of the event channel. Slow subscribers lose the oldest events.
const EVENT_CAPACITY: usize = 64;

/// Rental transition produced by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RentalEvent {
    Returned {
        rental_id: RentalId,
        cart_id: CartId,
        user_phone: String,
        at: DateTime<Utc>,
    },
    ReturnedLate {
        rental_id: RentalId,
        cart_id: CartId,
        user_phone: String,
        at: DateTime<Utc>,
        expected_return: DateTime<Utc>,
    },
    Overdue {
        rental_id: RentalId,
        cart_id: CartId,
        user_phone: String,
        expected_return: DateTime<Utc>,
    },
}

impl RentalEvent {
    pub fn rental_id(&self) -> RentalId {
        match self {
            RentalEvent::Returned { rental_id, .. }
            | RentalEvent::ReturnedLate { rental_id, .. }
            | RentalEvent::Overdue { rental_id, .. } => *rental_id,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// `false` when the board gave no snapshot and the pass was skipped.
    pub polled: bool,
    pub returned: Vec<RentalId>,
    pub returned_late: Vec<RentalId>,
    pub overdue: Vec<RentalId>,
    /// Held carts put back into service this pass.
    pub released: Vec<CartId>,
    /// Rentals whose handling failed this pass.
    pub failures: usize,
}

impl TickReport {
    fn skipped() -> Self {
        Self::default()
    }
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub interval: Duration,
    pub controller_kind: ControllerKind,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

fn lock_status(status: &Mutex<MonitorStatus>) -> MutexGuard<'_, MonitorStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reconciles lock-board state with open rentals.
pub struct ReturnMonitor<R> {
    controller: ControllerHandle,
    stores: Stores<R>,
    events: broadcast::Sender<RentalEvent>,
    status: Arc<Mutex<MonitorStatus>>,
}

impl<R: RentalRepository> ReturnMonitor<R> {
    pub fn new(controller: ControllerHandle, stores: Stores<R>, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let status = MonitorStatus {
            running: false,
            interval,
            controller_kind: controller.kind(),
            ticks: 0,
            skipped_ticks: 0,
            last_tick_at: None,
        };
        Self {
            controller,
            stores,
            events,
            status: Arc::new(Mutex::new(status)),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RentalEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> MonitorStatus {
        lock_status(&self.status).clone()
    }

    /// Run one reconciliation pass at the current time.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one reconciliation pass as if the time were `now`.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let report = match self.poll().await {
            Some(snapshot) => self.reconcile(&snapshot, now).await,
            None => TickReport::skipped(),
        };

        let mut status = lock_status(&self.status);
        status.ticks += 1;
        if !report.polled {
            status.skipped_ticks += 1;
        }
        status.last_tick_at = Some(now);
        report
    }

    async fn poll(&self) -> Option<LockStateSnapshot> {
        match self.controller.query_all().await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                warn!("Lock board did not answer, skipping tick");
                None
            }
            Err(e) => {
                warn!(error = %e, "Lock board unreachable, skipping tick");
                None
            }
        }
    }

    async fn reconcile(&self, snapshot: &LockStateSnapshot, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            polled: true,
            ..TickReport::default()
        };

        let open = match self.stores.rentals.list_open().await {
            Ok(open) => open,
            Err(e) => {
                error!(error = %e, "Could not list open rentals");
                report.failures += 1;
                return report;
            }
        };

        let mut closed = HashSet::new();
        for rental in &open {
            match self.detect_return(rental, snapshot, now).await {
                Ok(Some(RentalStatus::ReturnedLate)) => {
                    closed.insert(rental.id);
                    report.returned_late.push(rental.id);
                }
                Ok(Some(_)) => {
                    closed.insert(rental.id);
                    report.returned.push(rental.id);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(rental_id = %rental.id, cart = %rental.cart_id, error = %e, "Return check failed");
                    report.failures += 1;
                }
            }
        }

        for rental in open.iter().filter(|r| !closed.contains(&r.id)) {
            if rental.status != RentalStatus::Active || now <= rental.expected_return {
                continue;
            }
            match self.flag_overdue(rental.id, now).await {
                Ok(true) => report.overdue.push(rental.id),
                Ok(false) => {}
                Err(e) => {
                    error!(rental_id = %rental.id, error = %e, "Overdue check failed");
                    report.failures += 1;
                }
            }
        }

        report.released = self.release_docked(snapshot).await;

        debug!(
            returned = report.returned.len(),
            returned_late = report.returned_late.len(),
            overdue = report.overdue.len(),
            released = report.released.len(),
            failures = report.failures,
            "Tick complete"
        );
        report
    }

    /// Close `rental` if its locker holds a latched cart.
    async fn detect_return(
        &self,
        rental: &RentalRecord,
        snapshot: &LockStateSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Option<RentalStatus>> {
        let locker = self
            .stores
            .carts
            .locker_of(rental.cart_id)
            .await
            .ok_or(ServiceError::CartNotFound(rental.cart_id))?;
        if !snapshot.is_returned(locker) {
            return Ok(None);
        }

        let _guard = self.stores.lock().await;
        // The request path may have closed it meanwhile.
        let Some(mut current) = self.stores.rentals.get_rental(rental.id).await? else {
            return Ok(None);
        };
        if !current.is_open() {
            return Ok(None);
        }

        let status = current.mark_returned(now)?;
        if !self.stores.rentals.update_rental(&current).await? {
            return Err(ServiceError::RentalNotFound(current.id));
        }
        self.stores.carts.mark_available(current.cart_id).await;

        let event = if status == RentalStatus::ReturnedLate {
            warn!(
                rental_id = %current.id,
                cart = %current.cart_id,
                locker = %locker,
                late_by_secs = (now - current.expected_return).num_seconds(),
                "Cart returned late"
            );
            RentalEvent::ReturnedLate {
                rental_id: current.id,
                cart_id: current.cart_id,
                user_phone: current.user_phone.clone(),
                at: now,
                expected_return: current.expected_return,
            }
        } else {
            info!(
                rental_id = %current.id,
                cart = %current.cart_id,
                locker = %locker,
                duration_secs = current.duration(now).num_seconds(),
                "Cart returned"
            );
            RentalEvent::Returned {
                rental_id: current.id,
                cart_id: current.cart_id,
                user_phone: current.user_phone.clone(),
                at: now,
            }
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
        Ok(Some(status))
    }

    /// Make held carts available again once their locker latches them.
    async fn release_docked(&self, snapshot: &LockStateSnapshot) -> Vec<CartId> {
        let held = self.stores.carts.awaiting_dock().await;
        if held.is_empty() {
            return Vec::new();
        }

        let _guard = self.stores.lock().await;
        let mut released = Vec::new();
        for cart in held.into_iter().filter(|cart| snapshot.is_returned(cart.locker_id)) {
            let mut freed = false;
            self.stores
                .carts
                .update(cart.cart_id, |current| {
                    if current.awaiting_dock() {
                        current.mark_available();
                        freed = true;
                    }
                })
                .await;
            if freed {
                info!(cart = %cart.cart_id, locker = %cart.locker_id, "Held cart docked, back in service");
                released.push(cart.cart_id);
            }
        }
        released
    }

    /// Flag an Active rental past its deadline. `Ok(true)` only on the transition.
    async fn flag_overdue(&self, id: RentalId, now: DateTime<Utc>) -> Result<bool> {
        let _guard = self.stores.lock().await;
        let Some(mut current) = self.stores.rentals.get_rental(id).await? else {
            return Ok(false);
        };
        if current.status != RentalStatus::Active {
            return Ok(false);
        }
        if !current.mark_overdue(now)? {
            return Ok(false);
        }
        if !self.stores.rentals.update_rental(&current).await? {
            return Err(ServiceError::RentalNotFound(current.id));
        }

        warn!(
            rental_id = %current.id,
            cart = %current.cart_id,
            overdue_secs = (now - current.expected_return).num_seconds(),
            "Rental overdue"
        );
        let _ = self.events.send(RentalEvent::Overdue {
            rental_id: current.id,
            cart_id: current.cart_id,
            user_phone: current.user_phone.clone(),
            expected_return: current.expected_return,
        });
        Ok(true)
    }
}

impl<R: RentalRepository + 'static> ReturnMonitor<R> {
    /// Start the poll loop on its own task.
    pub fn spawn(self) -> MonitorHandle {
        let token = CancellationToken::new();
        let events = self.events.clone();
        let status = Arc::clone(&self.status);
        lock_status(&status).running = true;

        let task = tokio::spawn(run(self, token.clone()));
        MonitorHandle {
            token,
            task: Some(task),
            events,
            status,
        }
    }
}

async fn run<R: RentalRepository>(monitor: ReturnMonitor<R>, token: CancellationToken) {
    let interval = lock_status(&monitor.status).interval;
    info!(interval_secs = interval.as_secs_f64(), kind = %monitor.controller.kind(), "Return monitor started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                // Runs to completion; cancellation is only observed between ticks.
                monitor.tick().await;
            }
        }
    }

    lock_status(&monitor.status).running = false;
    info!("Return monitor stopped");
}

/// Handle to the running monitor task.
#[derive(Debug)]
pub struct MonitorHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    events: broadcast::Sender<RentalEvent>,
    status: Arc<Mutex<MonitorStatus>>,
}

impl MonitorHandle {
    pub fn status(&self) -> MonitorStatus {
        lock_status(&self.status).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RentalEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.status().running
    }

    /// Ask the loop to stop and wait for the tick in flight to finish.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "Return monitor task failed");
            lock_status(&self.status).running = false;
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
