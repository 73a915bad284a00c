//! Single owner of the lock controller.
//!
//! The RS-485 bus is half-duplex and the board is stateful, so two frames in
//! flight at once corrupt each other. The controller is therefore moved onto
//! one dedicated thread and every caller (the return monitor as well as the
//! request path) talks to it through a mailbox.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐
//! │ Monitor    │──┐
//! └────────────┘  │   ┌─────────────┐     ┌──────────────────┐
//!                 ├──►│  Mailbox    │────►│ Controller thread │──► serial port
//! ┌────────────┐  │   │  (mpsc)     │     │ (owns the board)  │
//! │ Requests   │──┘   └─────────────┘     └──────────────────┘
//! └────────────┘          ▲ oneshot replies        │
//!                         └────────────────────────┘
//! ```
//!
//! Every call is capped by the handle's request cap. When the cap expires
//! the caller gets [`HardwareError::RequestTimeout`]; the transaction already
//! running on the controller thread is left to finish, never cut mid-frame.
//! A request still queued when its caller gives up is dropped unserved, so a
//! timed-out unlock never opens a latch later.
//!
//! An unlock is answered as soon as the unlock frame has gone out. The
//! busy-clear pulse that follows runs after the reply and delays only the
//! next request in the queue.

use std::thread;
use std::time::Duration;

use cartwise_core::{LockerId, constants::DEFAULT_REQUEST_CAP_MS};
use cartwise_protocol::LockStateSnapshot;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::{HardwareError, Result};
use crate::traits::LockBoard;
use crate::types::{ControllerKind, LockStatus};

/// Mailbox capacity.
const MAILBOX_CAPACITY: usize = 32;

enum Request {
    QueryLock {
        locker: LockerId,
        reply: oneshot::Sender<Option<LockStateSnapshot>>,
    },
    QueryAll {
        reply: oneshot::Sender<Option<LockStateSnapshot>>,
    },
    Unlock {
        locker: LockerId,
        reply: oneshot::Sender<bool>,
    },
    LockStatus {
        locker: LockerId,
        reply: oneshot::Sender<LockStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable async handle to the controller thread.
///
/// # Examples
///
/// ```
/// use cartwise_core::LockerId;
/// use cartwise_hardware::actor::ControllerHandle;
/// use cartwise_hardware::simulated::SimulatedBoard;
///
/// #[tokio::main]
/// async fn main() -> cartwise_hardware::Result<()> {
///     let (board, sensors) = SimulatedBoard::new();
///     let handle = ControllerHandle::spawn(board)?;
///
///     let locker = LockerId::new(1).unwrap();
///     sensors.dock(locker);
///     let snapshot = handle.query_all().await?.unwrap();
///     assert!(snapshot.is_returned(locker));
///
///     handle.shutdown().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Request>,
    kind: ControllerKind,
    request_cap: Duration,
}

impl ControllerHandle {
    /// Move `board` onto its own thread with the default request cap.
    pub fn spawn<B: LockBoard + 'static>(board: B) -> Result<Self> {
        Self::spawn_with_cap(board, Duration::from_millis(DEFAULT_REQUEST_CAP_MS))
    }

    /// Move `board` onto its own thread; every call waits at most `request_cap`.
    ///
    /// # Errors
    /// Returns `HardwareError::Io` if the thread cannot be started.
    pub fn spawn_with_cap<B: LockBoard + 'static>(board: B, request_cap: Duration) -> Result<Self> {
        let kind = board.kind();
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);

        thread::Builder::new()
            .name("cartwise-controller".to_string())
            .spawn(move || run(board, rx))?;

        info!(kind = %kind, cap_ms = request_cap.as_millis() as u64, "Controller thread started");
        Ok(Self {
            tx,
            kind,
            request_cap,
        })
    }

    /// Which controller variant this handle drives.
    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    pub fn request_cap(&self) -> Duration {
        self.request_cap
    }

    pub async fn query_lock(&self, locker: LockerId) -> Result<Option<LockStateSnapshot>> {
        self.call(|reply| Request::QueryLock { locker, reply }).await
    }

    pub async fn query_all(&self) -> Result<Option<LockStateSnapshot>> {
        self.call(|reply| Request::QueryAll { reply }).await
    }

    /// Unlock `locker`. `Ok(true)` once the frame was transmitted.
    pub async fn unlock(&self, locker: LockerId) -> Result<bool> {
        self.call(|reply| Request::Unlock { locker, reply }).await
    }

    pub async fn lock_status(&self, locker: LockerId) -> Result<LockStatus> {
        self.call(|reply| Request::LockStatus { locker, reply }).await
    }

    /// Stop the controller thread after the requests queued before this one.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Request::Shutdown { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(make(reply_tx))
                .await
                .map_err(|_| HardwareError::disconnected(self.kind.to_string()))?;
            reply_rx
                .await
                .map_err(|_| HardwareError::disconnected(self.kind.to_string()))
        };

        tokio::time::timeout(self.request_cap, exchange)
            .await
            .map_err(|_| HardwareError::request_timeout(self.request_cap.as_millis() as u64))?
    }
}

impl Request {
    fn is_abandoned(&self) -> bool {
        match self {
            Self::QueryLock { reply, .. } | Self::QueryAll { reply } => reply.is_closed(),
            Self::Unlock { reply, .. } => reply.is_closed(),
            Self::LockStatus { reply, .. } => reply.is_closed(),
            Self::Shutdown { .. } => false,
        }
    }
}

/// Controller thread body: serve requests one at a time until shutdown.
fn run<B: LockBoard>(mut board: B, mut rx: mpsc::Receiver<Request>) {
    while let Some(request) = rx.blocking_recv() {
        if request.is_abandoned() {
            debug!("Dropping request abandoned by its caller");
            continue;
        }
        // A receiver dropped mid-transaction means the caller gave up; the
        // work is done anyway.
        match request {
            Request::QueryLock { locker, reply } => {
                let _ = reply.send(board.query_lock(locker));
            }
            Request::QueryAll { reply } => {
                let _ = reply.send(board.query_all());
            }
            Request::Unlock { locker, reply } => {
                let _ = reply.send(board.release(locker));
                board.clear_busy();
            }
            Request::LockStatus { locker, reply } => {
                let _ = reply.send(board.lock_status(locker));
            }
            Request::Shutdown { reply } => {
                board.shutdown();
                rx.close();
                let _ = reply.send(());
                break;
            }
        }
    }
    debug!("Controller thread stopped");
}
