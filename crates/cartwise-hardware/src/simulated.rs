//! In-memory board for running without hardware.
//!
//! Selected at startup when the serial port cannot be opened, and used by
//! tests that need a controller whose sensors they can move by hand.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cartwise_core::LockerId;
use cartwise_protocol::LockStateSnapshot;
use tracing::{debug, info};

use crate::traits::LockBoard;
use crate::types::ControllerKind;

/// Unlocks kept for inspection; older ones only count toward the total.
const UNLOCK_HISTORY: usize = 64;

#[derive(Debug, Default)]
struct BoardState {
    snapshot: LockStateSnapshot,
    offline: bool,
    recent_unlocks: VecDeque<LockerId>,
    unlock_count: u64,
}

impl BoardState {
    fn record_unlock(&mut self, locker: LockerId) {
        if self.recent_unlocks.len() == UNLOCK_HISTORY {
            self.recent_unlocks.pop_front();
        }
        self.recent_unlocks.push_back(locker);
        self.unlock_count += 1;
    }
}

fn lock(state: &Mutex<BoardState>) -> MutexGuard<'_, BoardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated KR-CU16 board.
///
/// # Examples
///
/// ```
/// use cartwise_core::LockerId;
/// use cartwise_hardware::simulated::SimulatedBoard;
/// use cartwise_hardware::traits::LockBoard;
///
/// let (mut board, handle) = SimulatedBoard::new();
/// let locker = LockerId::new(3).unwrap();
///
/// handle.dock(locker);
/// assert!(board.query_all().unwrap().is_returned(locker));
///
/// assert!(board.unlock(locker));
/// assert!(!board.query_all().unwrap().is_returned(locker));
/// ```
#[derive(Debug)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    /// Create an empty board and the handle that moves its sensors.
    pub fn new() -> (Self, SimulatedBoardHandle) {
        let state = Arc::new(Mutex::new(BoardState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            SimulatedBoardHandle { state },
        )
    }
}

impl LockBoard for SimulatedBoard {
    fn query_lock(&mut self, _locker: LockerId) -> Option<LockStateSnapshot> {
        self.query_all()
    }

    fn query_all(&mut self) -> Option<LockStateSnapshot> {
        let state = lock(&self.state);
        (!state.offline).then_some(state.snapshot)
    }

    fn release(&mut self, locker: LockerId) -> bool {
        let mut state = lock(&self.state);
        state.snapshot = state.snapshot.with_hook(locker, false);
        state.record_unlock(locker);
        info!(locker = %locker, "Simulated unlock");
        true
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Simulated
    }
}

/// Handle for moving the simulated sensors.
#[derive(Debug, Clone)]
pub struct SimulatedBoardHandle {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoardHandle {
    /// A cart is pushed into `locker` and latched.
    pub fn dock(&self, locker: LockerId) {
        let mut state = lock(&self.state);
        state.snapshot = state
            .snapshot
            .with_presence(locker, true)
            .with_hook(locker, true);
        debug!(locker = %locker, "Simulated dock");
    }

    /// A cart is pushed into `locker` but the hook stays open.
    pub fn insert(&self, locker: LockerId) {
        let mut state = lock(&self.state);
        state.snapshot = state.snapshot.with_presence(locker, true);
    }

    /// The cart leaves `locker`.
    pub fn take(&self, locker: LockerId) {
        let mut state = lock(&self.state);
        state.snapshot = state
            .snapshot
            .with_presence(locker, false)
            .with_hook(locker, false);
    }

    /// Make every query return `None` until switched back.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    pub fn snapshot(&self) -> LockStateSnapshot {
        lock(&self.state).snapshot
    }

    /// The most recent unlocks, oldest first.
    pub fn unlocks(&self) -> Vec<LockerId> {
        lock(&self.state).recent_unlocks.iter().copied().collect()
    }

    /// Unlocks since the board was created.
    pub fn unlock_count(&self) -> u64 {
        lock(&self.state).unlock_count
    }
}
