//! Scriptable stand-in for a serial port and the board behind it.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use cartwise_core::LockerId;
use cartwise_protocol::{Command, Cu16Codec, Frame, LockStateSnapshot};
use tokio_util::codec::Decoder;

use crate::error::LinkError;
use crate::link::{PortOpener, PortSettings, SerialLink};

#[derive(Debug)]
enum Reply {
    Bytes(Vec<u8>),
    Silent,
}

#[derive(Debug, Default)]
struct WireState {
    replies: VecDeque<Reply>,
    emulated: Option<LockStateSnapshot>,
    emulator_baud: Option<u32>,
    current_baud: u32,
    pending: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    open_failures: u32,
    fail_all_opens: bool,
    frozen_probes: u32,
    opens: u32,
    closes: u32,
    clears: u32,
    open_baud_rates: Vec<u32>,
}

impl WireState {
    /// What the board puts on the wire after the host wrote `bytes`.
    fn respond(&mut self, bytes: &[u8]) {
        if let Some(reply) = self.replies.pop_front() {
            if let Reply::Bytes(reply) = reply {
                self.pending.extend(reply);
            }
            return;
        }

        let Some(mut snapshot) = self.emulated else {
            return;
        };
        if self
            .emulator_baud
            .is_some_and(|baud| baud != self.current_baud)
        {
            return;
        }

        let mut codec = Cu16Codec::new();
        let mut buffer = BytesMut::from(bytes);
        while let Ok(Some(frame)) = codec.decode(&mut buffer) {
            match frame.command() {
                Command::GetStatus | Command::GetAllStatus => {
                    if let Ok(reply) = snapshot.to_frame(frame.address(), frame.command()) {
                        self.pending.extend(reply.encode());
                    }
                }
                Command::Unlock => {
                    if let Some(locker) = frame.address().locker() {
                        snapshot = snapshot.with_hook(locker, false);
                    }
                }
                Command::UnlockAll => {
                    for locker in LockerId::all() {
                        snapshot = snapshot.with_hook(locker, false);
                    }
                }
                // Actuation and timing commands are not acknowledged.
                _ => {}
            }
        }
        self.emulated = Some(snapshot);
    }
}

fn lock(state: &Mutex<WireState>) -> MutexGuard<'_, WireState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens [`MockPort`]s that share one scripted wire.
///
/// # Examples
///
/// ```
/// use cartwise_hardware::link::{LinkConfig, LinkSession, PortSettings};
/// use cartwise_hardware::mock::MockOpener;
///
/// let (opener, wire) = MockOpener::new();
/// wire.push_reply(vec![0x02, 0x00, 0x30, 0x00, 0x00, 0x00, 0x00, 0x03, 0x35]);
///
/// let mut link = LinkSession::new(
///     opener,
///     PortSettings::new("/dev/ttyMOCK0", 9600),
///     LinkConfig::without_delays(),
/// );
/// let reply = link.transact(&[0x02, 0x00, 0x30, 0x03, 0x35], 9).unwrap();
/// assert_eq!(reply.len(), 9);
/// assert_eq!(wire.written().len(), 1);
/// ```
#[derive(Debug)]
pub struct MockOpener {
    state: Arc<Mutex<WireState>>,
}

impl MockOpener {
    /// Create an opener and the handle that scripts its wire.
    pub fn new() -> (Self, MockWire) {
        let state = Arc::new(Mutex::new(WireState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockWire { state },
        )
    }
}

impl PortOpener for MockOpener {
    type Port = MockPort;

    fn open(&mut self, settings: &PortSettings) -> Result<Self::Port, LinkError> {
        let mut state = lock(&self.state);
        if state.fail_all_opens {
            return Err(LinkError::port_unavailable(format!(
                "{}: permission denied",
                settings.path
            )));
        }
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(LinkError::port_unavailable(format!(
                "{}: device busy",
                settings.path
            )));
        }
        state.opens += 1;
        state.current_baud = settings.baud_rate;
        state.open_baud_rates.push(settings.baud_rate);
        Ok(MockPort {
            state: Arc::clone(&self.state),
        })
    }
}

/// One open handle on the mock wire. Dropping it counts as a close.
#[derive(Debug)]
pub struct MockPort {
    state: Arc<Mutex<WireState>>,
}

impl SerialLink for MockPort {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.written.push(bytes.to_vec());
        state.respond(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let count = buf.len().min(state.pending.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.pending.clear();
        state.clears += 1;
        Ok(())
    }

    fn probe(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.frozen_probes > 0 {
            state.frozen_probes -= 1;
            return Err(io::Error::other("write failed: driver not responding"));
        }
        Ok(())
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        lock(&self.state).closes += 1;
    }
}

/// Test-side handle of the mock wire.
#[derive(Debug, Clone)]
pub struct MockWire {
    state: Arc<Mutex<WireState>>,
}

impl MockWire {
    /// Queue raw bytes as the reply to the next write.
    pub fn push_reply(&self, bytes: Vec<u8>) {
        lock(&self.state).replies.push_back(Reply::Bytes(bytes));
    }

    /// Queue an encoded frame as the reply to the next write.
    pub fn push_frame(&self, frame: &Frame) {
        self.push_reply(frame.encode().to_vec());
    }

    /// Leave the next `count` writes unanswered.
    pub fn push_silence(&self, count: usize) {
        let mut state = lock(&self.state);
        state
            .replies
            .extend(std::iter::repeat_with(|| Reply::Silent).take(count));
    }

    /// Answer unscripted writes like a KR-CU16 holding `snapshot`.
    pub fn emulate(&self, snapshot: LockStateSnapshot) {
        lock(&self.state).emulated = Some(snapshot);
    }

    /// Only answer in emulator mode while the port is open at `baud_rate`.
    pub fn emulate_at_baud(&self, baud_rate: u32) {
        lock(&self.state).emulator_baud = Some(baud_rate);
    }

    /// Current state of the emulated board.
    pub fn emulated(&self) -> Option<LockStateSnapshot> {
        lock(&self.state).emulated
    }

    /// Make the next `count` opens fail.
    pub fn fail_opens(&self, count: u32) {
        lock(&self.state).open_failures = count;
    }

    /// Make every open fail until switched off.
    pub fn fail_all_opens(&self, fail: bool) {
        lock(&self.state).fail_all_opens = fail;
    }

    /// Make the next `count` liveness probes fail.
    pub fn freeze_next_probes(&self, count: u32) {
        lock(&self.state).frozen_probes = count;
    }

    /// Every buffer the host wrote, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.state).written.clone()
    }

    /// Every write that decodes as a single frame.
    pub fn written_frames(&self) -> Vec<Frame> {
        self.written()
            .iter()
            .filter_map(|bytes| Frame::decode(bytes).ok())
            .collect()
    }

    pub fn opens(&self) -> u32 {
        lock(&self.state).opens
    }

    pub fn closes(&self) -> u32 {
        lock(&self.state).closes
    }

    pub fn clears(&self) -> u32 {
        lock(&self.state).clears
    }

    /// Baud rate of every successful open, in order.
    pub fn open_baud_rates(&self) -> Vec<u32> {
        lock(&self.state).open_baud_rates.clone()
    }
}
