//! Domain operations of a KR-CU16 board.
//!
//! Everything here degrades to a value instead of an error: a board that
//! does not answer yields `None` or [`LockStatus::Unknown`], never a fault
//! the caller has to unwind from.

use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use cartwise_core::{LockerId, constants::*};
use cartwise_protocol::{Address, Command, Cu16Codec, Frame, LockStateSnapshot, hex};
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use crate::link::{LinkSession, PortOpener};
use crate::traits::LockBoard;
use crate::types::{ControllerKind, LockStatus};

/// Board-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Address byte sent with board-wide status queries and the busy-clear pulse.
    pub board_address: Address,

    /// Pause between an unlock and the busy-clear pulse.
    pub busy_clear_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            board_address: Address::Locker(LockerId::FIRST),
            busy_clear_delay: Duration::from_millis(BUSY_CLEAR_DELAY_MS),
        }
    }
}

impl ControllerConfig {
    pub fn without_delays() -> Self {
        Self {
            busy_clear_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// KR-CU16 controller on a serial link.
///
/// # Examples
///
/// ```
/// use cartwise_core::LockerId;
/// use cartwise_hardware::controller::{ControllerConfig, Cu16Controller};
/// use cartwise_hardware::link::{LinkConfig, LinkSession, PortSettings};
/// use cartwise_hardware::mock::MockOpener;
/// use cartwise_protocol::LockStateSnapshot;
///
/// let (opener, wire) = MockOpener::new();
/// let locker = LockerId::new(3).unwrap();
/// wire.emulate(LockStateSnapshot::default().with_hook(locker, true).with_presence(locker, true));
///
/// let link = LinkSession::new(opener, PortSettings::new("/dev/ttyMOCK0", 9600), LinkConfig::without_delays());
/// let mut controller = Cu16Controller::new(link, ControllerConfig::without_delays());
///
/// let snapshot = controller.query_all().unwrap();
/// assert!(Cu16Controller::<MockOpener>::is_returned(locker, &snapshot));
/// ```
pub struct Cu16Controller<O: PortOpener> {
    link: LinkSession<O>,
    config: ControllerConfig,
}

impl<O: PortOpener> Cu16Controller<O> {
    pub fn new(link: LinkSession<O>, config: ControllerConfig) -> Self {
        Self { link, config }
    }

    pub fn link(&self) -> &LinkSession<O> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkSession<O> {
        &mut self.link
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Status of the board as seen from one locker's address.
    pub fn query_lock(&mut self, locker: LockerId) -> Option<LockStateSnapshot> {
        debug!(locker = %locker, "Querying lock state");
        let request = Frame::request(Address::Locker(locker), Command::GetStatus);
        self.query(&request, self.link.config().max_retries)
    }

    /// Status of all 16 lockers.
    pub fn query_all(&mut self) -> Option<LockStateSnapshot> {
        debug!("Querying state of all locks");
        let request = Frame::request(self.config.board_address, Command::GetAllStatus);
        self.query(&request, self.link.config().max_retries)
    }

    /// Release the latch of `locker`.
    ///
    /// Returns `true` once the unlock frame has left the host, with or without
    /// an acknowledgement; this board does not reliably acknowledge unlocks.
    /// A busy-clear pulse always follows, since the board ignores further
    /// commands until it sees one.
    pub fn unlock(&mut self, locker: LockerId) -> bool {
        let sent = self.release(locker);
        self.clear_busy();
        sent
    }

    /// Send the unlock frame for `locker` without the busy-clear pulse.
    pub fn release(&mut self, locker: LockerId) -> bool {
        info!(locker = %locker, "Unlocking");
        let request = Frame::request(Address::Locker(locker), Command::Unlock).encode();
        match self.link.transact(&request, STATUS_RESPONSE_LEN) {
            Ok(reply) => {
                debug!(locker = %locker, reply = %hex(&reply), "Unlock acknowledged");
                true
            }
            Err(e) if e.transmitted() => {
                warn!(locker = %locker, "Unlock sent, no reliable response received");
                true
            }
            Err(e) => {
                warn!(locker = %locker, error = %e, "Unlock could not be sent");
                false
            }
        }
    }

    /// Wait `busy_clear_delay`, then send `ResetUnlockTime` to the board address.
    pub fn clear_busy(&mut self) {
        thread::sleep(self.config.busy_clear_delay);
        let pulse = Frame::request(self.config.board_address, Command::ResetUnlockTime).encode();
        match self.link.transact(&pulse, STATUS_RESPONSE_LEN) {
            Ok(_) => debug!("Busy-clear pulse acknowledged"),
            Err(e) => debug!(error = %e, "Busy-clear pulse sent without reply"),
        }
    }

    /// Whether `locker` holds a latched cart in `snapshot`.
    pub fn is_returned(locker: LockerId, snapshot: &LockStateSnapshot) -> bool {
        snapshot.is_returned(locker)
    }

    /// Latch state of one locker, `Unknown` when the board is silent.
    pub fn lock_status(&mut self, locker: LockerId) -> LockStatus {
        match self.query_lock(locker) {
            Some(snapshot) if snapshot.is_hook_closed(locker) => LockStatus::Locked,
            Some(_) => LockStatus::Unlocked,
            None => LockStatus::Unknown,
        }
    }

    /// Find the baud rate the board answers at.
    ///
    /// Each candidate gets one status query; the first rate whose reply has
    /// STX and ETX in place is kept. When none answers, the original rate is
    /// restored and `None` returned.
    pub fn detect_baud_rate(&mut self, candidates: &[u32]) -> Option<u32> {
        let original = self.link.settings().baud_rate;
        let probe = Frame::request(Address::Locker(LockerId::FIRST), Command::GetStatus).encode();

        for &baud_rate in candidates {
            info!(baud = baud_rate, "Testing baud rate");
            self.link.set_baud_rate(baud_rate);
            match self.link.transact_with_retries(&probe, STATUS_RESPONSE_LEN, 1) {
                Ok(reply) if has_frame_markers(&reply) => {
                    info!(baud = baud_rate, "Found working baud rate");
                    return Some(baud_rate);
                }
                Ok(reply) => warn!(baud = baud_rate, reply = %hex(&reply), "No valid response"),
                Err(e) => warn!(baud = baud_rate, error = %e, "No response"),
            }
        }

        warn!(baud = original, "No working baud rate found, keeping original setting");
        self.link.set_baud_rate(original);
        None
    }

    fn query(&mut self, request: &Frame, max_retries: u32) -> Option<LockStateSnapshot> {
        let reply = match self
            .link
            .transact_with_retries(&request.encode(), STATUS_RESPONSE_LEN, max_retries)
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(request = %request, error = %e, "Status query failed");
                return None;
            }
        };

        let mut buffer = BytesMut::from(&reply[..]);
        if let Some(snapshot) = decode_status(&mut buffer) {
            return Some(snapshot);
        }
        // A status frame cut short by the read: fetch the rest once.
        if !buffer.is_empty() && buffer.len() < STATUS_RESPONSE_LEN {
            let rest = self.link.read_more(STATUS_RESPONSE_LEN - buffer.len());
            buffer.extend_from_slice(&rest);
            if let Some(snapshot) = decode_status(&mut buffer) {
                return Some(snapshot);
            }
        }

        warn!(reply = %hex(&reply), "Invalid status response");
        None
    }
}

/// First status frame in `buffer`, skipping noise and invalid candidates.
///
/// Stops at a partial frame, which stays in `buffer`.
fn decode_status(buffer: &mut BytesMut) -> Option<LockStateSnapshot> {
    let mut codec = Cu16Codec::new();
    loop {
        match codec.decode(buffer) {
            Ok(Some(frame)) => match LockStateSnapshot::from_frame(&frame) {
                Ok(snapshot) => return Some(snapshot),
                Err(e) => debug!(frame = %frame, error = %e, "Skipping non-status frame"),
            },
            Ok(None) => return None,
            Err(e) => debug!(error = %e, "Skipping invalid reply bytes"),
        }
    }
}

/// Loose shape check used while probing baud rates.
fn has_frame_markers(reply: &[u8]) -> bool {
    reply.len() >= MIN_FRAME_LEN && reply[0] == STX && reply[reply.len() - 2] == ETX
}

impl<O: PortOpener> LockBoard for Cu16Controller<O> {
    fn query_lock(&mut self, locker: LockerId) -> Option<LockStateSnapshot> {
        Cu16Controller::query_lock(self, locker)
    }

    fn query_all(&mut self) -> Option<LockStateSnapshot> {
        Cu16Controller::query_all(self)
    }

    fn release(&mut self, locker: LockerId) -> bool {
        Cu16Controller::release(self, locker)
    }

    fn clear_busy(&mut self) {
        Cu16Controller::clear_busy(self)
    }

    fn lock_status(&mut self, locker: LockerId) -> LockStatus {
        Cu16Controller::lock_status(self, locker)
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Hardware
    }

    fn shutdown(&mut self) {
        self.link.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkConfig, PortSettings};
    use crate::mock::{MockOpener, MockWire};

    fn controller() -> (Cu16Controller<MockOpener>, MockWire) {
        let (opener, wire) = MockOpener::new();
        let link = LinkSession::new(
            opener,
            PortSettings::new("/dev/ttyMOCK0", DEFAULT_BAUD_RATE),
            LinkConfig::without_delays(),
        );
        (
            Cu16Controller::new(link, ControllerConfig::without_delays()),
            wire,
        )
    }

    fn id(n: u8) -> LockerId {
        LockerId::new(n).unwrap()
    }

    fn docked(n: u8) -> LockStateSnapshot {
        LockStateSnapshot::default()
            .with_hook(id(n), true)
            .with_presence(id(n), true)
    }

    #[test]
    fn test_query_lock_decodes_snapshot() {
        let (mut controller, wire) = controller();
        wire.push_frame(&docked(3).to_frame(Address::Locker(id(3)), Command::GetStatus).unwrap());

        let snapshot = controller.query_lock(id(3)).unwrap();
        assert!(snapshot.is_returned(id(3)));
        assert_eq!(
            wire.written_frames(),
            vec![Frame::request(Address::Locker(id(3)), Command::GetStatus)]
        );
    }

    #[test]
    fn test_three_empty_reads_yield_none() {
        let (mut controller, wire) = controller();
        wire.push_silence(3);

        assert_eq!(controller.query_lock(id(0)), None);
        assert_eq!(wire.written().len(), 3);

        // the next call proceeds normally
        wire.push_frame(&docked(0).to_frame(Address::Locker(id(0)), Command::GetStatus).unwrap());
        assert!(controller.query_lock(id(0)).is_some());
    }

    #[test]
    fn test_corrupt_reply_yields_none() {
        let (mut controller, wire) = controller();
        let mut bytes = docked(1)
            .to_frame(Address::Locker(id(1)), Command::GetStatus)
            .unwrap()
            .encode()
            .to_vec();
        bytes[3] ^= 0x01;
        wire.push_reply(bytes);

        assert_eq!(controller.query_lock(id(1)), None);
    }

    #[test]
    fn test_noise_before_status_frame_is_skipped() {
        let (mut controller, wire) = controller();
        let frame = docked(6).to_frame(Address::Locker(id(6)), Command::GetStatus).unwrap();
        let mut bytes = vec![0xFF, 0x00];
        bytes.extend_from_slice(&frame.encode());
        wire.push_reply(bytes);

        let snapshot = controller.query_lock(id(6)).unwrap();
        assert!(snapshot.is_returned(id(6)));
        assert_eq!(wire.written().len(), 1);
    }

    #[test]
    fn test_status_frame_split_across_reads() {
        let (mut controller, wire) = controller();
        let frame = docked(2).to_frame(Address::Locker(id(2)), Command::GetStatus).unwrap();
        let mut bytes = vec![0x55; 5];
        bytes.extend_from_slice(&frame.encode());
        wire.push_reply(bytes);

        assert!(controller.query_lock(id(2)).unwrap().is_returned(id(2)));
    }

    #[test]
    fn test_query_all_uses_board_address() {
        let (mut controller, wire) = controller();
        wire.emulate(docked(5));

        assert!(controller.query_all().unwrap().is_returned(id(5)));
        assert_eq!(
            wire.written_frames(),
            vec![Frame::request(Address::Locker(id(0)), Command::GetAllStatus)]
        );
    }

    #[test]
    fn test_unlock_without_ack_still_succeeds_and_clears_busy() {
        let (mut controller, wire) = controller();
        wire.push_silence(6);

        assert!(controller.unlock(id(4)));

        let frames = wire.written_frames();
        assert_eq!(frames.len(), 6);
        assert!(
            frames[..3]
                .iter()
                .all(|f| f.command() == Command::Unlock && f.address() == Address::Locker(id(4)))
        );
        assert_eq!(
            frames.last(),
            Some(&Frame::request(Address::Locker(id(0)), Command::ResetUnlockTime))
        );
    }

    #[test]
    fn test_unlock_with_ack() {
        let (mut controller, wire) = controller();
        wire.push_frame(&docked(4).to_frame(Address::Locker(id(4)), Command::GetStatus).unwrap());
        wire.push_reply(vec![0x06]);

        assert!(controller.unlock(id(4)));
        let commands: Vec<Command> = wire.written_frames().iter().map(|f| f.command()).collect();
        assert_eq!(commands, vec![Command::Unlock, Command::ResetUnlockTime]);
    }

    #[test]
    fn test_unlock_fails_only_when_never_sent() {
        let (mut controller, wire) = controller();
        wire.fail_all_opens(true);

        assert!(!controller.unlock(id(2)));
        assert!(wire.written().is_empty());
    }

    #[test]
    fn test_lock_status() {
        let (mut controller, wire) = controller();
        wire.emulate(LockStateSnapshot::default().with_hook(id(7), true));

        assert_eq!(controller.lock_status(id(7)), LockStatus::Locked);
        assert_eq!(controller.lock_status(id(8)), LockStatus::Unlocked);

        wire.emulate_at_baud(115_200);
        assert_eq!(controller.lock_status(id(7)), LockStatus::Unknown);
    }

    #[test]
    fn test_detect_baud_rate_finds_answering_rate() {
        let (mut controller, wire) = controller();
        wire.emulate(LockStateSnapshot::default());
        wire.emulate_at_baud(38_400);

        assert_eq!(controller.detect_baud_rate(&COMMON_BAUD_RATES), Some(38_400));
        assert_eq!(controller.link().settings().baud_rate, 38_400);
        assert_eq!(wire.open_baud_rates(), vec![19_200, 9_600, 38_400]);
    }

    #[test]
    fn test_detect_baud_rate_restores_original() {
        let (mut controller, _wire) = controller();

        assert_eq!(controller.detect_baud_rate(&COMMON_BAUD_RATES), None);
        assert_eq!(controller.link().settings().baud_rate, DEFAULT_BAUD_RATE);
        assert!(!controller.link().is_open());
    }

    #[test]
    fn test_has_frame_markers() {
        assert!(has_frame_markers(&[0x02, 0x00, 0x30, 0x03, 0x35]));
        assert!(!has_frame_markers(&[0x02, 0x03]));
        assert!(!has_frame_markers(&[0x00, 0x00, 0x30, 0x03, 0x35]));
    }
}
