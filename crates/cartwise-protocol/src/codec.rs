//! Tokio codec for KR-CU16 frame streams.
//!
//! The RS-485 bus delivers a plain byte stream: replies may arrive split
//! across reads, several may arrive in one read, and line noise can appear
//! between them. `Cu16Codec` turns that stream into [`Frame`] values.
//!
//! # Framing
//!
//! The board has no length field and a payload byte may equal ETX, so the
//! end of a frame is found by trying each possible ETX position (payload of
//! 0 to 4 bytes) and accepting the first one whose following byte is a
//! matching checksum.
//!
//! # Resynchronisation
//!
//! - Bytes before the first STX are discarded.
//! - Once nine bytes after an STX are buffered without a valid frame, the
//!   candidate is rejected with a [`FrameError`] and its bytes are consumed,
//!   so the next call to `decode` starts at the following byte.
//!
//! # Usage with Tokio Framed
//!
//! ```rust
//! use cartwise_core::LockerId;
//! use cartwise_protocol::{Address, Command, Cu16Codec, Frame};
//! use futures::{SinkExt, StreamExt};
//! use tokio_util::codec::Framed;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cartwise_core::Result<()> {
//! let (host, board) = tokio::io::duplex(64);
//! let mut host = Framed::new(host, Cu16Codec::new());
//! let mut board = Framed::new(board, Cu16Codec::new());
//!
//! let request = Frame::request(Address::Locker(LockerId::new(2)?), Command::GetStatus);
//! host.send(request.clone()).await?;
//! assert_eq!(board.next().await.transpose()?, Some(request));
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BytesMut};
use cartwise_core::{Error, FrameError, Result, constants::*};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::frame::{Frame, checksum, hex};

/// Offset of the earliest possible ETX byte after STX (empty payload).
const FIRST_ETX_OFFSET: usize = 3;

/// Offset of the latest possible ETX byte after STX (full payload).
const LAST_ETX_OFFSET: usize = FIRST_ETX_OFFSET + MAX_PAYLOAD_LEN;

/// Tokio codec for KR-CU16 frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cu16Codec {
    _private: (),
}

impl Cu16Codec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything before the next STX. Returns false when none is buffered.
    fn skip_to_stx(src: &mut BytesMut) -> bool {
        match src.iter().position(|b| *b == STX) {
            Some(0) => true,
            Some(offset) => {
                trace!(skipped = %hex(&src[..offset]), "Discarding bytes before STX");
                src.advance(offset);
                true
            }
            None => {
                if !src.is_empty() {
                    trace!(skipped = %hex(src), "Discarding bytes without STX");
                    src.clear();
                }
                false
            }
        }
    }

    /// Length of the first complete, checksum-valid frame at the head of `src`.
    ///
    /// `Ok(None)` means more bytes could still complete a frame.
    fn frame_len(src: &[u8]) -> std::result::Result<Option<usize>, usize> {
        for etx_at in FIRST_ETX_OFFSET..=LAST_ETX_OFFSET {
            let Some(&sum) = src.get(etx_at + 1) else {
                return Ok(None);
            };
            if src[etx_at] == ETX && checksum(&src[..=etx_at]) == sum {
                return Ok(Some(etx_at + 2));
            }
        }

        // No valid frame in the window: reject up to the first plausible end
        // marker, or just the STX when there is none.
        let rejected = (FIRST_ETX_OFFSET..=LAST_ETX_OFFSET)
            .find(|&at| src[at] == ETX)
            .map(|at| at + 2)
            .unwrap_or(1);
        Err(rejected)
    }
}

impl Decoder for Cu16Codec {
    type Item = Frame;
    type Error = Error;

    /// Decode the next frame from `src`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(frame))` - a complete valid frame was consumed
    /// - `Ok(None)` - more bytes are needed
    /// - `Err(Error::Frame(_))` - a complete frame failed validation; its
    ///   bytes have been consumed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !Self::skip_to_stx(src) {
            return Ok(None);
        }

        match Self::frame_len(src) {
            Ok(None) => {
                src.reserve(MAX_FRAME_LEN.saturating_sub(src.len()));
                Ok(None)
            }
            Ok(Some(len)) => {
                let bytes = src.split_to(len);
                debug!(bytes = %hex(&bytes), "Frame received");
                Ok(Some(Frame::decode(&bytes)?))
            }
            Err(len) => {
                let bytes = src.split_to(len);
                debug!(bytes = %hex(&bytes), "Discarding invalid frame");
                let error = Frame::decode(&bytes)
                    .err()
                    .unwrap_or_else(|| FrameError::malformed("no end marker after STX"));
                Err(error.into())
            }
        }
    }
}

impl Encoder<Frame> for Cu16Codec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        item.encode_into(dst);
        Ok(())
    }
}

impl Encoder<&Frame> for Cu16Codec {
    type Error = Error;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<()> {
        item.encode_into(dst);
        Ok(())
    }
}
