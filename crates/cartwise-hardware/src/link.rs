//! Serial link with retry and port recovery.
//!
//! The KR-CU16 sits behind cheap USB RS-485 adapters whose drivers can stop
//! moving bytes without reporting an error. [`LinkSession`] hides that behind
//! one call, [`LinkSession::transact`], which either returns reply bytes or a
//! [`LinkError`] once its retries are used up.
//!
//! # Attempt Cycle
//!
//! ```text
//! ensure_ready ─► clear buffers ─► write + flush ─► settle ─► read
//!      │                                                      │
//!      │ probe fails: close, wait, reopen                     │ empty: close, wait, reopen, retry
//!      ▼                                                      ▼
//! ```
//!
//! The settle delay grows with the attempt number (100 ms, 150 ms, 200 ms
//! by default). All delays live in [`LinkConfig`] so tests can zero them.
//!
//! Every call blocks the current thread. The link is meant to be owned by a
//! single thread (see [`crate::actor`]), which also keeps frames from two
//! callers from interleaving on the half-duplex bus.

use std::io;
use std::thread;
use std::time::Duration;

use cartwise_core::constants::*;
use cartwise_protocol::hex;
use tracing::{debug, error, info, warn};

use crate::error::LinkError;

/// One open serial port.
pub trait SerialLink: Send {
    /// Write every byte of `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Read until `buf` is full or the port's read timeout expires.
    /// Returns the number of bytes read; zero means silence.
    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> io::Result<()>;

    /// Zero-length write used to detect a frozen driver.
    fn probe(&mut self) -> io::Result<()>;
}

/// Opens ports for a [`LinkSession`].
pub trait PortOpener: Send {
    type Port: SerialLink;

    fn open(&mut self, settings: &PortSettings) -> Result<Self::Port, LinkError>;
}

/// Where and how to open the port. Framing is always 8N1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    pub path: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl PortSettings {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// Retry policy and delays of a [`LinkSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Attempts per transaction.
    pub max_retries: u32,

    /// Settle delay before the first read.
    pub settle_base: Duration,

    /// Extra settle delay added per retry.
    pub settle_step: Duration,

    /// Pause between closing and reopening a port whose probe failed.
    pub reopen_delay: Duration,

    /// Pause between closing and reopening after a silent attempt or I/O error.
    pub recovery_delay: Duration,

    /// Pause after reopening before the next attempt.
    pub post_reopen_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            settle_base: Duration::from_millis(SETTLE_BASE_MS),
            settle_step: Duration::from_millis(SETTLE_STEP_MS),
            reopen_delay: Duration::from_millis(REOPEN_DELAY_MS),
            recovery_delay: Duration::from_millis(300),
            post_reopen_delay: Duration::from_millis(REOPEN_DELAY_MS),
        }
    }
}

impl LinkConfig {
    /// Same retry policy with every delay set to zero.
    pub fn without_delays() -> Self {
        Self {
            settle_base: Duration::ZERO,
            settle_step: Duration::ZERO,
            reopen_delay: Duration::ZERO,
            recovery_delay: Duration::ZERO,
            post_reopen_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Settle delay before reading on the given zero-based attempt.
    pub fn settle_delay(&self, attempt: u32) -> Duration {
        self.settle_base + self.settle_step * attempt
    }

    /// Upper bound for one transaction with `read_timeout` per read.
    pub fn worst_case_latency(&self, read_timeout: Duration) -> Duration {
        let attempts = self.max_retries.max(1);
        let per_attempt: Duration = (0..attempts)
            .map(|attempt| self.reopen_delay + self.settle_delay(attempt) + read_timeout)
            .sum();
        let recoveries = (self.recovery_delay + self.post_reopen_delay) * (attempts - 1);
        per_attempt + recoveries
    }
}

/// Owner of one serial port and its recovery logic.
pub struct LinkSession<O: PortOpener> {
    opener: O,
    settings: PortSettings,
    config: LinkConfig,
    port: Option<O::Port>,
}

impl<O: PortOpener> LinkSession<O> {
    /// Create a session. The port is opened lazily.
    pub fn new(opener: O, settings: PortSettings, config: LinkConfig) -> Self {
        Self {
            opener,
            settings,
            config,
            port: None,
        }
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Open the port now if it is closed.
    ///
    /// # Errors
    /// Returns `LinkError::PortUnavailable` if the device cannot be opened.
    pub fn open(&mut self) -> Result<(), LinkError> {
        if self.port.is_none() {
            self.port = Some(self.opener.open(&self.settings)?);
            info!(
                port = %self.settings.path,
                baud = self.settings.baud_rate,
                "Serial port opened"
            );
        }
        Ok(())
    }

    /// Close the port. The next transaction reopens it.
    pub fn disconnect(&mut self) {
        if self.port.take().is_some() {
            info!(port = %self.settings.path, "Serial port closed");
        }
    }

    /// Change the baud rate. Takes effect when the port is next opened.
    pub fn set_baud_rate(&mut self, baud_rate: u32) {
        if self.settings.baud_rate != baud_rate {
            self.settings.baud_rate = baud_rate;
            self.disconnect();
        }
    }

    /// Make sure an open, responsive port is available.
    ///
    /// A closed port is opened. An open port gets a zero-length write; if that
    /// fails the port is closed and, after `reopen_delay`, opened again with the
    /// same settings.
    ///
    /// # Errors
    /// - `LinkError::PortUnavailable` when a closed port cannot be opened
    /// - `LinkError::Frozen` when a frozen port cannot be reopened
    pub fn ensure_ready(&mut self) -> Result<(), LinkError> {
        let Some(port) = self.port.as_mut() else {
            return self.open();
        };

        let probe = port.probe().and_then(|_| port.flush());
        if let Err(e) = probe {
            warn!(port = %self.settings.path, error = %e, "Serial port seems frozen, reopening");
            self.port = None;
            thread::sleep(self.config.reopen_delay);
            let reopened = self
                .opener
                .open(&self.settings)
                .map_err(|e| LinkError::frozen(e.to_string()))?;
            self.port = Some(reopened);
            info!(port = %self.settings.path, "Serial port reopened after freeze");
        }
        Ok(())
    }

    /// Send `request` and read up to `expected_len` reply bytes, using the
    /// configured retry count.
    pub fn transact(&mut self, request: &[u8], expected_len: usize) -> Result<Vec<u8>, LinkError> {
        self.transact_with_retries(request, expected_len, self.config.max_retries)
    }

    /// Send `request` and read up to `expected_len` reply bytes.
    ///
    /// A non-empty reply is returned as is; validating it is the caller's job.
    ///
    /// # Errors
    /// - `LinkError::Timeout` when the request was written at least once but
    ///   no attempt produced a reply
    /// - the last `PortUnavailable`/`Frozen` error when the request could
    ///   never be written
    pub fn transact_with_retries(
        &mut self,
        request: &[u8],
        expected_len: usize,
        max_retries: u32,
    ) -> Result<Vec<u8>, LinkError> {
        let attempts = max_retries.max(1);
        let mut transmitted = false;
        let mut last_error = None;

        for attempt in 0..attempts {
            let last = attempt + 1 == attempts;

            if let Err(e) = self.ensure_ready() {
                warn!(attempt = attempt + 1, attempts, error = %e, "Serial port not ready");
                last_error = Some(e);
                if !last {
                    thread::sleep(self.config.recovery_delay);
                }
                continue;
            }

            match self.attempt(request, expected_len, attempt, &mut transmitted) {
                Ok(reply) if !reply.is_empty() => return Ok(reply),
                Ok(_) => {
                    warn!(attempt = attempt + 1, attempts, "No response from controller");
                    if !last {
                        self.reset_port();
                    }
                }
                Err(e) => {
                    error!(attempt = attempt + 1, attempts, error = %e, "Serial I/O error");
                    self.port = None;
                    if !last {
                        thread::sleep(self.config.recovery_delay);
                    }
                }
            }
        }

        if transmitted {
            error!(attempts, request = %hex(request), "All attempts failed, controller not responding");
            Err(LinkError::Timeout { attempts })
        } else {
            Err(last_error.unwrap_or(LinkError::Timeout { attempts }))
        }
    }

    /// Read up to `max_len` more bytes of a reply already in progress,
    /// without writing anything. Empty when the port is closed or silent.
    pub fn read_more(&mut self, max_len: usize) -> Vec<u8> {
        let Some(port) = self.port.as_mut() else {
            return Vec::new();
        };
        let mut rest = vec![0u8; max_len];
        match port.read_up_to(&mut rest) {
            Ok(read) => {
                rest.truncate(read);
                debug!(bytes = %hex(&rest), "<< received (continued)");
                rest
            }
            Err(e) => {
                warn!(error = %e, "Serial read failed");
                Vec::new()
            }
        }
    }

    fn attempt(
        &mut self,
        request: &[u8],
        expected_len: usize,
        attempt: u32,
        transmitted: &mut bool,
    ) -> io::Result<Vec<u8>> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))?;

        port.clear_buffers()?;
        port.write_all(request)?;
        port.flush()?;
        *transmitted = true;
        debug!(bytes = %hex(request), attempt = attempt + 1, ">> sent");

        thread::sleep(self.config.settle_delay(attempt));

        let mut reply = vec![0u8; expected_len];
        let read = port.read_up_to(&mut reply)?;
        reply.truncate(read);
        debug!(bytes = %hex(&reply), "<< received");
        Ok(reply)
    }

    /// Close and reopen the port after a silent attempt.
    fn reset_port(&mut self) {
        info!(port = %self.settings.path, "Resetting port before retry");
        self.port = None;
        thread::sleep(self.config.recovery_delay);
        match self.opener.open(&self.settings) {
            Ok(port) => {
                self.port = Some(port);
                thread::sleep(self.config.post_reopen_delay);
            }
            Err(e) => error!(error = %e, "Port reset failed"),
        }
    }
}

impl<O: PortOpener> Drop for LinkSession<O> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
