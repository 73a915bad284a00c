//! `serialport` backend for [`LinkSession`](crate::link::LinkSession).

use std::io::{self, Read, Write};
use std::time::Instant;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use crate::error::LinkError;
use crate::link::{PortOpener, PortSettings, SerialLink};

/// Opens real serial devices, 8N1.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    type Port = SerialPortLink;

    fn open(&mut self, settings: &PortSettings) -> Result<Self::Port, LinkError> {
        serialport::new(&settings.path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(settings.read_timeout)
            .open()
            .map(|port| SerialPortLink {
                port,
                read_timeout: settings.read_timeout,
            })
            .map_err(|e| LinkError::port_unavailable(format!("{}: {e}", settings.path)))
    }
}

/// An open serial device.
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    read_timeout: std::time::Duration,
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = Instant::now() + self.read_timeout;
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(filled)
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    fn probe(&mut self) -> io::Result<()> {
        // `write_all` skips empty buffers; a bare `write` reaches the driver.
        self.port.write(&[]).map(|_| ())
    }
}
