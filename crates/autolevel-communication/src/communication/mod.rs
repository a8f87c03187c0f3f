//! Controller connections
//!
//! A [`Transport`] is a raw byte stream to the controller. [`LineReader`]
//! turns its reads into the newline terminated replies GRBL sends.

pub mod serial;

use autolevel_core::{ConnectionError, Result};
use serde::{Deserialize, Serialize};
use std::io;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a controller connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// How long a single read may block waiting for data
    pub read_timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            read_timeout_ms: 500,
        }
    }
}

impl ConnectionParams {
    /// 8N1 parameters for a port
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Set the read timeout
    pub fn with_read_timeout(mut self, read_timeout_ms: u64) -> Self {
        self.read_timeout_ms = read_timeout_ms;
        self
    }
}

/// Byte stream to a motion controller
///
/// `read` returning `Ok(0)` or an error of kind `TimedOut`/`WouldBlock`
/// means no data arrived within the transport's read timeout.
pub trait Transport: Send {
    /// Write data to the connection
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read data from the connection
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the connection name
    fn name(&self) -> String;

    /// Close the connection
    fn close(&mut self) -> io::Result<()>;

    /// Write one command line, appending the newline
    fn write_line(&mut self, line: &str) -> Result<()> {
        let data = format!("{}\n", line);
        let mut remaining = data.as_bytes();
        while !remaining.is_empty() {
            match self.write(remaining) {
                Ok(0) => {
                    return Err(ConnectionError::ConnectionLost {
                        reason: format!("{} accepted no data", self.name()),
                    }
                    .into())
                }
                Ok(n) => remaining = &remaining[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(ConnectionError::Io {
                        port: self.name(),
                        reason: e.to_string(),
                    }
                    .into())
                }
            }
        }
        tracing::debug!(target: "autolevel::tx", "{}", line);
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Assembles complete lines from a transport's reads
#[derive(Debug, Default)]
pub struct LineReader {
    buffer: Vec<u8>,
}

impl LineReader {
    const READ_CHUNK: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes received but not yet terminated by a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Return the next complete line, reading at most once from the transport
    ///
    /// `Ok(None)` means no complete line is available yet. Line endings
    /// (`\n` or `\r\n`) are stripped.
    pub fn read_line<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; Self::READ_CHUNK];
        match transport.read(&mut chunk) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(self.take_line())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(ConnectionError::Io {
                port: transport.name(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..pos]);
        Some(line.trim_end_matches('\r').to_string())
    }
}
