//! Physical link to the sorting controller
//!
//! The link is a line-oriented text channel. [`LinkOpener`] abstracts how an
//! endpoint is opened (a serial port in production, an in-memory peer in
//! tests), [`handshake`] decides whether an opened endpoint really is the
//! sorting controller, and [`ConnectionManager`] owns the adopted link.

use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

pub mod handshake;
pub mod manager;
pub mod protocol;
pub mod serial;

#[cfg(test)]
pub(crate) mod memory;

pub use handshake::{AdoptedLink, HandshakeConfig, LinkHandshake, ScanOutcome, ScanReport};
pub use manager::{ConnectResult, ConnectionManager};
pub use protocol::{parse_line, ControllerMessage};
pub use serial::{default_candidates, SerialOpener};

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to open {endpoint}: {source}")]
    Open {
        endpoint: String,
        #[source]
        source: serialport::Error,
    },
    #[error("IO error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No controller connected")]
    NotConnected,
    #[error("Timed out waiting for {endpoint}")]
    Timeout { endpoint: String },
    #[error("Link to {endpoint} was closed by the peer")]
    Closed { endpoint: String },
}

/// Duplex byte channel to one endpoint. Dropping the link closes it.
pub trait Link: Send {
    fn endpoint(&self) -> &str;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Append whatever the peer has already sent to `buf` without blocking.
    ///
    /// Returns the number of bytes appended (zero when nothing is pending).
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, LinkError>;
}

/// Opens candidate endpoints by name
pub trait LinkOpener: Send + Sync {
    fn open(&self, endpoint: &str, timeout: Duration) -> Result<Box<dyn Link>, LinkError>;

    /// Endpoints worth probing when no candidate list is configured
    fn discover(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Splits raw link bytes into trimmed, non-empty text lines.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, so a
/// noisy line never stalls the lines behind it.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
    lines: VecDeque<String>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.partial);
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if !line.is_empty() {
                    self.lines.push_back(line);
                }
            } else {
                self.partial.push(byte);
            }
        }
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    /// Bytes received since the last line terminator
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }
}
