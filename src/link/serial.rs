use super::{Link, LinkError, LinkOpener};
use log::{debug, warn};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Baud rate of the controller firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Opens serial ports at a fixed baud rate
#[derive(Debug, Clone)]
pub struct SerialOpener {
    baud_rate: u32,
}

impl SerialOpener {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl Default for SerialOpener {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

impl LinkOpener for SerialOpener {
    fn open(&self, endpoint: &str, timeout: Duration) -> Result<Box<dyn Link>, LinkError> {
        debug!("Opening {endpoint} at {} baud", self.baud_rate);

        let port = serialport::new(endpoint, self.baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| match source.kind() {
                serialport::ErrorKind::Io(ErrorKind::TimedOut) => LinkError::Timeout {
                    endpoint: endpoint.to_string(),
                },
                _ => LinkError::Open {
                    endpoint: endpoint.to_string(),
                    source,
                },
            })?;

        Ok(Box::new(SerialLink {
            endpoint: endpoint.to_string(),
            port,
        }))
    }

    fn discover(&self) -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                warn!("Failed to enumerate serial ports: {e}");
                Vec::new()
            }
        }
    }
}

/// Candidate ports tried when the configuration does not name any
pub fn default_candidates() -> Vec<String> {
    if cfg!(windows) {
        (1..=6).map(|n| format!("COM{n}")).collect()
    } else {
        ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyACM0", "/dev/ttyACM1"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

pub struct SerialLink {
    endpoint: String,
    port: Box<dyn SerialPort>,
}

impl Link for SerialLink {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.port
            .write_all(bytes)
            .and_then(|_| self.port.flush())
            .map_err(|source| LinkError::Io {
                context: format!("Writing to {}", self.endpoint),
                source,
            })
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, LinkError> {
        let pending = self.port.bytes_to_read().map_err(|e| LinkError::Io {
            context: format!("Querying pending bytes on {}", self.endpoint),
            source: e.into(),
        })? as usize;

        if pending == 0 {
            return Ok(0);
        }

        let start = buf.len();
        buf.resize(start + pending, 0);

        match self.port.read(&mut buf[start..]) {
            Ok(0) => {
                buf.truncate(start);
                Err(LinkError::Closed {
                    endpoint: self.endpoint.clone(),
                })
            }
            Ok(n) => {
                buf.truncate(start + n);
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                buf.truncate(start);
                Ok(0)
            }
            Err(source) => {
                buf.truncate(start);
                Err(LinkError::Io {
                    context: format!("Reading from {}", self.endpoint),
                    source,
                })
            }
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        debug!("Closing {}", self.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_candidates_are_ordered() {
        let candidates = default_candidates();
        assert!(!candidates.is_empty());
        if cfg!(windows) {
            assert_eq!(candidates.first().map(String::as_str), Some("COM1"));
            assert_eq!(candidates.last().map(String::as_str), Some("COM6"));
        } else {
            assert_eq!(candidates.first().map(String::as_str), Some("/dev/ttyUSB0"));
        }
    }

    #[test]
    fn test_open_missing_port_reports_endpoint() {
        let opener = SerialOpener::default();
        match opener.open("/nonexistent/sortline-port", Duration::from_millis(10)) {
            Err(LinkError::Open { endpoint, .. }) => {
                assert_eq!(endpoint, "/nonexistent/sortline-port")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing port must fail"),
        }
    }
}
