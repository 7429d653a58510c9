use super::handshake::{AdoptedLink, LinkHandshake, ScanOutcome};
use super::LinkError;
use crate::types::ConnectionState;
use log::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectResult {
    Connected(String),
    Failed,
    Cancelled,
}

/// Owns the lifecycle of the physical link.
///
/// At most one endpoint is held at a time. The state only moves through
/// `connect`/`adopt`/`disconnect`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    state: ConnectionState,
    active: Option<AdoptedLink>,
    scratch: Vec<u8>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Run one full scan pass over `candidates` on the calling thread.
    ///
    /// Any currently held endpoint is released first, so a new call always
    /// rescans from the first candidate.
    pub fn connect(&mut self, handshake: &LinkHandshake<'_>, candidates: &[String]) -> ConnectResult {
        self.disconnect();

        let report = handshake.scan(candidates, &crossbeam_channel::never(), |candidate| {
            self.state = ConnectionState::Scanning(candidate.to_string());
        });

        self.adopt(report.outcome)
    }

    /// Record that `candidate` is being probed by a scan running elsewhere
    pub fn mark_scanning(&mut self, candidate: &str) {
        if self.active.is_none() {
            self.state = ConnectionState::Scanning(candidate.to_string());
        }
    }

    /// Apply the outcome of a scan
    pub fn adopt(&mut self, outcome: ScanOutcome) -> ConnectResult {
        match outcome {
            ScanOutcome::Connected(adopted) => {
                self.disconnect();
                let endpoint = adopted.endpoint().to_string();
                info!("Adopted controller link on {endpoint}");
                self.state = ConnectionState::Connected(endpoint.clone());
                self.active = Some(adopted);
                ConnectResult::Connected(endpoint)
            }
            ScanOutcome::Failed => {
                if self.active.is_none() {
                    self.state = ConnectionState::Disconnected;
                }
                ConnectResult::Failed
            }
            ScanOutcome::Cancelled => {
                if self.active.is_none() {
                    self.state = ConnectionState::Disconnected;
                }
                ConnectResult::Cancelled
            }
        }
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let active = self.active.as_mut().ok_or(LinkError::NotConnected)?;
        debug!("-> {}: {:?}", active.endpoint(), String::from_utf8_lossy(bytes));
        active.link.write_all(bytes)
    }

    /// Next complete line from the controller, if one has arrived.
    ///
    /// Never blocks. Returns `Ok(None)` when nothing is buffered or when no
    /// link is held.
    pub fn poll_line(&mut self) -> Result<Option<String>, LinkError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };

        if let Some(line) = active.lines.next_line() {
            return Ok(Some(line));
        }

        self.scratch.clear();
        if active.link.read_available(&mut self.scratch)? > 0 {
            active.lines.push(&self.scratch);
        }

        Ok(active.lines.next_line())
    }

    /// Release the endpoint. Returns the endpoint that was released, if any.
    pub fn disconnect(&mut self) -> Option<String> {
        self.state = ConnectionState::Disconnected;
        let released = self.active.take().map(|adopted| adopted.endpoint().to_string());
        if let Some(endpoint) = &released {
            info!("Released controller link on {endpoint}");
        }
        released
    }
}
