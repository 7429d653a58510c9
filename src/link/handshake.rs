use super::protocol::{is_acknowledgment, TOGGLE_COMMAND};
use super::{LineBuffer, Link, LinkOpener};
use crate::error::SortlineError;
use crate::utils::sleep_unless_cancelled;
use crossbeam_channel::Receiver;
use log::{debug, info};
use std::fmt;
use std::time::{Duration, Instant};

/// Open/read timeout for a candidate endpoint (ms)
const OPEN_TIMEOUT_MS: u64 = 1000;

/// Time the controller needs to reboot after its port is opened (ms).
/// Opening the port resets the board, so nothing is sent before this elapses.
const SETTLE_TIME_MS: u64 = 2000;

/// Window between sending the probe and reading the reply (ms)
const PROBE_WINDOW_MS: u64 = 500;

const LINE_COMPLETION_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub open_timeout: Duration,
    pub settle_time: Duration,
    pub probe_window: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_millis(OPEN_TIMEOUT_MS),
            settle_time: Duration::from_millis(SETTLE_TIME_MS),
            probe_window: Duration::from_millis(PROBE_WINDOW_MS),
        }
    }
}

/// A link whose peer acknowledged the probe, plus any lines it sent after
/// the acknowledgment.
pub struct AdoptedLink {
    pub link: Box<dyn Link>,
    pub lines: LineBuffer,
}

impl AdoptedLink {
    pub fn endpoint(&self) -> &str {
        self.link.endpoint()
    }
}

impl fmt::Debug for AdoptedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdoptedLink")
            .field("endpoint", &self.endpoint())
            .field("pending_lines", &self.lines.pending_lines())
            .finish()
    }
}

#[derive(Debug)]
pub enum ScanOutcome {
    Connected(AdoptedLink),
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub struct ScanReport {
    /// Candidates opened (or attempted) in order
    pub attempted: Vec<String>,
    pub outcome: ScanOutcome,
}

/// Confirms that an endpoint is the sorting controller.
///
/// The probe is the toggle command itself: the firmware answers it with an
/// acknowledgment line. A side effect is that a successful probe flips the
/// controller's mode; the mode line that follows is kept for the caller.
pub struct LinkHandshake<'a> {
    opener: &'a dyn LinkOpener,
    config: HandshakeConfig,
}

impl<'a> LinkHandshake<'a> {
    pub fn new(opener: &'a dyn LinkOpener, config: HandshakeConfig) -> Self {
        Self { opener, config }
    }

    /// Open `endpoint`, wait for it to settle, send the probe and check the reply.
    ///
    /// The endpoint is closed again on every failure path.
    pub fn probe(
        &self,
        endpoint: &str,
        cancel: &Receiver<()>,
    ) -> Result<AdoptedLink, SortlineError> {
        let mut link = self.opener.open(endpoint, self.config.open_timeout)?;

        if !sleep_unless_cancelled(cancel, self.config.settle_time) {
            return Err(SortlineError::Cancelled);
        }

        link.write_all(TOGGLE_COMMAND)?;

        if !sleep_unless_cancelled(cancel, self.config.probe_window) {
            return Err(SortlineError::Cancelled);
        }

        let mut raw = Vec::new();
        link.read_available(&mut raw)?;

        let mut lines = LineBuffer::new();
        lines.push(&raw);

        // A reply cut off mid-line gets up to the read timeout to finish
        let deadline = Instant::now() + self.config.open_timeout;
        while lines.pending_lines() == 0 && lines.has_partial() && Instant::now() < deadline {
            if !sleep_unless_cancelled(cancel, LINE_COMPLETION_POLL) {
                return Err(SortlineError::Cancelled);
            }
            raw.clear();
            link.read_available(&mut raw)?;
            lines.push(&raw);
        }

        let response = lines.next_line().unwrap_or_default();
        debug!("Probe reply from {endpoint}: {response:?}");

        if is_acknowledgment(&response) {
            Ok(AdoptedLink { link, lines })
        } else {
            Err(SortlineError::ProtocolMismatch {
                endpoint: endpoint.to_string(),
                response,
            })
        }
    }

    /// Probe `candidates` in order and stop at the first one that acknowledges.
    ///
    /// Candidates that fail for any reason are skipped silently; only the
    /// aggregate outcome is reported. `on_attempt` runs before each probe.
    pub fn scan<F>(&self, candidates: &[String], cancel: &Receiver<()>, mut on_attempt: F) -> ScanReport
    where
        F: FnMut(&str),
    {
        let mut attempted = Vec::new();

        for candidate in candidates {
            on_attempt(candidate);
            attempted.push(candidate.clone());

            match self.probe(candidate, cancel) {
                Ok(adopted) => {
                    info!("Controller acknowledged on {candidate}");
                    return ScanReport {
                        attempted,
                        outcome: ScanOutcome::Connected(adopted),
                    };
                }
                Err(SortlineError::Cancelled) => {
                    info!("Scan cancelled while probing {candidate}");
                    return ScanReport {
                        attempted,
                        outcome: ScanOutcome::Cancelled,
                    };
                }
                Err(e) => debug!("Skipping {candidate}: {e}"),
            }
        }

        ScanReport {
            attempted,
            outcome: ScanOutcome::Failed,
        }
    }
}
