//! In-memory stand-in for the controller firmware, used by tests.

use super::protocol::TOGGLE_COMMAND;
use super::{Link, LinkError, LinkOpener};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct PeerState {
    written: Vec<u8>,
    outbound: VecDeque<u8>,
    toggle_replies: Vec<String>,
    open: bool,
    open_count: usize,
    broken: bool,
    panic_on_read: bool,
}

/// Scripted peer. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryPeer {
    state: Arc<Mutex<PeerState>>,
}

impl MemoryPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines the peer sends back every time it receives the toggle command
    pub fn reply_to_toggle(self, lines: &[&str]) -> Self {
        self.state.lock().toggle_replies = lines.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn send_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.outbound.extend(line.as_bytes());
        state.outbound.push_back(b'\n');
    }

    /// Make every further read or write fail
    pub fn break_link(&self) {
        self.state.lock().broken = true;
    }

    /// Make every further read panic instead of returning
    pub fn panic_on_read(&self, enabled: bool) {
        self.state.lock().panic_on_read = enabled;
    }

    /// Queue bytes exactly as given, without a line terminator
    pub fn send_raw(&self, bytes: &[u8]) {
        self.state.lock().outbound.extend(bytes);
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

#[derive(Default)]
pub struct MemoryOpener {
    peers: HashMap<String, MemoryPeer>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(mut self, endpoint: &str, peer: MemoryPeer) -> Self {
        self.peers.insert(endpoint.to_string(), peer);
        self
    }
}

impl LinkOpener for MemoryOpener {
    fn open(&self, endpoint: &str, _timeout: Duration) -> Result<Box<dyn Link>, LinkError> {
        let peer = self.peers.get(endpoint).ok_or_else(|| LinkError::Open {
            endpoint: endpoint.to_string(),
            source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"),
        })?;

        {
            let mut state = peer.state.lock();
            state.open = true;
            state.open_count += 1;
        }

        Ok(Box::new(MemoryLink {
            endpoint: endpoint.to_string(),
            peer: peer.clone(),
        }))
    }

    fn discover(&self) -> Vec<String> {
        let mut names: Vec<String> = self.peers.keys().cloned().collect();
        names.sort();
        names
    }
}

struct MemoryLink {
    endpoint: String,
    peer: MemoryPeer,
}

impl Link for MemoryLink {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut state = self.peer.state.lock();
        if state.broken {
            return Err(LinkError::Closed {
                endpoint: self.endpoint.clone(),
            });
        }
        state.written.extend_from_slice(bytes);

        if bytes == TOGGLE_COMMAND {
            let replies = state.toggle_replies.clone();
            for line in replies {
                state.outbound.extend(line.as_bytes());
                state.outbound.push_back(b'\n');
            }
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, LinkError> {
        let mut state = self.peer.state.lock();
        if state.panic_on_read {
            drop(state);
            panic!("scripted read failure on {}", self.endpoint);
        }
        if state.broken {
            return Err(LinkError::Closed {
                endpoint: self.endpoint.clone(),
            });
        }
        let n = state.outbound.len();
        buf.extend(state.outbound.drain(..));
        Ok(n)
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.peer.state.lock().open = false;
    }
}
