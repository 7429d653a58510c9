use thiserror::Error;

use crate::link::LinkError;

#[derive(Error, Debug)]
pub enum SortlineError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
    #[error("Protocol mismatch on {endpoint}: unexpected response {response:?}")]
    ProtocolMismatch { endpoint: String, response: String },
    #[error("State violation: {0}")]
    StateViolation(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Controller is no longer running")]
    ControllerUnavailable,
    #[error("Failed to start background thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl SortlineError {
    /// Link faults and handshake mismatches are recovered the same way.
    pub fn is_link_fault(&self) -> bool {
        matches!(self, Self::Link(_) | Self::ProtocolMismatch { .. })
    }
}
