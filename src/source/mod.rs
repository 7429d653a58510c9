//! Producers of classification events
//!
//! Exactly one source feeds the controller at a time: the adopted hardware
//! link or the simulator. [`ActiveSource`] holds whichever is live and fully
//! stops it before another one takes over.

pub mod hardware;
pub mod simulated;

pub use hardware::HardwareEventSource;
pub use simulated::{SimulatedEventSource, SimulationConfig};

use crate::link::ConnectionManager;
use crate::types::{ClassificationEvent, ClassificationMode};
use serde::Serialize;

/// One unit of input from a source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSignal {
    Classified(ClassificationEvent),
    ActuatorActive,
    ActuatorIdle,
    ModeReport(ClassificationMode),
    Acknowledged,
    /// Forwarded to the event log verbatim
    Unrecognized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Idle,
    Hardware,
    Simulated,
}

#[derive(Debug, Default)]
pub enum ActiveSource {
    #[default]
    Idle,
    Hardware(HardwareEventSource),
    Simulated(SimulatedEventSource),
}

impl ActiveSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ActiveSource::Idle => SourceKind::Idle,
            ActiveSource::Hardware(_) => SourceKind::Hardware,
            ActiveSource::Simulated(_) => SourceKind::Simulated,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, ActiveSource::Idle)
    }

    pub fn hardware(&self) -> Option<&HardwareEventSource> {
        match self {
            ActiveSource::Hardware(source) => Some(source),
            _ => None,
        }
    }

    pub fn simulated(&self) -> Option<&SimulatedEventSource> {
        match self {
            ActiveSource::Simulated(source) => Some(source),
            _ => None,
        }
    }

    /// Stop whatever is running and return to idle.
    ///
    /// The simulator thread is joined; a hardware source releases its link
    /// through `manager`. Returns the kind that was stopped.
    pub fn stop(&mut self, manager: &mut ConnectionManager) -> SourceKind {
        let previous = std::mem::take(self);
        let kind = previous.kind();
        match previous {
            ActiveSource::Idle => {}
            ActiveSource::Hardware(_) => {
                manager.disconnect();
            }
            ActiveSource::Simulated(mut sim) => sim.stop(),
        }
        kind
    }
}
