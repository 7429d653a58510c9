pub mod actuator;
pub mod controller;
pub mod error;
pub mod event_log;
pub mod link;
pub mod mode;
pub mod source;
pub mod statistics;
pub mod types;
pub mod utils;

pub use actuator::ActuatorTracker;
pub use controller::{
    Command, ControllerConfig, CoreEvent, SortingController, StatusSnapshot,
};
pub use error::SortlineError;
pub use event_log::EventLog;
pub use link::{
    ConnectionManager, HandshakeConfig, LinkError, LinkHandshake, LinkOpener,
    SerialOpener,
};
pub use mode::ModeController;
pub use source::{
    ActiveSource, HardwareEventSource, SimulatedEventSource, SimulationConfig,
    SourceKind,
};
pub use statistics::{HistorySample, StatisticsAggregator};
pub use types::{
    ActuatorState, Category, ClassificationEvent, ClassificationMode,
    ConnectionState, Counters, KpiSnapshot, LogEntry, Severity,
};
