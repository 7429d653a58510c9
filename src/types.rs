use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Object-size category the line is configured to classify for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    #[default]
    Small,
    Large,
}

impl ClassificationMode {
    pub fn flipped(self) -> Self {
        match self {
            ClassificationMode::Small => ClassificationMode::Large,
            ClassificationMode::Large => ClassificationMode::Small,
        }
    }

    /// Category of the objects diverted while this mode is active
    pub fn category(self) -> Category {
        match self {
            ClassificationMode::Small => Category::Small,
            ClassificationMode::Large => Category::Large,
        }
    }
}

impl fmt::Display for ClassificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationMode::Small => write!(f, "MODE 1 (small objects)"),
            ClassificationMode::Large => write!(f, "MODE 2 (large objects)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Small,
    Large,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Small => write!(f, "SMALL"),
            Category::Large => write!(f, "LARGE"),
        }
    }
}

/// A single detected-and-categorized object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationEvent {
    pub category: Category,
    pub timestamp: DateTime<Local>,
}

impl ClassificationEvent {
    pub fn now(category: Category) -> Self {
        Self {
            category,
            timestamp: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorState {
    #[default]
    Idle,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "endpoint", rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Scanning(String),
    Connected(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ConnectionState::Connected(endpoint) => Some(endpoint),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Scanning(candidate) => write!(f, "SCANNING {candidate}"),
            ConnectionState::Connected(endpoint) => write!(f, "CONNECTED {endpoint}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Counters {
    pub small: u64,
    pub large: u64,
}

impl Counters {
    pub fn total(&self) -> u64 {
        self.small + self.large
    }
}

/// Derived indicators, recomputed on every poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KpiSnapshot {
    pub throughput_per_minute: f64,
    pub uptime: Duration,
    pub efficiency_percent: u8,
}

impl Default for KpiSnapshot {
    fn default() -> Self {
        Self {
            throughput_per_minute: 0.0,
            uptime: Duration::ZERO,
            efficiency_percent: 100,
        }
    }
}

impl KpiSnapshot {
    /// Uptime as `HH:MM:SS`
    pub fn uptime_hms(&self) -> String {
        let secs = self.uptime.as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    /// True when the two snapshots would print differently.
    ///
    /// Throughput is compared at one decimal, uptime in whole seconds.
    pub fn differs_for_display(&self, other: &KpiSnapshot) -> bool {
        let tenths = |x: f64| (x * 10.0).round();
        self.uptime.as_secs() != other.uptime.as_secs()
            || self.efficiency_percent != other.efficiency_percent
            || tenths(self.throughput_per_minute) != tenths(other.throughput_per_minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub text: String,
    pub severity: Severity,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}
