use crate::types::{LogEntry, Severity};
use chrono::Local;
use std::collections::VecDeque;

pub const DEFAULT_LOG_CAPACITY: usize = 100;

const ERROR_MARKERS: [&str; 3] = ["error", "failed", "❌"];
const SUCCESS_MARKERS: [&str; 3] = ["✅", "connected", "started"];

/// Guess a display severity from message text.
///
/// Decorative only. Nothing in the core branches on the result.
pub fn infer_severity(text: &str) -> Severity {
    let lower = text.to_lowercase();
    if ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        Severity::Error
    } else if SUCCESS_MARKERS.iter().any(|m| lower.contains(m)) {
        Severity::Info
    } else {
        Severity::Warn
    }
}

/// Bounded, ordered log of system messages for display.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append with a severity guessed from the text
    pub fn append(&mut self, text: impl Into<String>) -> &LogEntry {
        let text = text.into();
        let severity = infer_severity(&text);
        self.append_with(text, severity)
    }

    pub fn append_with(&mut self, text: impl Into<String>, severity: Severity) -> &LogEntry {
        let text = text.into();
        match severity {
            Severity::Info => log::info!("{text}"),
            Severity::Warn => log::warn!("{text}"),
            Severity::Error => log::error!("{text}"),
        }

        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            text,
            severity,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }

        // Just pushed, so never empty
        &self.entries[self.entries.len() - 1]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest entry first
    pub fn entries(&self) -> &VecDeque<LogEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
