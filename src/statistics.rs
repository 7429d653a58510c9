use crate::types::{Category, ClassificationEvent, Counters, KpiSnapshot};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of counter snapshots kept for trend display
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Largest deduction the efficiency indicator applies
const EFFICIENCY_SPREAD: f64 = 5.0;

/// Counters as they were right after one recorded event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySample {
    pub counters: Counters,
    pub timestamp: DateTime<Local>,
    #[serde(skip_serializing)]
    pub recorded_at: Instant,
}

#[derive(Debug)]
pub struct StatisticsAggregator {
    counters: Counters,
    history: VecDeque<HistorySample>,
    capacity: usize,
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl StatisticsAggregator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            counters: Counters::default(),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Oldest sample first
    pub fn history(&self) -> &VecDeque<HistorySample> {
        &self.history
    }

    pub fn record(&mut self, event: &ClassificationEvent) -> Counters {
        self.record_at(event, Instant::now())
    }

    /// Count `event` and append a snapshot taken at `now`
    pub fn record_at(&mut self, event: &ClassificationEvent, now: Instant) -> Counters {
        match event.category {
            Category::Small => self.counters.small += 1,
            Category::Large => self.counters.large += 1,
        }

        self.history.push_back(HistorySample {
            counters: self.counters,
            timestamp: event.timestamp,
            recorded_at: now,
        });
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        self.counters
    }

    /// Zero both counters and drop the history in one step
    pub fn reset(&mut self) {
        self.counters = Counters::default();
        self.history.clear();
    }

    pub fn kpis(&self, now: Instant, start: Instant, active: bool) -> KpiSnapshot {
        let uptime = now.saturating_duration_since(start);
        let minutes = (uptime.as_secs_f64() / 60.0).max(1.0);

        KpiSnapshot {
            throughput_per_minute: self.counters.total() as f64 / minutes,
            uptime,
            efficiency_percent: if active { self.efficiency() } else { 100 },
        }
    }

    /// Arrival regularity indicator in [95, 100]; steadier feed scores higher
    fn efficiency(&self) -> u8 {
        let gaps: Vec<f64> = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(a, b)| b.recorded_at.saturating_duration_since(a.recorded_at))
            .map(|gap: Duration| gap.as_secs_f64())
            .collect();

        if gaps.len() < 2 {
            return 100;
        }

        let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
        if mean <= f64::EPSILON {
            return 100;
        }

        let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
        let cv = variance.sqrt() / mean;

        100 - (EFFICIENCY_SPREAD * cv.min(1.0)).round() as u8
    }
}
