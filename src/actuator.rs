use crate::types::ActuatorState;
use std::time::{Duration, Instant};

/// How long the actuator stays active after a classification (ms)
pub const DEFAULT_DWELL_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active { deadline: Instant },
}

/// Tracks the diverting actuator.
///
/// Every activation carries its own revert deadline, so an active actuator
/// always returns to idle unless something re-arms it. Deadlines are only
/// checked in [`ActuatorTracker::poll`].
#[derive(Debug)]
pub struct ActuatorTracker {
    dwell: Duration,
    phase: Phase,
}

impl Default for ActuatorTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DWELL_MS))
    }
}

impl ActuatorTracker {
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            phase: Phase::Idle,
        }
    }

    pub fn state(&self) -> ActuatorState {
        match self.phase {
            Phase::Idle => ActuatorState::Idle,
            Phase::Active { .. } => ActuatorState::Active,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Active { deadline } => Some(deadline),
        }
    }

    /// A classification event arrived. Returns the new state on a transition.
    pub fn on_classification(&mut self, now: Instant) -> Option<ActuatorState> {
        self.arm(now)
    }

    /// The controller reported that it fired the actuator
    pub fn on_hardware_active(&mut self, now: Instant) -> Option<ActuatorState> {
        self.arm(now)
    }

    /// The controller reported the actuator back at rest; overrides any deadline
    pub fn on_hardware_idle(&mut self) -> Option<ActuatorState> {
        self.release()
    }

    /// Revert to idle once the pending deadline has passed
    pub fn poll(&mut self, now: Instant) -> Option<ActuatorState> {
        match self.phase {
            Phase::Active { deadline } if now >= deadline => self.release(),
            _ => None,
        }
    }

    fn arm(&mut self, now: Instant) -> Option<ActuatorState> {
        let was_idle = self.phase == Phase::Idle;
        self.phase = Phase::Active {
            deadline: now + self.dwell,
        };
        was_idle.then_some(ActuatorState::Active)
    }

    fn release(&mut self) -> Option<ActuatorState> {
        match self.phase {
            Phase::Idle => None,
            Phase::Active { .. } => {
                self.phase = Phase::Idle;
                Some(ActuatorState::Idle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DWELL: Duration = Duration::from_secs(2);

    #[test]
    fn test_event_activates_then_reverts_once_after_dwell() {
        let mut tracker = ActuatorTracker::new(DWELL);
        let t0 = Instant::now();

        assert_eq!(tracker.on_classification(t0), Some(ActuatorState::Active));
        assert_eq!(tracker.poll(t0 + Duration::from_millis(1999)), None);
        assert_eq!(tracker.state(), ActuatorState::Active);

        let mut transitions = Vec::new();
        for step in 0..10 {
            let now = t0 + DWELL + Duration::from_millis(100 * step);
            if let Some(state) = tracker.poll(now) {
                transitions.push((state, now));
            }
        }

        assert_eq!(transitions.len(), 1);
        let (state, at) = transitions[0];
        assert_eq!(state, ActuatorState::Idle);
        assert!(at >= t0 + DWELL);
    }

    #[test]
    fn test_new_event_restarts_deadline() {
        let mut tracker = ActuatorTracker::new(DWELL);
        let t0 = Instant::now();

        tracker.on_classification(t0);
        let t1 = t0 + Duration::from_millis(1500);
        assert_eq!(tracker.on_classification(t1), None);
        assert_eq!(tracker.deadline(), Some(t1 + DWELL));

        assert_eq!(tracker.poll(t0 + DWELL), None);
        assert_eq!(tracker.poll(t1 + DWELL), Some(ActuatorState::Idle));
    }

    #[test]
    fn test_hardware_idle_overrides_pending_deadline() {
        let mut tracker = ActuatorTracker::new(DWELL);
        let t0 = Instant::now();

        tracker.on_hardware_active(t0);
        assert_eq!(tracker.on_hardware_idle(), Some(ActuatorState::Idle));
        assert_eq!(tracker.deadline(), None);
        assert_eq!(tracker.poll(t0 + DWELL), None);
        assert_eq!(tracker.on_hardware_idle(), None);
    }

    #[test]
    fn test_active_always_has_deadline() {
        let mut tracker = ActuatorTracker::default();
        let t0 = Instant::now();

        assert!(tracker.deadline().is_none());
        tracker.on_hardware_active(t0);
        assert_eq!(tracker.state(), ActuatorState::Active);
        assert_eq!(
            tracker.deadline(),
            Some(t0 + Duration::from_millis(DEFAULT_DWELL_MS))
        );
    }
}
