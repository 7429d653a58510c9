use crate::types::{Category, ClassificationEvent, ClassificationMode};
use crate::utils::sleep_unless_cancelled;
use crossbeam_channel::Sender;
use log::{debug, error, info};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;

/// Shortest and longest pause between simulated cycles at speed 1.0 (ms)
const MIN_INTERVAL_MS: u64 = 3000;
const MAX_INTERVAL_MS: u64 = 8000;

/// Chance that a cycle produces an object, per mode
const SMALL_MODE_PROBABILITY: f64 = 0.8;
const LARGE_MODE_PROBABILITY: f64 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Divides the sampled interval; clamped to [`MIN_SPEED`, `MAX_SPEED`]
    pub speed: f64,
    pub small_probability: f64,
    pub large_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(MIN_INTERVAL_MS),
            max_interval: Duration::from_millis(MAX_INTERVAL_MS),
            speed: 1.0,
            small_probability: SMALL_MODE_PROBABILITY,
            large_probability: LARGE_MODE_PROBABILITY,
        }
    }
}

impl SimulationConfig {
    /// Detection probability for `mode`, within [0, 1].
    ///
    /// A non-finite setting falls back to the built-in rate for that mode.
    pub fn probability_for(&self, mode: ClassificationMode) -> f64 {
        let (configured, fallback) = match mode {
            ClassificationMode::Small => (self.small_probability, SMALL_MODE_PROBABILITY),
            ClassificationMode::Large => (self.large_probability, LARGE_MODE_PROBABILITY),
        };
        if configured.is_finite() {
            configured.clamp(0.0, 1.0)
        } else {
            fallback
        }
    }
}

pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

/// Pause before the next cycle: uniform in the configured bounds, divided by `speed`
pub fn next_delay<R: Rng>(rng: &mut R, config: &SimulationConfig, speed: f64) -> Duration {
    let low = config.min_interval.min(config.max_interval).as_secs_f64();
    let high = config.min_interval.max(config.max_interval).as_secs_f64();
    let base = if high > low { rng.gen_range(low..=high) } else { low };
    Duration::from_secs_f64(base / clamp_speed(speed))
}

/// Whether this cycle produces an object, and of which category
pub fn roll_detection<R: Rng>(
    rng: &mut R,
    config: &SimulationConfig,
    mode: ClassificationMode,
) -> Option<Category> {
    rng.gen_bool(config.probability_for(mode)).then(|| mode.category())
}

/// Live parameters a running simulator re-reads every cycle
#[derive(Debug, Clone, Copy)]
struct Knobs {
    mode: ClassificationMode,
    speed: f64,
}

/// Randomized classification events on a background thread.
///
/// Each instance runs one generation. The thread waits on a stop channel
/// during its sleeps, so [`SimulatedEventSource::stop`] is observed at the
/// current sleep boundary and nothing is emitted once it returns.
pub struct SimulatedEventSource {
    generation: u64,
    knobs: Arc<Mutex<Knobs>>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedEventSource {
    pub fn spawn<F>(
        config: SimulationConfig,
        generation: u64,
        mode: ClassificationMode,
        emit: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(ClassificationEvent) -> bool + Send + 'static,
    {
        Self::spawn_with_rng(config, generation, mode, StdRng::from_entropy(), emit)
    }

    /// Like [`SimulatedEventSource::spawn`] with a caller-supplied generator
    pub fn spawn_with_rng<R, F>(
        config: SimulationConfig,
        generation: u64,
        mode: ClassificationMode,
        mut rng: R,
        mut emit: F,
    ) -> std::io::Result<Self>
    where
        R: Rng + Send + 'static,
        F: FnMut(ClassificationEvent) -> bool + Send + 'static,
    {
        let knobs = Arc::new(Mutex::new(Knobs {
            mode,
            speed: clamp_speed(config.speed),
        }));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_knobs = knobs.clone();

        let handle = std::thread::Builder::new()
            .name(format!("simulator-{generation}"))
            .spawn(move || {
                debug!("Simulator generation {generation} running");
                loop {
                    let speed = thread_knobs.lock().speed;
                    let delay = next_delay(&mut rng, &config, speed);

                    if !sleep_unless_cancelled(&stop_rx, delay) {
                        break;
                    }
                    // A stop may have landed while we woke up
                    if !sleep_unless_cancelled(&stop_rx, Duration::ZERO) {
                        break;
                    }

                    let mode = thread_knobs.lock().mode;
                    if let Some(category) = roll_detection(&mut rng, &config, mode) {
                        if !emit(ClassificationEvent::now(category)) {
                            debug!("Simulator generation {generation} lost its consumer");
                            break;
                        }
                    }
                }
                debug!("Simulator generation {generation} exited");
            })?;

        info!("Simulator generation {generation} started");

        Ok(Self {
            generation,
            knobs,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Takes effect from the next cycle on
    pub fn set_speed(&self, speed: f64) -> f64 {
        let speed = clamp_speed(speed);
        self.knobs.lock().speed = speed;
        speed
    }

    pub fn set_mode(&self, mode: ClassificationMode) {
        self.knobs.lock().mode = mode;
    }

    /// Stop the thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        // Dropping the sender wakes the sleeping thread
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Simulator generation {} panicked", self.generation);
            } else {
                info!("Simulator generation {} stopped", self.generation);
            }
        }
    }
}

impl Drop for SimulatedEventSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SimulatedEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedEventSource")
            .field("generation", &self.generation)
            .field("knobs", &*self.knobs.lock())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast_config() -> SimulationConfig {
        SimulationConfig {
            min_interval: Duration::from_millis(2),
            max_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_delay_stays_within_scaled_bounds() {
        let config = SimulationConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let d = next_delay(&mut rng, &config, 1.0);
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs(8));

            let fast = next_delay(&mut rng, &config, 2.0);
            assert!(fast >= Duration::from_millis(1500) && fast <= Duration::from_secs(4));
        }
    }

    #[test]
    fn test_speed_is_clamped() {
        assert_eq!(clamp_speed(0.0), MIN_SPEED);
        assert_eq!(clamp_speed(50.0), MAX_SPEED);
        assert_eq!(clamp_speed(f64::NAN), 1.0);
        assert_eq!(clamp_speed(2.5), 2.5);
    }

    #[test]
    fn test_detection_matches_mode_and_rate() {
        let config = SimulationConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 5000;

        for (mode, expected) in [
            (ClassificationMode::Small, SMALL_MODE_PROBABILITY),
            (ClassificationMode::Large, LARGE_MODE_PROBABILITY),
        ] {
            let mut hits = 0;
            for _ in 0..trials {
                if let Some(category) = roll_detection(&mut rng, &config, mode) {
                    assert_eq!(category, mode.category());
                    hits += 1;
                }
            }
            let rate = hits as f64 / trials as f64;
            assert!((rate - expected).abs() < 0.03, "{mode:?}: {rate}");
        }
    }

    #[test]
    fn test_out_of_range_probabilities_are_sanitized() {
        let config = SimulationConfig {
            small_probability: f64::NAN,
            large_probability: 3.0,
            ..Default::default()
        };
        assert_eq!(
            config.probability_for(ClassificationMode::Small),
            SMALL_MODE_PROBABILITY
        );
        assert_eq!(config.probability_for(ClassificationMode::Large), 1.0);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            roll_detection(&mut rng, &config, ClassificationMode::Small);
            assert_eq!(
                roll_detection(&mut rng, &config, ClassificationMode::Large),
                Some(Category::Large)
            );
        }
    }

    #[test]
    fn test_running_simulator_emits_current_mode() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sim = SimulatedEventSource::spawn_with_rng(
            fast_config(),
            1,
            ClassificationMode::Large,
            StdRng::seed_from_u64(1),
            move |event| tx.send(event).is_ok(),
        )
        .unwrap();

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.category, Category::Large);

        sim.set_mode(ClassificationMode::Small);
        // Drain anything rolled before the mode change landed
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut saw_small = false;
        while Instant::now() < deadline {
            if let Ok(event) = rx.recv_timeout(Duration::from_millis(50)) {
                if event.category == Category::Small {
                    saw_small = true;
                    break;
                }
            }
        }
        sim.stop();
        assert!(saw_small);
    }

    #[test]
    fn test_no_emission_after_stop() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = SimulationConfig {
            small_probability: 1.0,
            ..fast_config()
        };
        let mut sim = SimulatedEventSource::spawn_with_rng(
            config,
            3,
            ClassificationMode::Small,
            StdRng::seed_from_u64(3),
            move |event| tx.send(event).is_ok(),
        )
        .unwrap();

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        sim.stop();
        assert!(!sim.is_running());

        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_stop_interrupts_long_sleep() {
        let config = SimulationConfig {
            min_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let mut sim =
            SimulatedEventSource::spawn(config, 9, ClassificationMode::Small, |_| true).unwrap();

        let start = Instant::now();
        sim.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(sim.generation(), 9);
    }
}
