//! Single owner of all core state
//!
//! [`SortingController::spawn`] starts one controller thread that owns the
//! connection, mode, active source, actuator, statistics and event log.
//! Everything that changes state reaches it as a message: public commands,
//! scan progress from the scan thread and events from the simulator thread.
//! A fixed-period tick in the same loop drains hardware input, reverts the
//! actuator and refreshes the KPIs.
//!
//! After every message the owner publishes a [`StatusSnapshot`], so readers
//! never observe a half-applied command.

use crate::actuator::{ActuatorTracker, DEFAULT_DWELL_MS};
use crate::error::SortlineError;
use crate::event_log::{EventLog, DEFAULT_LOG_CAPACITY};
use crate::link::protocol::TOGGLE_COMMAND;
use crate::link::{
    default_candidates, ConnectResult, ConnectionManager, HandshakeConfig, LinkError,
    LinkHandshake, LinkOpener, ScanOutcome, ScanReport,
};
use crate::mode::ModeController;
use crate::source::simulated::clamp_speed;
use crate::source::{
    ActiveSource, HardwareEventSource, SimulatedEventSource, SimulationConfig, SourceKind,
    SourceSignal,
};
use crate::statistics::{HistorySample, StatisticsAggregator, DEFAULT_HISTORY_CAPACITY};
use crate::types::{
    ActuatorState, ClassificationEvent, ClassificationMode, ConnectionState, Counters,
    KpiSnapshot, LogEntry, Severity,
};
use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use log::{debug, info, trace, warn};
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Period of the hardware drain / actuator / KPI tick (ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Events queued for a slow reader before new ones are dropped
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

const NOT_DETECTED_MESSAGE: &str = "Controller not detected - simulation available";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub handshake: HandshakeConfig,
    pub simulation: SimulationConfig,
    pub poll_interval: Duration,
    pub actuator_dwell: Duration,
    pub history_capacity: usize,
    pub log_capacity: usize,
    /// Probed in order by `connect`. Empty means ask the opener.
    pub candidates: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            simulation: SimulationConfig::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            actuator_dwell: Duration::from_millis(DEFAULT_DWELL_MS),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            log_capacity: DEFAULT_LOG_CAPACITY,
            candidates: default_candidates(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect,
    ToggleMode,
    StartSimulation,
    StopSimulation,
    SetSimulationSpeed(f64),
    /// Callers confirm with the operator before sending this
    ResetStatistics,
    ClearLog,
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    ModeChanged { mode: ClassificationMode },
    ActuatorChanged { state: ActuatorState },
    Classified { classification: ClassificationEvent },
    CountersChanged { counters: Counters },
    LogAppended { entry: LogEntry },
    ConnectionStateChanged { connection: ConnectionState },
    SimulationChanged { running: bool, speed: f64 },
    KpiTick { kpis: KpiSnapshot },
}

/// Copy of the owner's state as of the last processed message
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub connection: ConnectionState,
    pub mode: ClassificationMode,
    pub actuator: ActuatorState,
    pub counters: Counters,
    pub history: Vec<HistorySample>,
    pub kpis: KpiSnapshot,
    pub source: SourceKind,
    pub simulation_speed: f64,
    pub log: Vec<LogEntry>,
}

impl StatusSnapshot {
    pub fn is_simulating(&self) -> bool {
        self.source == SourceKind::Simulated
    }
}

type Reply = Sender<Result<(), SortlineError>>;

enum ControlMessage {
    Command { command: Command, reply: Reply },
    ScanAttempt { scan_id: u64, candidate: String },
    ScanFinished { scan_id: u64, report: ScanReport },
    Simulated { generation: u64, event: ClassificationEvent },
    Shutdown,
}

struct ScanJob {
    id: u64,
    /// Dropping this cancels the scan at its next sleep
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

/// Handle to the controller thread. Dropping it shuts the core down.
pub struct SortingController {
    inbox: Sender<ControlMessage>,
    snapshot: Arc<RwLock<StatusSnapshot>>,
    thread: Option<JoinHandle<()>>,
}

impl SortingController {
    /// Start the controller thread.
    ///
    /// Returns the handle and the receiving end of the event stream.
    pub fn spawn(
        config: ControllerConfig,
        opener: Arc<dyn LinkOpener>,
    ) -> Result<(Self, Receiver<CoreEvent>), SortlineError> {
        let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);

        let owner = Owner::new(config, opener, inbox_tx.clone(), events_tx);
        let snapshot = Arc::new(RwLock::new(owner.snapshot()));
        let published = snapshot.clone();

        let thread = thread::Builder::new()
            .name("sortline-controller".to_string())
            .spawn(move || owner.run(inbox_rx, published))
            .map_err(SortlineError::Spawn)?;

        Ok((
            Self {
                inbox: inbox_tx,
                snapshot,
                thread: Some(thread),
            },
            events_rx,
        ))
    }

    /// Scan the candidate endpoints in the background.
    ///
    /// Returns once the scan has started; progress and outcome arrive as
    /// [`CoreEvent::ConnectionStateChanged`].
    pub fn connect(&self) -> Result<(), SortlineError> {
        self.request(Command::Connect)
    }

    pub fn toggle_mode(&self) -> Result<(), SortlineError> {
        self.request(Command::ToggleMode)
    }

    pub fn start_simulation(&self) -> Result<(), SortlineError> {
        self.request(Command::StartSimulation)
    }

    pub fn stop_simulation(&self) -> Result<(), SortlineError> {
        self.request(Command::StopSimulation)
    }

    pub fn set_simulation_speed(&self, speed: f64) -> Result<(), SortlineError> {
        self.request(Command::SetSimulationSpeed(speed))
    }

    pub fn reset_statistics(&self) -> Result<(), SortlineError> {
        self.request(Command::ResetStatistics)
    }

    pub fn clear_log(&self) -> Result<(), SortlineError> {
        self.request(Command::ClearLog)
    }

    /// Send `command` and wait until the owner has applied it
    pub fn request(&self, command: Command) -> Result<(), SortlineError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.inbox
            .send(ControlMessage::Command {
                command,
                reply: reply_tx,
            })
            .map_err(|_| SortlineError::ControllerUnavailable)?;
        reply_rx
            .recv()
            .map_err(|_| SortlineError::ControllerUnavailable)?
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop every background context and release the link. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.inbox.send(ControlMessage::Shutdown);
        if thread.join().is_err() {
            log::error!("Controller thread panicked");
        }
    }
}

impl Drop for SortingController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the controller thread
struct Owner {
    config: ControllerConfig,
    opener: Arc<dyn LinkOpener>,
    inbox: Sender<ControlMessage>,
    events: Sender<CoreEvent>,
    connection: ConnectionManager,
    mode: ModeController,
    source: ActiveSource,
    actuator: ActuatorTracker,
    statistics: StatisticsAggregator,
    log: EventLog,
    started: Instant,
    kpis: KpiSnapshot,
    simulation_speed: f64,
    next_generation: u64,
    next_scan_id: u64,
    scan: Option<ScanJob>,
}

impl Owner {
    fn new(
        config: ControllerConfig,
        opener: Arc<dyn LinkOpener>,
        inbox: Sender<ControlMessage>,
        events: Sender<CoreEvent>,
    ) -> Self {
        Self {
            connection: ConnectionManager::new(),
            mode: ModeController::new(),
            source: ActiveSource::Idle,
            actuator: ActuatorTracker::new(config.actuator_dwell),
            statistics: StatisticsAggregator::new(config.history_capacity),
            log: EventLog::new(config.log_capacity),
            started: Instant::now(),
            kpis: KpiSnapshot::default(),
            simulation_speed: clamp_speed(config.simulation.speed),
            next_generation: 0,
            next_scan_id: 0,
            scan: None,
            config,
            opener,
            inbox,
            events,
        }
    }

    fn run(mut self, inbox: Receiver<ControlMessage>, published: Arc<RwLock<StatusSnapshot>>) {
        let ticker = crossbeam_channel::tick(self.config.poll_interval);
        self.append_log("Core started", Severity::Info);
        *published.write() = self.snapshot();

        loop {
            let message = select! {
                recv(inbox) -> message => Some(message),
                recv(ticker) -> _ => None,
            };

            match message {
                None => self.guarded_tick(),
                Some(Ok(ControlMessage::Shutdown)) | Some(Err(_)) => break,
                Some(Ok(ControlMessage::Command { command, reply })) => {
                    let result = self.execute(command);
                    // Publish first so the caller sees its own command applied
                    *published.write() = self.snapshot();
                    let _ = reply.send(result);
                    continue;
                }
                Some(Ok(message)) => self.handle(message),
            }
            *published.write() = self.snapshot();
        }

        self.stop_everything();
        *published.write() = self.snapshot();
    }

    fn execute(&mut self, command: Command) -> Result<(), SortlineError> {
        debug!("Command: {command:?}");
        match command {
            Command::Connect => self.start_scan(),
            Command::ToggleMode => self.toggle_mode(),
            Command::StartSimulation => self.start_simulation(),
            Command::StopSimulation => {
                self.stop_simulation();
                Ok(())
            }
            Command::SetSimulationSpeed(speed) => {
                self.set_simulation_speed(speed);
                Ok(())
            }
            Command::ResetStatistics => {
                self.statistics.reset();
                self.emit(CoreEvent::CountersChanged {
                    counters: self.statistics.counters(),
                });
                self.append_log("Statistics reset", Severity::Warn);
                Ok(())
            }
            Command::ClearLog => {
                self.log.clear();
                self.append_log("Log cleared", Severity::Info);
                Ok(())
            }
        }
    }

    fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::ScanAttempt { scan_id, candidate } => {
                if self.is_current_scan(scan_id) {
                    self.connection.mark_scanning(&candidate);
                    self.emit_connection_state();
                    self.append_log(format!("Probing {candidate}"), Severity::Info);
                }
            }
            ControlMessage::ScanFinished { scan_id, report } => {
                if self.is_current_scan(scan_id) {
                    self.finish_scan(report);
                } else {
                    debug!("Discarding report of stale scan {scan_id}");
                }
            }
            ControlMessage::Simulated { generation, event } => {
                let current = self.source.simulated().map(|sim| sim.generation());
                if current == Some(generation) {
                    self.record_classification(event, Instant::now());
                } else {
                    debug!("Discarding event from stopped simulator generation {generation}");
                }
            }
            // Handled by the loop
            ControlMessage::Command { .. } | ControlMessage::Shutdown => {}
        }
    }

    /// Run one tick; a panic inside it is logged and the loop carries on
    fn guarded_tick(&mut self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.tick(Instant::now())));
        if let Err(payload) = outcome {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown cause".to_string());
            self.append_log(format!("Poll tick error: {reason}"), Severity::Error);
        }
    }

    fn tick(&mut self, now: Instant) {
        if let Some(hardware) = self.source.hardware() {
            match hardware.drain(&mut self.connection) {
                Ok(signals) => {
                    for signal in signals {
                        self.apply_signal(signal, now);
                    }
                }
                Err(e) => self.link_lost(&e),
            }
        }

        if let Some(state) = self.actuator.poll(now) {
            self.actuator_changed(state);
        }

        let kpis = self
            .statistics
            .kpis(now, self.started, self.source.is_active());
        let changed = kpis.differs_for_display(&self.kpis);
        self.kpis = kpis;
        if changed {
            self.emit(CoreEvent::KpiTick { kpis });
        }
    }

    fn apply_signal(&mut self, signal: SourceSignal, now: Instant) {
        match signal {
            SourceSignal::Classified(event) => self.record_classification(event, now),
            SourceSignal::ActuatorActive => {
                if let Some(state) = self.actuator.on_hardware_active(now) {
                    self.actuator_changed(state);
                }
            }
            SourceSignal::ActuatorIdle => {
                if let Some(state) = self.actuator.on_hardware_idle() {
                    self.actuator_changed(state);
                }
            }
            SourceSignal::ModeReport(reported) => {
                if let Some(mode) = self.mode.toggle(true, Some(reported)) {
                    self.mode_changed(mode);
                }
            }
            SourceSignal::Acknowledged => debug!("Controller acknowledged mode change"),
            SourceSignal::Unrecognized(text) => {
                let severity = crate::event_log::infer_severity(&text);
                self.append_log(text, severity);
            }
        }
    }

    fn record_classification(&mut self, event: ClassificationEvent, now: Instant) {
        let counters = self.statistics.record_at(&event, now);
        self.append_log(format!("Object classified: {}", event.category), Severity::Info);
        self.emit(CoreEvent::Classified {
            classification: event,
        });
        self.emit(CoreEvent::CountersChanged { counters });

        if let Some(state) = self.actuator.on_classification(now) {
            self.actuator_changed(state);
        }
    }

    fn actuator_changed(&mut self, state: ActuatorState) {
        let text = match state {
            ActuatorState::Active => "Actuator ACTIVE - diverting object",
            ActuatorState::Idle => "Actuator IDLE",
        };
        self.append_log(text, Severity::Info);
        self.emit(CoreEvent::ActuatorChanged { state });
    }

    fn mode_changed(&mut self, mode: ClassificationMode) {
        if let Some(sim) = self.source.simulated() {
            sim.set_mode(mode);
        }
        self.append_log(format!("Mode changed to {mode}"), Severity::Info);
        self.emit(CoreEvent::ModeChanged { mode });
    }

    fn toggle_mode(&mut self) -> Result<(), SortlineError> {
        match self.source.kind() {
            SourceKind::Idle => {
                let err = SortlineError::StateViolation(
                    "mode change requested with no active event source".to_string(),
                );
                self.append_log(format!("Mode change rejected: {err}"), Severity::Error);
                Err(err)
            }
            SourceKind::Hardware => match self.connection.send(TOGGLE_COMMAND) {
                Ok(()) => {
                    self.append_log("Mode change requested from controller", Severity::Info);
                    Ok(())
                }
                Err(e) => {
                    self.link_lost(&e);
                    Err(e.into())
                }
            },
            SourceKind::Simulated => {
                if let Some(mode) = self.mode.toggle(false, None) {
                    self.mode_changed(mode);
                }
                Ok(())
            }
        }
    }

    fn start_scan(&mut self) -> Result<(), SortlineError> {
        if self.scan.is_some() {
            self.append_log("Scan already in progress", Severity::Warn);
            return Ok(());
        }

        if self.source.kind() == SourceKind::Hardware {
            self.source.stop(&mut self.connection);
            self.emit_connection_state();
        }

        let candidates = if self.config.candidates.is_empty() {
            self.opener.discover()
        } else {
            self.config.candidates.clone()
        };
        if candidates.is_empty() {
            self.append_log("No candidate endpoints to probe", Severity::Warn);
            self.append_log(NOT_DETECTED_MESSAGE, Severity::Warn);
            return Ok(());
        }

        self.next_scan_id += 1;
        let id = self.next_scan_id;
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let opener = self.opener.clone();
        let handshake_config = self.config.handshake.clone();
        let inbox = self.inbox.clone();
        let count = candidates.len();

        let handle = thread::Builder::new()
            .name(format!("link-scan-{id}"))
            .spawn(move || {
                let handshake = LinkHandshake::new(opener.as_ref(), handshake_config);
                let report = handshake.scan(&candidates, &cancel_rx, |candidate| {
                    let _ = inbox.send(ControlMessage::ScanAttempt {
                        scan_id: id,
                        candidate: candidate.to_string(),
                    });
                });
                let _ = inbox.send(ControlMessage::ScanFinished { scan_id: id, report });
            })
            .map_err(SortlineError::Spawn)?;

        self.scan = Some(ScanJob {
            id,
            cancel: cancel_tx,
            handle,
        });
        self.append_log(
            format!("Searching for controller on {count} endpoint(s)"),
            Severity::Info,
        );
        Ok(())
    }

    fn is_current_scan(&self, scan_id: u64) -> bool {
        self.scan.as_ref().is_some_and(|job| job.id == scan_id)
    }

    fn finish_scan(&mut self, report: ScanReport) {
        if let Some(job) = self.scan.take() {
            if job.handle.join().is_err() {
                warn!("Scan thread {} panicked", job.id);
            }
        }
        debug!("Scan attempted {:?}", report.attempted);

        if matches!(report.outcome, ScanOutcome::Connected(_))
            && self.source.kind() == SourceKind::Simulated
        {
            self.stop_simulation();
        }

        match self.connection.adopt(report.outcome) {
            ConnectResult::Connected(endpoint) => {
                self.source = ActiveSource::Hardware(HardwareEventSource::new(endpoint.clone()));
                self.emit_connection_state();
                self.append_log(format!("Controller connected on {endpoint}"), Severity::Info);
            }
            ConnectResult::Failed => {
                self.emit_connection_state();
                self.append_log(NOT_DETECTED_MESSAGE, Severity::Warn);
            }
            ConnectResult::Cancelled => {
                self.emit_connection_state();
                info!("Scan cancelled");
            }
        }
    }

    fn start_simulation(&mut self) -> Result<(), SortlineError> {
        match self.source.kind() {
            SourceKind::Simulated => {
                self.append_log("Simulation already running", Severity::Warn);
                return Ok(());
            }
            SourceKind::Hardware => {
                self.source.stop(&mut self.connection);
                self.emit_connection_state();
                self.append_log("Controller link released for simulation", Severity::Warn);
            }
            SourceKind::Idle => {}
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let inbox = self.inbox.clone();
        let config = SimulationConfig {
            speed: self.simulation_speed,
            ..self.config.simulation.clone()
        };

        let sim = SimulatedEventSource::spawn(config, generation, self.mode.mode(), move |event| {
            inbox
                .send(ControlMessage::Simulated { generation, event })
                .is_ok()
        })
        .map_err(SortlineError::Spawn)?;

        self.source = ActiveSource::Simulated(sim);
        self.append_log("Simulation started", Severity::Info);
        self.emit(CoreEvent::SimulationChanged {
            running: true,
            speed: self.simulation_speed,
        });
        Ok(())
    }

    fn stop_simulation(&mut self) {
        if self.source.kind() != SourceKind::Simulated {
            self.append_log("Simulation is not running", Severity::Warn);
            return;
        }
        self.source.stop(&mut self.connection);
        self.append_log("Simulation stopped", Severity::Warn);
        self.emit(CoreEvent::SimulationChanged {
            running: false,
            speed: self.simulation_speed,
        });
    }

    fn set_simulation_speed(&mut self, speed: f64) {
        self.simulation_speed = clamp_speed(speed);
        if let Some(sim) = self.source.simulated() {
            sim.set_speed(self.simulation_speed);
        }
        self.append_log(
            format!("Simulation speed set to {:.1}x", self.simulation_speed),
            Severity::Info,
        );
        self.emit(CoreEvent::SimulationChanged {
            running: self.source.kind() == SourceKind::Simulated,
            speed: self.simulation_speed,
        });
    }

    fn link_lost(&mut self, err: &LinkError) {
        self.append_log(format!("Controller link error: {err}"), Severity::Error);
        self.source.stop(&mut self.connection);
        self.emit_connection_state();
    }

    fn stop_everything(&mut self) {
        if self.source.kind() == SourceKind::Simulated {
            self.stop_simulation();
        }
        if let Some(job) = self.scan.take() {
            drop(job.cancel);
            if job.handle.join().is_err() {
                warn!("Scan thread {} panicked", job.id);
            }
        }
        self.source.stop(&mut self.connection);
        self.connection.disconnect();
        self.append_log("Core stopped", Severity::Info);
    }

    fn emit_connection_state(&self) {
        self.emit(CoreEvent::ConnectionStateChanged {
            connection: self.connection.state().clone(),
        });
    }

    fn append_log(&mut self, text: impl Into<String>, severity: Severity) {
        let entry = self.log.append_with(text, severity).clone();
        self.emit(CoreEvent::LogAppended { entry });
    }

    fn emit(&self, event: CoreEvent) {
        // Nobody listening, or nobody draining, is fine
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            trace!("Event queue full, dropping {event:?}");
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            connection: self.connection.state().clone(),
            mode: self.mode.mode(),
            actuator: self.actuator.state(),
            counters: self.statistics.counters(),
            history: self.statistics.history().iter().cloned().collect(),
            kpis: self.kpis,
            source: self.source.kind(),
            simulation_speed: self.simulation_speed,
            log: self.log.entries().iter().cloned().collect(),
        }
    }
}
