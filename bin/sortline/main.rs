mod config;

use clap::Parser;
use crossbeam_channel::{select, Receiver};
use env_logger::Env;
use log::{error, info, LevelFilter};
use sortline::{CoreEvent, SerialOpener, SortingController, StatusSnapshot};
use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::config::{load_config_or_default, AppConfig};

/// How often KPI lines are printed in text mode
const KPI_PRINT_INTERVAL: Duration = Duration::from_secs(10);

/// Sorting line classification control
#[derive(Parser, Debug)]
#[command(name = "sortline")]
#[command(about = "Classification control core for an object-sorting line", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Start the simulator right away
    #[arg(long)]
    simulate: bool,

    /// Skip the controller scan at startup
    #[arg(long)]
    no_connect: bool,

    /// Print core events as JSON lines
    #[arg(long)]
    json: bool,

    /// Candidate port, in probe order (repeatable; replaces the configured list)
    #[arg(short, long = "port", value_name = "NAME")]
    ports: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config_or_default(args.config.as_deref())?;
    if !args.ports.is_empty() {
        config.link.candidates = args.ports.clone();
    }

    let log_level = args
        .log_level
        .clone()
        .unwrap_or(config.console.verbosity.clone());
    initialize_logging(&log_level)?;
    log_startup_info(&config, args.config.as_ref());

    let shutdown_flag = setup_shutdown_handler()?;
    let opener = Arc::new(SerialOpener::new(config.link.baud_rate));
    let (mut controller, events) = SortingController::spawn(config.controller_config(), opener)?;

    if args.simulate {
        controller.start_simulation()?;
    }
    if !args.no_connect {
        controller.connect()?;
    }

    if !args.json {
        print_help();
    }

    let result = run_console(&controller, &events, &shutdown_flag, args.json);

    info!("Shutting down...");
    controller.shutdown();
    // Whatever the core said while stopping
    for event in events.try_iter() {
        print_event(&event, args.json, &mut None);
    }
    info!("Cleanup complete");

    result
}

/// Feed operator commands to the core and print what it reports until asked to quit
fn run_console(
    controller: &SortingController,
    events: &Receiver<CoreEvent>,
    shutdown_flag: &Arc<AtomicBool>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = spawn_stdin_reader()?;
    let mut awaiting_reset_confirmation = false;
    let mut last_kpi_print = None;

    while !shutdown_flag.load(Ordering::SeqCst) {
        let input = select! {
            recv(events) -> event => ConsoleInput::Event(event.ok()),
            recv(lines) -> line => ConsoleInput::Line(line.ok()),
            default(Duration::from_millis(200)) => ConsoleInput::Idle,
        };

        match input {
            ConsoleInput::Event(Some(event)) => print_event(&event, json, &mut last_kpi_print),
            ConsoleInput::Event(None) => {
                error!("Core stopped unexpectedly");
                break;
            }
            // stdin closed: keep serving events until Ctrl+C
            ConsoleInput::Line(None) => lines = crossbeam_channel::never(),
            ConsoleInput::Line(Some(line)) if awaiting_reset_confirmation => {
                awaiting_reset_confirmation = false;
                if matches!(line.trim(), "y" | "Y" | "yes") {
                    report(controller.reset_statistics());
                } else {
                    println!("Reset cancelled");
                }
            }
            ConsoleInput::Line(Some(line)) => match parse_command(&line) {
                Some(ConsoleCommand::Quit) => break,
                Some(ConsoleCommand::Reset) => {
                    println!("Reset all statistics? [y/N]");
                    awaiting_reset_confirmation = true;
                }
                Some(command) => run_command(controller, command),
                None if line.trim().is_empty() => {}
                None => println!("Unknown command '{}', type h for help", line.trim()),
            },
            ConsoleInput::Idle => {}
        }
    }

    Ok(())
}

enum ConsoleInput {
    Event(Option<CoreEvent>),
    Line(Option<String>),
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
enum ConsoleCommand {
    Connect,
    ToggleMode,
    StartSimulation,
    StopSimulation,
    Speed(f64),
    Reset,
    ClearLog,
    Status,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let mut parts = line.split_whitespace();
    let command = match parts.next()?.to_lowercase().as_str() {
        "c" | "connect" => ConsoleCommand::Connect,
        "m" | "mode" => ConsoleCommand::ToggleMode,
        "s" | "sim" | "start" => ConsoleCommand::StartSimulation,
        "x" | "stop" => ConsoleCommand::StopSimulation,
        "v" | "speed" => ConsoleCommand::Speed(parts.next()?.parse().ok()?),
        "r" | "reset" => ConsoleCommand::Reset,
        "l" | "clear" => ConsoleCommand::ClearLog,
        "i" | "status" => ConsoleCommand::Status,
        "h" | "help" | "?" => ConsoleCommand::Help,
        "q" | "quit" | "exit" => ConsoleCommand::Quit,
        _ => return None,
    };
    Some(command)
}

fn run_command(controller: &SortingController, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Connect => report(controller.connect()),
        ConsoleCommand::ToggleMode => report(controller.toggle_mode()),
        ConsoleCommand::StartSimulation => report(controller.start_simulation()),
        ConsoleCommand::StopSimulation => report(controller.stop_simulation()),
        ConsoleCommand::Speed(speed) => report(controller.set_simulation_speed(speed)),
        ConsoleCommand::ClearLog => report(controller.clear_log()),
        ConsoleCommand::Status => print_status(&controller.snapshot()),
        ConsoleCommand::Help => print_help(),
        // Handled by the console loop
        ConsoleCommand::Reset | ConsoleCommand::Quit => {}
    }
}

/// The core already logs rejected commands; only note that it happened
fn report(result: Result<(), sortline::SortlineError>) {
    if let Err(e) = result {
        println!("✗ {}", e);
    }
}

fn print_event(event: &CoreEvent, json: bool, last_kpi_print: &mut Option<Instant>) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to encode event: {}", e),
        }
        return;
    }

    match event {
        CoreEvent::LogAppended { entry } => println!("{}", entry),
        CoreEvent::ModeChanged { mode } => println!("Mode: {}", mode),
        CoreEvent::CountersChanged { counters } => println!(
            "Small: {} | Large: {} | Total: {}",
            counters.small,
            counters.large,
            counters.total()
        ),
        CoreEvent::ConnectionStateChanged { connection } => {
            println!("Connection: {}", connection)
        }
        CoreEvent::SimulationChanged { running, speed } => println!(
            "Simulation: {} ({:.1}x)",
            if *running { "running" } else { "stopped" },
            speed
        ),
        CoreEvent::KpiTick { kpis } => {
            let due = last_kpi_print.is_none_or(|at| at.elapsed() >= KPI_PRINT_INTERVAL);
            if due {
                println!(
                    "Throughput: {:.1}/min | Uptime: {} | Efficiency: {}%",
                    kpis.throughput_per_minute,
                    kpis.uptime_hms(),
                    kpis.efficiency_percent
                );
                *last_kpi_print = Some(Instant::now());
            }
        }
        // Both already appear as log lines
        CoreEvent::ActuatorChanged { .. } | CoreEvent::Classified { .. } => {}
    }
}

fn print_status(snapshot: &StatusSnapshot) {
    println!("Connection : {}", snapshot.connection);
    println!("Mode       : {}", snapshot.mode);
    println!("Actuator   : {:?}", snapshot.actuator);
    println!(
        "Simulation : {}",
        if snapshot.is_simulating() {
            format!("running ({:.1}x)", snapshot.simulation_speed)
        } else {
            "stopped".to_string()
        }
    );
    println!(
        "Counters   : small {} | large {} | total {}",
        snapshot.counters.small,
        snapshot.counters.large,
        snapshot.counters.total()
    );
    println!(
        "KPIs       : {:.1}/min | uptime {} | efficiency {}%",
        snapshot.kpis.throughput_per_minute,
        snapshot.kpis.uptime_hms(),
        snapshot.kpis.efficiency_percent
    );
}

fn print_help() {
    println!();
    println!("Commands:");
    println!("  c          scan for the controller");
    println!("  m          toggle classification mode");
    println!("  s / x      start / stop simulation");
    println!("  v <speed>  set simulation speed (0.1 - 10)");
    println!("  r          reset statistics (asks for confirmation)");
    println!("  l          clear the event log");
    println!("  i          show status");
    println!("  q          quit (or Ctrl+C)");
    println!();
}

/// Read stdin lines on a helper thread so the console loop can select on them
fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Log startup information
fn log_startup_info(config: &AppConfig, config_path: Option<&PathBuf>) {
    info!("=== Sortline Classification Control ===");
    match config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: defaults / working directory"),
    }
    if config.link.candidates.is_empty() {
        info!("Candidates: all serial ports reported by the system");
    } else {
        info!("Candidates: {}", config.link.candidates.join(", "));
    }
    info!("Baud rate: {}", config.link.baud_rate);
    info!(
        "Simulation: {}-{} ms at {:.1}x",
        config.simulation.min_interval_ms, config.simulation.max_interval_ms, config.simulation.speed
    );
}

/// Setup Ctrl+C handler for graceful shutdown
fn setup_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received - initiating graceful shutdown...");
        shutdown_flag_clone.store(true, Ordering::SeqCst);
    })?;

    Ok(shutdown_flag)
}

/// Initialize logging with configurable level
fn initialize_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .try_init()?;

    Ok(())
}
