use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use sortline::link::serial::DEFAULT_BAUD_RATE;
use sortline::link::{default_candidates, HandshakeConfig};
use sortline::{ControllerConfig, SimulationConfig};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub simulation: SimulationSettings,
    pub core: CoreConfig,
    pub console: ConsoleConfig,
}

impl AppConfig {
    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link.validate()?;
        self.simulation.validate()?;
        self.core.validate()?;
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            handshake: HandshakeConfig {
                open_timeout: Duration::from_millis(self.link.open_timeout_ms),
                settle_time: Duration::from_millis(self.link.settle_time_ms),
                probe_window: Duration::from_millis(self.link.probe_window_ms),
            },
            simulation: SimulationConfig {
                min_interval: Duration::from_millis(self.simulation.min_interval_ms),
                max_interval: Duration::from_millis(self.simulation.max_interval_ms),
                speed: self.simulation.speed,
                small_probability: self.simulation.small_probability,
                large_probability: self.simulation.large_probability,
            },
            poll_interval: Duration::from_millis(self.core.poll_interval_ms),
            actuator_dwell: Duration::from_millis(self.core.actuator_dwell_ms),
            history_capacity: self.core.history_capacity,
            log_capacity: self.core.log_capacity,
            candidates: self.link.candidates.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LinkConfig {
    pub baud_rate: u32,
    /// Probed in order. An empty list probes every port the OS reports.
    pub candidates: Vec<String>,
    pub open_timeout_ms: u64,
    /// The board resets when its port is opened; nothing is sent before this
    pub settle_time_ms: u64,
    pub probe_window_ms: u64,
}

impl LinkConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Message(
                "link.baud_rate must be greater than zero".to_string(),
            ));
        }
        if self.open_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "link.open_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimulationSettings {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub speed: f64,
    pub small_probability: f64,
    pub large_probability: f64,
}

impl SimulationSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval_ms == 0 || self.max_interval_ms == 0 {
            return Err(ConfigError::Message(format!(
                "simulation intervals must be non-zero (got [{}, {}] ms)",
                self.min_interval_ms, self.max_interval_ms
            )));
        }
        if self.min_interval_ms > self.max_interval_ms {
            return Err(ConfigError::Message(format!(
                "simulation.min_interval_ms ({}) must not exceed max_interval_ms ({})",
                self.min_interval_ms, self.max_interval_ms
            )));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(ConfigError::Message(format!(
                "simulation.speed must be positive, got: {}",
                self.speed
            )));
        }
        for (name, p) in [
            ("small_probability", self.small_probability),
            ("large_probability", self.large_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Message(format!(
                    "simulation.{name} must be within [0, 1], got: {p}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoreConfig {
    pub poll_interval_ms: u64,
    pub actuator_dwell_ms: u64,
    pub history_capacity: usize,
    pub log_capacity: usize,
}

impl CoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "core.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.history_capacity == 0 || self.log_capacity == 0 {
            return Err(ConfigError::Message(
                "core.history_capacity and core.log_capacity must be greater than zero"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConsoleConfig {
    pub verbosity: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let handshake = HandshakeConfig::default();
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            candidates: default_candidates(),
            open_timeout_ms: handshake.open_timeout.as_millis() as u64,
            settle_time_ms: handshake.settle_time.as_millis() as u64,
            probe_window_ms: handshake.probe_window.as_millis() as u64,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        let simulation = SimulationConfig::default();
        Self {
            min_interval_ms: simulation.min_interval.as_millis() as u64,
            max_interval_ms: simulation.max_interval.as_millis() as u64,
            speed: simulation.speed,
            small_probability: simulation.small_probability,
            large_probability: simulation.large_probability,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        let core = ControllerConfig::default();
        Self {
            poll_interval_ms: core.poll_interval.as_millis() as u64,
            actuator_dwell_ms: core.actuator_dwell.as_millis() as u64,
            history_capacity: core.history_capacity,
            log_capacity: core.log_capacity,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            verbosity: "info".to_string(),
        }
    }
}

/// Load configuration: defaults, then a TOML file, then `SORTLINE__` environment overrides
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        // Try common config file locations
        let possible_paths = ["sortline.toml", "config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
    }

    // e.g. SORTLINE__LINK__BAUD_RATE=115200
    builder = builder.add_source(
        Environment::with_prefix("SORTLINE")
            .separator("__")
            .try_parsing(true),
    );

    let app_config = builder.build()?.try_deserialize::<AppConfig>()?;
    app_config.validate()?;

    Ok(app_config)
}

/// Load configuration, falling back to defaults only when no file was asked for.
///
/// An explicitly named file that fails to load is an error: silently running
/// with defaults would probe the wrong ports.
pub fn load_config_or_default(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            Ok(config)
        }
        Err(e) if config_path.is_some() => Err(e),
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            Ok(AppConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn write_temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sortline-{}-{}.toml",
            name,
            std::process::id()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let core = config.controller_config();
        assert_eq!(core.handshake.settle_time, Duration::from_secs(2));
        assert_eq!(core.simulation.small_probability, 0.8);
        assert_eq!(core.history_capacity, 20);
        assert_eq!(core.log_capacity, 100);
        assert_eq!(config.link.baud_rate, 9600);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = write_temp_config(
            "override",
            r#"
[link]
baud_rate = 115200
candidates = ["/dev/ttyS9"]

[simulation]
speed = 2.5
"#,
        );

        let config = load_config(Some(&path)).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.link.baud_rate, 115200);
        assert_eq!(config.link.candidates, vec!["/dev/ttyS9".to_string()]);
        assert_eq!(config.simulation.speed, 2.5);
        // Untouched sections keep their defaults
        assert_eq!(config.simulation.min_interval_ms, 3000);
        assert_eq!(config.core.poll_interval_ms, 100);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let path = write_temp_config(
            "invalid",
            r#"
[simulation]
min_interval_ms = 9000
max_interval_ms = 1000
"#,
        );

        let result = load_config_or_default(Some(&path));
        fs::remove_file(&path).ok();

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let missing = Path::new("/definitely/not/here/sortline.toml");
        assert!(load_config_or_default(Some(missing)).is_err());
    }

    #[test]
    fn test_probability_bounds() {
        let mut config = AppConfig::default();
        config.simulation.large_probability = 1.2;
        assert!(config.validate().is_err());

        config.simulation.large_probability = 0.0;
        assert!(config.validate().is_ok());
    }
}
