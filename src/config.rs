//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::dispatch::DEFAULT_FORWARD_TARGET;
use crate::error::Result;
use crate::gate::{DEFAULT_INTERVAL_MS, DEFAULT_STATUS_SUPPRESS_MS};
use crate::link::serial::{DEFAULT_BAUD_RATE, DEFAULT_COMPONENT_ID, DEFAULT_SYSTEM_ID};
use crate::sink::DEFAULT_DOCUMENT;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_vehicles")]
    pub vehicles: Vec<VehicleConfig>,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub forward: ForwardConfig,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One vehicle link
#[derive(Debug, Deserialize, Clone)]
pub struct VehicleConfig {
    pub index: u8,

    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Sink collection for this vehicle's position snapshots
    #[serde(default)]
    pub sink_collection: Option<String>,
}

/// Link protocol settings shared by both vehicles
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_stream_rate_hz")]
    pub stream_rate_hz: u16,

    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    #[serde(default = "default_system_id")]
    pub system_id: u8,

    #[serde(default = "default_component_id")]
    pub component_id: u8,
}

/// Rate gate timing
#[derive(Debug, Deserialize, Clone)]
pub struct GateConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_status_suppress_ms")]
    pub status_suppress_ms: u64,
}

/// Session worker pacing
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,

    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

/// Downstream consumer
#[derive(Debug, Deserialize, Clone)]
pub struct ForwardConfig {
    #[serde(default = "default_forward_target")]
    pub target: String,
}

/// Inbound command channel
#[derive(Debug, Deserialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_command_listen")]
    pub listen: String,

    #[serde(default = "default_command_backoff_ms")]
    pub error_backoff_ms: u64,
}

/// Position snapshot store
#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    #[serde(default = "default_sink_dir")]
    pub dir: String,

    #[serde(default = "default_sink_document")]
    pub document: String,
}

/// Log output
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file, stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_vehicles() -> Vec<VehicleConfig> {
    vec![
        VehicleConfig {
            index: 1,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: default_baud_rate(),
            sink_collection: None,
        },
        VehicleConfig {
            index: 2,
            port: "/dev/ttyUSB1".to_string(),
            baud_rate: default_baud_rate(),
            sink_collection: None,
        },
    ]
}
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { DEFAULT_BAUD_RATE }

fn default_stream_rate_hz() -> u16 { 50 }
fn default_heartbeat_timeout_ms() -> u64 { 10000 }
fn default_recv_timeout_ms() -> u64 { 1000 }
fn default_system_id() -> u8 { DEFAULT_SYSTEM_ID }
fn default_component_id() -> u8 { DEFAULT_COMPONENT_ID }

fn default_interval_ms() -> u64 { DEFAULT_INTERVAL_MS as u64 }
fn default_status_suppress_ms() -> u64 { DEFAULT_STATUS_SUPPRESS_MS as u64 }

fn default_pause_ms() -> u64 { 10 }
fn default_error_backoff_ms() -> u64 { 1000 }

fn default_forward_target() -> String { DEFAULT_FORWARD_TARGET.to_string() }

fn default_command_listen() -> String { "127.0.0.1:14553".to_string() }
fn default_command_backoff_ms() -> u64 { 100 }

fn default_sink_dir() -> String { "./snapshots".to_string() }
fn default_sink_document() -> String { DEFAULT_DOCUMENT.to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            stream_rate_hz: default_stream_rate_hz(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
            system_id: default_system_id(),
            component_id: default_component_id(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            status_suppress_ms: default_status_suppress_ms(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pause_ms: default_pause_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self { target: default_forward_target() }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            listen: default_command_listen(),
            error_backoff_ms: default_command_backoff_ms(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            dir: default_sink_dir(),
            document: default_sink_document(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vehicles: default_vehicles(),
            link: LinkConfig::default(),
            gate: GateConfig::default(),
            worker: WorkerConfig::default(),
            forward: ForwardConfig::default(),
            commands: CommandConfig::default(),
            sink: SinkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl VehicleConfig {
    /// Sink collection, `vehicle-<index>` unless configured
    pub fn collection(&self) -> String {
        self.sink_collection
            .clone()
            .unwrap_or_else(|| format!("vehicle-{}", self.index))
    }
}

fn invalid(msg: impl std::fmt::Display) -> crate::error::BridgeError {
    crate::error::BridgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mav_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Exactly two vehicles, indices 1 and 2
        let mut indices: Vec<u8> = self.vehicles.iter().map(|v| v.index).collect();
        indices.sort_unstable();
        if indices != [1, 2] {
            return Err(invalid("exactly two vehicles with index 1 and 2 are required"));
        }

        for vehicle in &self.vehicles {
            if vehicle.port.is_empty() {
                return Err(invalid(format!("vehicle {} port cannot be empty", vehicle.index)));
            }

            if ![9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600, 1500000]
                .contains(&vehicle.baud_rate)
            {
                return Err(invalid(format!(
                    "vehicle {} baud_rate {} is not a supported telemetry rate",
                    vehicle.index, vehicle.baud_rate
                )));
            }

            let collection = vehicle.collection();
            if collection.is_empty() || collection.contains(|c: char| c == '/' || c == '\\') {
                return Err(invalid(format!(
                    "vehicle {} sink_collection must be a plain name",
                    vehicle.index
                )));
            }
        }

        if self.vehicles[0].collection() == self.vehicles[1].collection() {
            return Err(invalid("vehicles must use distinct sink collections"));
        }

        // Validate link settings
        if self.link.stream_rate_hz == 0 || self.link.stream_rate_hz > 200 {
            return Err(invalid("stream_rate_hz must be between 1 and 200"));
        }

        if self.link.heartbeat_timeout_ms == 0 || self.link.heartbeat_timeout_ms > 120000 {
            return Err(invalid("heartbeat_timeout_ms must be between 1 and 120000"));
        }

        if self.link.recv_timeout_ms == 0 || self.link.recv_timeout_ms > 10000 {
            return Err(invalid("recv_timeout_ms must be between 1 and 10000"));
        }

        // Validate gate timing
        if self.gate.interval_ms == 0 || self.gate.interval_ms > 60000 {
            return Err(invalid("gate interval_ms must be between 1 and 60000"));
        }

        if self.gate.status_suppress_ms > 60000 {
            return Err(invalid("status_suppress_ms must be at most 60000"));
        }

        // Validate worker pacing
        if self.worker.pause_ms > 1000 {
            return Err(invalid("pause_ms must be at most 1000"));
        }

        if self.worker.error_backoff_ms == 0 || self.worker.error_backoff_ms > 60000 {
            return Err(invalid("worker error_backoff_ms must be between 1 and 60000"));
        }

        if self.commands.error_backoff_ms == 0 || self.commands.error_backoff_ms > 60000 {
            return Err(invalid("commands error_backoff_ms must be between 1 and 60000"));
        }

        // Validate socket addresses
        self.forward_target()?;
        self.command_listen()?;

        // Validate sink
        if self.sink.dir.is_empty() {
            return Err(invalid("sink dir cannot be empty"));
        }

        if self.sink.document.is_empty()
            || self.sink.document.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(invalid("sink document must be a plain name"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }

    /// Parsed downstream consumer address
    pub fn forward_target(&self) -> Result<SocketAddr> {
        self.forward
            .target
            .parse()
            .map_err(|_| invalid(format!("invalid forward target: {}", self.forward.target)))
    }

    /// Parsed command listen address
    pub fn command_listen(&self) -> Result<SocketAddr> {
        self.commands
            .listen
            .parse()
            .map_err(|_| {
                invalid(format!("invalid command listen address: {}", self.commands.listen))
            })
    }

    /// Vehicle configuration by index
    pub fn vehicle(&self, index: u8) -> Option<&VehicleConfig> {
        self.vehicles.iter().find(|v| v.index == index)
    }
}

impl WorkerConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[[vehicles]]
index = 1
port = "/dev/ttyUSB0"

[[vehicles]]
index = 2
port = "/dev/ttyUSB1"
sink_collection = "IHA2Data"

[link]

[gate]

[forward]
target = "127.0.0.1:15000"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.vehicles.len(), 2);
        assert_eq!(config.vehicle(1).unwrap().collection(), "vehicle-1");
        assert_eq!(config.vehicle(2).unwrap().collection(), "IHA2Data");
        assert_eq!(config.forward_target().unwrap().port(), 15000);
        assert_eq!(config.gate.interval_ms, 100);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.vehicles.len(), 2);
        assert_eq!(config.link.stream_rate_hz, 50);
        assert_eq!(config.commands.listen, "127.0.0.1:14553");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Config::load("/nonexistent/mav-bridge.toml");
        assert!(matches!(result, Err(crate::error::BridgeError::Io(_))));
    }

    #[test]
    fn test_single_vehicle_rejected() {
        let mut config = Config::default();
        config.vehicles.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_vehicle_index_rejected() {
        let mut config = Config::default();
        config.vehicles[1].index = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_collection_rejected() {
        let mut config = Config::default();
        config.vehicles[0].sink_collection = Some("fleet".to_string());
        config.vehicles[1].sink_collection = Some("fleet".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_collection_with_separator_rejected() {
        let mut config = Config::default();
        config.vehicles[0].sink_collection = Some("a/b".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_port_rejected() {
        let mut config = Config::default();
        config.vehicles[0].port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = Config::default();
        config.vehicles[1].baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in &[9600, 57600, 115200, 921600] {
            let mut config = Config::default();
            config.vehicles[0].baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_stream_rate_bounds() {
        let mut config = Config::default();
        config.link.stream_rate_hz = 0;
        assert!(config.validate().is_err());
        config.link.stream_rate_hz = 201;
        assert!(config.validate().is_err());
        config.link.stream_rate_hz = 200;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_recv_timeout_zero() {
        let mut config = Config::default();
        config.link.recv_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_timeout_too_high() {
        let mut config = Config::default();
        config.link.heartbeat_timeout_ms = 120001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gate_interval_zero() {
        let mut config = Config::default();
        config.gate.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_status_suppress_zero_allowed() {
        let mut config = Config::default();
        config.gate.status_suppress_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_backoff_zero() {
        let mut config = Config::default();
        config.worker.error_backoff_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pause_too_high() {
        let mut config = Config::default();
        config.worker.pause_ms = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_forward_target() {
        let mut config = Config::default();
        config.forward.target = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_command_listen() {
        let mut config = Config::default();
        config.commands.listen = "127.0.0.1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_sink_dir() {
        let mut config = Config::default();
        config.sink.dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_baud_rate(), 57600);
        assert_eq!(default_stream_rate_hz(), 50);
        assert_eq!(default_heartbeat_timeout_ms(), 10000);
        assert_eq!(default_recv_timeout_ms(), 1000);
        assert_eq!(default_system_id(), 255);
        assert_eq!(default_component_id(), 190);
        assert_eq!(default_interval_ms(), 100);
        assert_eq!(default_status_suppress_ms(), 2000);
        assert_eq!(default_pause_ms(), 10);
        assert_eq!(default_error_backoff_ms(), 1000);
        assert_eq!(default_forward_target(), "127.0.0.1:14552");
        assert_eq!(default_command_listen(), "127.0.0.1:14553");
        assert_eq!(default_command_backoff_ms(), 100);
        assert_eq!(default_sink_dir(), "./snapshots");
        assert_eq!(default_sink_document(), "position");
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn test_defaults_follow_module_constants() {
        let config = Config::default();
        assert_eq!(config.gate.interval_ms as i64, DEFAULT_INTERVAL_MS);
        assert_eq!(config.gate.status_suppress_ms as i64, DEFAULT_STATUS_SUPPRESS_MS);
        assert_eq!(config.vehicles[0].baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.link.system_id, DEFAULT_SYSTEM_ID);
        assert_eq!(config.link.component_id, DEFAULT_COMPONENT_ID);
        assert_eq!(config.forward.target, DEFAULT_FORWARD_TARGET);
        assert_eq!(config.sink.document, DEFAULT_DOCUMENT);
    }
}
