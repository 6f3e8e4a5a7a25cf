//! # MAV Bridge
//!
//! Bridge MAVLink telemetry from two vehicles to a local consumer and relay
//! operator commands back to vehicle 1.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use mav_bridge::clock::{Clock, SystemClock};
use mav_bridge::config::{Config, LoggingConfig};
use mav_bridge::dispatch::Dispatcher;
use mav_bridge::gate::RateGate;
use mav_bridge::link::{wait_heartbeat, MavlinkLink, VehicleLink};
use mav_bridge::relay::CommandRelay;
use mav_bridge::sink::{JsonFileSink, PositionSink, SinkKey};
use mav_bridge::worker::{SessionWorker, WorkerSettings};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside the log directory
const LOG_FILE_NAME: &str = "mav-bridge.log";

/// Main entry point for MAV Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging with tracing subscriber
///    - Open both vehicle links and wait for a heartbeat on each
///    - Bind the forward socket and the command socket
///
/// 2. **Main Loop**
///    - One session worker per vehicle
///    - Command relay serving vehicle 1
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if:
/// - The configuration file is invalid
/// - A serial port cannot be opened
/// - A vehicle sends no heartbeat within the timeout
/// - A UDP socket cannot be bound
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, from_file) = load_config(&config_path)?;

    let _log_guard = init_logging(&config.logging)?;

    info!("MAV Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    if from_file {
        info!("Loaded configuration from {}", config_path);
    } else {
        warn!("{} not found, using built-in defaults", config_path);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gate = Arc::new(RateGate::new(config.gate.interval_ms as i64));
    let sink: Arc<dyn PositionSink> = Arc::new(JsonFileSink::new(&config.sink.dir));

    let dispatcher = Dispatcher::bind(config.forward_target()?)
        .await
        .context("failed to bind forward socket")?;
    let dispatcher = Arc::new(dispatcher);
    info!("Forwarding telemetry to {}", dispatcher.target());

    // Open both links before any worker starts
    let heartbeat_timeout = Duration::from_millis(config.link.heartbeat_timeout_ms);
    let mut links: Vec<(Arc<dyn VehicleLink>, SinkKey)> = Vec::new();

    for index in [1u8, 2] {
        let vehicle = config
            .vehicle(index)
            .with_context(|| format!("vehicle {} missing from configuration", index))?;

        let link = MavlinkLink::open(index, &vehicle.port, vehicle.baud_rate)
            .with_context(|| format!("failed to open vehicle {} link", index))?
            .with_source_ids(config.link.system_id, config.link.component_id);
        let link: Arc<dyn VehicleLink> = Arc::new(link);

        let heartbeat = wait_heartbeat(link.as_ref(), heartbeat_timeout)
            .await
            .with_context(|| format!("vehicle {} did not announce itself", index))?;
        info!(
            "Vehicle {}: heartbeat received on {} (type {}, mode {})",
            index, vehicle.port, heartbeat.vehicle_type, heartbeat.custom_mode
        );

        links.push((link, SinkKey::new(vehicle.collection(), config.sink.document.clone())));
    }

    let relay = CommandRelay::bind(
        config.command_listen()?,
        Arc::clone(&links[0].0),
        Arc::clone(&gate),
        Arc::clone(&clock),
    )
    .await
    .context("failed to bind command socket")?
    .with_status_suppress_ms(config.gate.status_suppress_ms as i64)
    .with_error_backoff(Duration::from_millis(config.commands.error_backoff_ms));

    let settings = WorkerSettings::from_config(&config);
    let mut tasks = Vec::new();

    for (link, sink_key) in links {
        let worker = SessionWorker::new(
            link,
            Arc::clone(&sink),
            sink_key,
            Arc::clone(&gate),
            Arc::clone(&dispatcher),
            Arc::clone(&clock),
            settings,
        );
        tasks.push(tokio::spawn(async move { worker.run().await }));
    }

    tasks.push(tokio::spawn(async move { relay.run().await }));

    info!("Bridge running, press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("Received Ctrl+C, shutting down...");
    for task in tasks {
        task.abort();
    }

    Ok(())
}

/// Load configuration, falling back to defaults when the file is absent
///
/// Returns the configuration and whether it came from the file.
fn load_config(path: &str) -> Result<(Config, bool)> {
    if !Path::new(path).exists() {
        return Ok((Config::default(), false));
    }

    let config = Config::load(path).with_context(|| format!("invalid configuration in {}", path))?;
    Ok((config, true))
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. When a log directory is set,
/// output also goes to a daily rolling file; the returned guard must be kept
/// alive for the file writer to flush.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (file_writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stdout.and(file_writer))
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;

            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let (config, from_file) = load_config("/nonexistent/mav-bridge.toml").unwrap();
        assert!(!from_file);
        assert_eq!(config.vehicles.len(), 2);
        assert_eq!(config.forward.target, "127.0.0.1:14552");
    }

    #[test]
    fn test_invalid_config_file_is_fatal() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[link]\nstream_rate_hz = 0\n").unwrap();
        file.flush().unwrap();

        assert!(load_config(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_bundled_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let (config, from_file) = load_config(path).unwrap();
        assert!(from_file);
        assert_eq!(config.link.stream_rate_hz, 50);
        assert_eq!(config.gate.interval_ms, 100);
    }
}
