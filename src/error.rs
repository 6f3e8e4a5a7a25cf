//! # Error Types
//!
//! Custom error types for MAV Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for MAV Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// MAVLink framing or message errors
    #[error("MAVLink protocol error: {0}")]
    Protocol(String),

    /// Serial port errors on an open link
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Vehicle never announced itself on the link
    #[error("No heartbeat on vehicle link {0} within {1} ms")]
    HeartbeatTimeout(u8, u64),

    /// Persistence sink errors
    #[error("Sink error: {0}")]
    Sink(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for MAV Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
