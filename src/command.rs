//! # Operator Commands
//!
//! Structural decoding of inbound command datagrams.
//!
//! ```text
//! {"command": "ARM"}
//! {"command": "DISARM"}
//! {"command": "SET_MODE", "mode": "LOITER"}
//! ```

use serde::Deserialize;

use crate::error::Result;

/// Decoded operator request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    Arm,
    Disarm,
    SetMode(String),
}

/// Result of decoding a structurally valid command object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCommand {
    /// Recognized request
    Request(CommandRequest),
    /// `command` missing or not one we handle
    Unknown(Option<String>),
    /// `SET_MODE` without a `mode`
    MissingMode,
}

#[derive(Debug, Deserialize)]
struct InboundCommand {
    command: Option<String>,
    mode: Option<String>,
}

/// Decode one command datagram
///
/// # Errors
///
/// Returns a JSON error if the bytes are not a JSON object with string
/// `command`/`mode` fields
pub fn decode_command(bytes: &[u8]) -> Result<DecodedCommand> {
    let inbound: InboundCommand = serde_json::from_slice(bytes)?;

    let decoded = match inbound.command.as_deref() {
        Some("ARM") => DecodedCommand::Request(CommandRequest::Arm),
        Some("DISARM") => DecodedCommand::Request(CommandRequest::Disarm),
        Some("SET_MODE") => match inbound.mode {
            Some(mode) if !mode.is_empty() => {
                DecodedCommand::Request(CommandRequest::SetMode(mode))
            }
            _ => DecodedCommand::MissingMode,
        },
        _ => DecodedCommand::Unknown(inbound.command),
    };

    Ok(decoded)
}
