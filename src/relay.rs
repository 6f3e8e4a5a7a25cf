//! # Command Relay
//!
//! Receives operator commands as JSON datagrams and turns them into
//! protocol actions on vehicle 1. Vehicle 2 is never commanded.
//!
//! A successful mode change suppresses forwarded STATUS updates for a short
//! window so that stale heartbeats do not flip the displayed mode back.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::command::{decode_command, CommandRequest, DecodedCommand};
use crate::error::Result;
use crate::gate::{RateGate, DEFAULT_STATUS_SUPPRESS_MS};
use crate::link::{LinkAction, VehicleLink};
use crate::telemetry::DataType;

/// Largest accepted command datagram
const MAX_DATAGRAM: usize = 4096;

/// Result of handling one command datagram
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Action delivered to the vehicle
    Sent(LinkAction),
    /// Action could not be delivered
    SendFailed(LinkAction),
    /// Datagram was not a command object
    Malformed,
    /// Unrecognized or incomplete command
    Ignored,
    /// Mode name not in the vehicle's mode table, or no table known yet
    UnknownMode(String),
}

/// UDP command listener bound to vehicle 1
pub struct CommandRelay {
    socket: UdpSocket,
    link: Arc<dyn VehicleLink>,
    gate: Arc<RateGate>,
    clock: Arc<dyn Clock>,
    status_suppress_ms: i64,
    error_backoff: Duration,
}

impl CommandRelay {
    /// Bind the command socket
    ///
    /// # Errors
    ///
    /// Returns error if `listen` cannot be bound
    pub async fn bind(
        listen: SocketAddr,
        link: Arc<dyn VehicleLink>,
        gate: Arc<RateGate>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(listen).await?;
        info!("Command relay listening on {} for vehicle {}", socket.local_addr()?, link.index());

        Ok(Self {
            socket,
            link,
            gate,
            clock,
            status_suppress_ms: DEFAULT_STATUS_SUPPRESS_MS,
            error_backoff: Duration::from_millis(100),
        })
    }

    /// Override the STATUS suppression window applied after a mode change
    pub fn with_status_suppress_ms(mut self, ms: i64) -> Self {
        self.status_suppress_ms = ms;
        self
    }

    /// Override the pause after a socket receive error
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve commands forever
    pub async fn run(&self) {
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    debug!("Command datagram from {} ({} bytes)", from, len);
                    self.handle_datagram(&buf[..len]).await;
                }
                Err(e) => {
                    error!("Command socket receive failed: {}", e);
                    sleep(self.error_backoff).await;
                }
            }
        }
    }

    /// Decode and execute one datagram
    pub async fn handle_datagram(&self, bytes: &[u8]) -> CommandOutcome {
        match decode_command(bytes) {
            Ok(DecodedCommand::Request(request)) => self.execute(request).await,
            Ok(DecodedCommand::Unknown(name)) => {
                debug!("Ignoring unknown command: {:?}", name);
                CommandOutcome::Ignored
            }
            Ok(DecodedCommand::MissingMode) => {
                warn!("SET_MODE without a mode ignored");
                CommandOutcome::Ignored
            }
            Err(e) => {
                warn!("Malformed command datagram: {}", e);
                CommandOutcome::Malformed
            }
        }
    }

    /// Translate a request into a link action and send it
    pub async fn execute(&self, request: CommandRequest) -> CommandOutcome {
        let action = match &request {
            CommandRequest::Arm => LinkAction::ArmDisarm { arm: true },
            CommandRequest::Disarm => LinkAction::ArmDisarm { arm: false },
            CommandRequest::SetMode(name) => {
                let custom_mode = self
                    .link
                    .mode_mapping()
                    .and_then(|mapping| mapping.resolve(name));

                match custom_mode {
                    Some(custom_mode) => LinkAction::SetMode { custom_mode },
                    None => {
                        warn!("Vehicle {}: unknown mode {}", self.link.index(), name);
                        return CommandOutcome::UnknownMode(name.clone());
                    }
                }
            }
        };

        if let Err(e) = self.link.send(action).await {
            error!("Vehicle {}: failed to send {:?}: {}", self.link.index(), action, e);
            return CommandOutcome::SendFailed(action);
        }

        info!("Vehicle {}: sent {:?}", self.link.index(), action);

        if let LinkAction::SetMode { .. } = action {
            let deadline = self.clock.now_ms() + self.status_suppress_ms;
            self.gate.suppress_until(DataType::Status, deadline);
        }

        CommandOutcome::Sent(action)
    }
}
