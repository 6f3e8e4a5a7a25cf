//! # Vehicle Link Module
//!
//! Sessions to the vehicles over MAVLink.
//!
//! This module handles:
//! - The `VehicleLink` abstraction used by the workers and the command relay
//! - Protocol actions (stream requests, arm/disarm, mode changes)
//! - MAVLink framing and checksum validation
//! - Serial transport and vehicle identity tracking

pub mod frame;
pub mod serial;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::telemetry::{LinkRecord, ModeMapping, RawHeartbeat};

pub use serial::MavlinkLink;

/// Telemetry stream ids requested on session start (MAV_DATA_STREAM 0..=5)
pub const TELEMETRY_STREAM_IDS: std::ops::RangeInclusive<u8> = 0..=5;

/// Default requested stream rate
pub const DEFAULT_STREAM_RATE_HZ: u16 = 50;

/// COMPONENT_ARM_DISARM param2 value that bypasses pre-arm checks
pub const FORCE_ARM_MAGIC: f32 = 21196.0;

/// Protocol action sent to a vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkAction {
    /// REQUEST_DATA_STREAM
    RequestDataStream { stream_id: u8, rate_hz: u16, start: bool },
    /// COMPONENT_ARM_DISARM with the force magic, confirmation 0
    ArmDisarm { arm: bool },
    /// Switch to an autopilot custom mode
    SetMode { custom_mode: u32 },
}

/// Open session to one vehicle
#[async_trait]
pub trait VehicleLink: Send + Sync {
    /// Link index (1 or 2)
    fn index(&self) -> u8;

    /// Send a protocol action to the vehicle
    async fn send(&self, action: LinkAction) -> Result<()>;

    /// Receive the next decoded record
    ///
    /// Returns `Ok(None)` when nothing arrived within `timeout`.
    async fn recv(&self, timeout: Duration) -> Result<Option<LinkRecord>>;

    /// Mode table for the vehicle type last advertised on this link
    fn mode_mapping(&self) -> Option<ModeMapping>;

    /// Request all telemetry streams at `rate_hz`
    async fn request_telemetry(&self, rate_hz: u16) -> Result<()> {
        for stream_id in TELEMETRY_STREAM_IDS {
            self.send(LinkAction::RequestDataStream {
                stream_id,
                rate_hz,
                start: true,
            })
            .await?;
        }
        debug!("Vehicle {}: requested telemetry streams at {}Hz", self.index(), rate_hz);
        Ok(())
    }
}

/// Block until the vehicle announces itself with a heartbeat
///
/// # Errors
///
/// Returns `HeartbeatTimeout` if no heartbeat arrives within `timeout`, or
/// the link's receive error.
pub async fn wait_heartbeat(link: &dyn VehicleLink, timeout: Duration) -> Result<RawHeartbeat> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(BridgeError::HeartbeatTimeout(
                link.index(),
                timeout.as_millis() as u64,
            ));
        }

        if let Some(LinkRecord::Heartbeat(hb)) = link.recv(remaining).await? {
            return Ok(hb);
        }
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted vehicle link for testing
    #[derive(Clone)]
    pub struct MockVehicleLink {
        pub index: u8,
        pub incoming: Arc<Mutex<VecDeque<Result<Option<LinkRecord>>>>>,
        pub sent: Arc<Mutex<Vec<LinkAction>>>,
        pub mapping: Arc<Mutex<Option<ModeMapping>>>,
        pub send_error: Arc<Mutex<bool>>,
    }

    impl MockVehicleLink {
        pub fn new(index: u8) -> Self {
            Self {
                index,
                incoming: Arc::new(Mutex::new(VecDeque::new())),
                sent: Arc::new(Mutex::new(Vec::new())),
                mapping: Arc::new(Mutex::new(None)),
                send_error: Arc::new(Mutex::new(false)),
            }
        }

        pub fn push_record(&self, record: LinkRecord) {
            self.incoming.lock().unwrap().push_back(Ok(Some(record)));
        }

        pub fn push_timeout(&self) {
            self.incoming.lock().unwrap().push_back(Ok(None));
        }

        pub fn push_error(&self, error: BridgeError) {
            self.incoming.lock().unwrap().push_back(Err(error));
        }

        pub fn set_mapping(&self, mapping: Option<ModeMapping>) {
            *self.mapping.lock().unwrap() = mapping;
        }

        pub fn set_send_error(&self, fail: bool) {
            *self.send_error.lock().unwrap() = fail;
        }

        pub fn sent_actions(&self) -> Vec<LinkAction> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VehicleLink for MockVehicleLink {
        fn index(&self) -> u8 {
            self.index
        }

        async fn send(&self, action: LinkAction) -> Result<()> {
            if *self.send_error.lock().unwrap() {
                return Err(BridgeError::Serial("Mock send error".to_string()));
            }
            self.sent.lock().unwrap().push(action);
            Ok(())
        }

        async fn recv(&self, timeout: Duration) -> Result<Option<LinkRecord>> {
            let next = self.incoming.lock().unwrap().pop_front();
            match next {
                Some(item) => item,
                None => {
                    tokio::time::sleep(timeout).await;
                    Ok(None)
                }
            }
        }

        fn mode_mapping(&self) -> Option<ModeMapping> {
            *self.mapping.lock().unwrap()
        }
    }
}
