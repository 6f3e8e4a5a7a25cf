//! # Session Worker
//!
//! One worker per vehicle. It pulls records off the vehicle link, converts
//! them, persists position snapshots and forwards everything else through
//! the shared rate gate.
//!
//! The loop never exits on its own. Any error in one iteration is logged,
//! followed by a backoff pause, and the loop carries on.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::gate::RateGate;
use crate::link::{VehicleLink, DEFAULT_STREAM_RATE_HZ};
use crate::sink::{PositionSink, SinkKey};
use crate::telemetry::{convert_record, DataType, TelemetrySample};

/// Worker pacing
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Requested telemetry stream rate
    pub stream_rate_hz: u16,
    /// Maximum wait for one record
    pub recv_timeout: Duration,
    /// Pause after each handled record
    pub pause: Duration,
    /// Pause after a failed iteration
    pub error_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            stream_rate_hz: DEFAULT_STREAM_RATE_HZ,
            recv_timeout: Duration::from_millis(1000),
            pause: Duration::from_millis(10),
            error_backoff: Duration::from_millis(1000),
        }
    }
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stream_rate_hz: config.link.stream_rate_hz,
            recv_timeout: Duration::from_millis(config.link.recv_timeout_ms),
            pause: config.worker.pause(),
            error_backoff: config.worker.error_backoff(),
        }
    }
}

/// What happened to one received record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Position snapshot written to the sink
    Persisted,
    /// Sample admitted by the gate and sent downstream
    Forwarded(DataType),
    /// Sample rejected by the gate
    Dropped(DataType),
    /// Sample admitted but the datagram could not be sent
    SendFailed(DataType),
    /// Record type the bridge does not handle
    Ignored,
}

/// Per-vehicle telemetry loop
pub struct SessionWorker {
    link: Arc<dyn VehicleLink>,
    sink: Arc<dyn PositionSink>,
    sink_key: SinkKey,
    gate: Arc<RateGate>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    settings: WorkerSettings,
}

impl SessionWorker {
    pub fn new(
        link: Arc<dyn VehicleLink>,
        sink: Arc<dyn PositionSink>,
        sink_key: SinkKey,
        gate: Arc<RateGate>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            link,
            sink,
            sink_key,
            gate,
            dispatcher,
            clock,
            settings,
        }
    }

    /// Vehicle index served by this worker
    pub fn index(&self) -> u8 {
        self.link.index()
    }

    /// Request telemetry streams, then process records forever
    pub async fn run(&self) {
        let index = self.index();

        if let Err(e) = self.link.request_telemetry(self.settings.stream_rate_hz).await {
            warn!("Vehicle {}: telemetry stream request failed: {}", index, e);
        }

        info!(
            "Vehicle {}: session worker started (snapshots to {})",
            index, self.sink_key
        );

        loop {
            match self.step().await {
                Ok(Some(outcome)) => {
                    trace!("Vehicle {}: {:?}", index, outcome);
                    sleep(self.settings.pause).await;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Vehicle {}: telemetry loop error: {}", index, e);
                    sleep(self.settings.error_backoff).await;
                }
            }
        }
    }

    /// Receive and handle at most one record
    ///
    /// Returns `Ok(None)` when the receive timed out.
    ///
    /// # Errors
    ///
    /// Returns the link's receive error or the sink's write error.
    /// Forwarding failures are reported as `StepOutcome::SendFailed`.
    pub async fn step(&self) -> Result<Option<StepOutcome>> {
        let record = match self.link.recv(self.settings.recv_timeout).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        let now = self.clock.now_ms();

        let outcome = match convert_record(&record, now) {
            None => StepOutcome::Ignored,
            Some(TelemetrySample::Position(snapshot)) => {
                self.sink.write(&self.sink_key, &snapshot).await?;
                StepOutcome::Persisted
            }
            Some(TelemetrySample::Gated(sample)) => {
                let kind = sample.data_type();
                if !self.gate.admit(kind, now) {
                    StepOutcome::Dropped(kind)
                } else if self.dispatcher.forward(kind, &sample).await {
                    debug!("Vehicle {}: forwarded {}", self.index(), kind);
                    StepOutcome::Forwarded(kind)
                } else {
                    StepOutcome::SendFailed(kind)
                }
            }
        };

        Ok(Some(outcome))
    }
}
