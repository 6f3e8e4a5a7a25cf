//! # MAVLink Serial Link
//!
//! Vehicle session over a byte stream (normally a serial port).
//!
//! The link is shared between the session worker (receive side) and the
//! command relay (send side), so both halves sit behind their own lock.
//! Heartbeats from the vehicle update the target ids used for outbound
//! actions and the vehicle type used for mode resolution.

use async_trait::async_trait;
use mavlink::ardupilotmega::{
    MavCmd, MavMessage, COMMAND_LONG_DATA, REQUEST_DATA_STREAM_DATA,
};
use mavlink::MavHeader;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace};

use super::frame::{encode_message, FrameDecoder, RawFrame};
use super::{LinkAction, VehicleLink, FORCE_ARM_MAGIC};
use crate::error::{BridgeError, Result};
use crate::telemetry::{
    LinkRecord, ModeMapping, RawAttitude, RawBattery, RawGps, RawHeartbeat, RawPosition,
};

/// Default vehicle telemetry baud rate
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Our MAVLink system id (ground station range)
pub const DEFAULT_SYSTEM_ID: u8 = 255;

/// Our MAVLink component id (MAV_COMP_ID_MISSIONPLANNER)
pub const DEFAULT_COMPONENT_ID: u8 = 190;

/// MAV_TYPE_GCS, heartbeats from other ground stations are not a vehicle
const MAV_TYPE_GCS: u8 = 6;

/// MAV_AUTOPILOT_INVALID, sent by gimbals, companions and other peripherals
const MAV_AUTOPILOT_INVALID: u8 = 8;

/// MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
const MODE_FLAG_CUSTOM_MODE_ENABLED: f32 = 1.0;

/// Read chunk size
const READ_BUF_SIZE: usize = 512;

/// Vehicle identity learned from heartbeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleIdentity {
    pub system_id: u8,
    pub component_id: u8,
    pub vehicle_type: u8,
}

struct LinkReader<S> {
    stream: ReadHalf<S>,
    decoder: FrameDecoder,
}

impl<S: AsyncRead> LinkReader<S> {
    /// Read until one frame parses into a dialect message
    async fn next_message(&mut self) -> Result<(RawFrame, MavMessage)> {
        let mut chunk = [0u8; READ_BUF_SIZE];

        loop {
            while let Some(frame) = self.decoder.next_frame() {
                match frame.parse() {
                    Ok(message) => return Ok((frame, message)),
                    Err(e) => trace!("Dropping frame: {}", e),
                }
            }

            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| BridgeError::Serial(format!("Failed to read: {}", e)))?;

            if n == 0 {
                return Err(BridgeError::Serial("Link closed".to_string()));
            }

            self.decoder.push(&chunk[..n]);
        }
    }
}

/// MAVLink session over an async byte stream
pub struct MavlinkLink<S> {
    index: u8,
    device_path: String,
    system_id: u8,
    component_id: u8,
    reader: Mutex<LinkReader<S>>,
    writer: Mutex<WriteHalf<S>>,
    sequence: AtomicU8,
    identity: StdMutex<Option<VehicleIdentity>>,
}

impl<S> std::fmt::Debug for MavlinkLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MavlinkLink")
            .field("index", &self.index)
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl MavlinkLink<tokio_serial::SerialStream> {
    /// Open a vehicle link on a serial port
    ///
    /// # Arguments
    ///
    /// * `index` - Link index (1 or 2)
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Telemetry radio baud rate
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if the device cannot be opened
    pub fn open(index: u8, path: &str, baud_rate: u32) -> Result<Self> {
        debug!("Trying to open serial port: {}", path);

        let port = Self::open_port(path, baud_rate)
            .map_err(|e| BridgeError::SerialPortNotFound(format!("{} ({})", path, e)))?;

        info!("Vehicle {}: opened {} at {} baud", index, path, baud_rate);
        Ok(Self::from_stream(index, path, port))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl<S: AsyncRead + AsyncWrite> MavlinkLink<S> {
    /// Wrap an already open byte stream
    pub fn from_stream(index: u8, device_path: &str, stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            index,
            device_path: device_path.to_string(),
            system_id: DEFAULT_SYSTEM_ID,
            component_id: DEFAULT_COMPONENT_ID,
            reader: Mutex::new(LinkReader {
                stream: read_half,
                decoder: FrameDecoder::new(),
            }),
            writer: Mutex::new(write_half),
            sequence: AtomicU8::new(0),
            identity: StdMutex::new(None),
        }
    }

    /// Override our own MAVLink system and component ids
    pub fn with_source_ids(mut self, system_id: u8, component_id: u8) -> Self {
        self.system_id = system_id;
        self.component_id = component_id;
        self
    }

    /// Device path this link was opened on
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Vehicle identity from the latest heartbeat, if any
    pub fn identity(&self) -> Option<VehicleIdentity> {
        *self.identity.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn observe_heartbeat(&self, frame: &RawFrame, hb: &RawHeartbeat) {
        if hb.vehicle_type == MAV_TYPE_GCS || hb.autopilot == MAV_AUTOPILOT_INVALID {
            return;
        }

        let identity = VehicleIdentity {
            system_id: frame.system_id,
            component_id: frame.component_id,
            vehicle_type: hb.vehicle_type,
        };

        let mut current = self.identity.lock().unwrap_or_else(|e| e.into_inner());
        if *current != Some(identity) {
            info!(
                "Vehicle {}: target system {} component {} (MAV_TYPE {})",
                self.index, identity.system_id, identity.component_id, identity.vehicle_type
            );
            *current = Some(identity);
        }
    }

    fn build_message(&self, action: LinkAction) -> MavMessage {
        let (target_system, target_component) = self
            .identity()
            .map(|id| (id.system_id, id.component_id))
            .unwrap_or((1, 1));

        let command_long = |command: MavCmd, param1: f32, param2: f32| {
            MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
                param1,
                param2,
                param3: 0.0,
                param4: 0.0,
                param5: 0.0,
                param6: 0.0,
                param7: 0.0,
                command,
                target_system,
                target_component,
                confirmation: 0,
            })
        };

        match action {
            LinkAction::RequestDataStream { stream_id, rate_hz, start } => {
                MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
                    req_message_rate: rate_hz,
                    target_system,
                    target_component,
                    req_stream_id: stream_id,
                    start_stop: start as u8,
                })
            }
            LinkAction::ArmDisarm { arm } => command_long(
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                if arm { 1.0 } else { 0.0 },
                FORCE_ARM_MAGIC,
            ),
            LinkAction::SetMode { custom_mode } => command_long(
                MavCmd::MAV_CMD_DO_SET_MODE,
                MODE_FLAG_CUSTOM_MODE_ENABLED,
                custom_mode as f32,
            ),
        }
    }
}

/// Map a dialect message onto the records the bridge consumes
pub fn record_from_message(message: MavMessage) -> LinkRecord {
    use mavlink::Message;

    match message {
        MavMessage::GLOBAL_POSITION_INT(d) => LinkRecord::Position(RawPosition {
            lat: d.lat,
            lon: d.lon,
            alt: d.alt,
            relative_alt: d.relative_alt,
            vx: d.vx,
            vy: d.vy,
            vz: d.vz,
            hdg: d.hdg,
        }),
        MavMessage::ATTITUDE(d) => LinkRecord::Attitude(RawAttitude {
            roll: d.roll,
            pitch: d.pitch,
            yaw: d.yaw,
            rollspeed: d.rollspeed,
            pitchspeed: d.pitchspeed,
            yawspeed: d.yawspeed,
        }),
        // SYS_STATUS carries no battery temperature
        MavMessage::SYS_STATUS(d) => LinkRecord::Battery(RawBattery {
            voltage_battery: d.voltage_battery,
            current_battery: d.current_battery,
            battery_remaining: d.battery_remaining,
            temperature: 0,
        }),
        // GPS_RAW_INT has no separate DOP fields
        MavMessage::GPS_RAW_INT(d) => LinkRecord::Gps(RawGps {
            fix_type: d.fix_type as u8,
            satellites_visible: d.satellites_visible,
            eph: d.eph,
            epv: d.epv,
            hdop: 0,
            vdop: 0,
        }),
        MavMessage::HEARTBEAT(d) => LinkRecord::Heartbeat(RawHeartbeat {
            base_mode: d.base_mode.bits(),
            custom_mode: d.custom_mode,
            system_status: d.system_status as u8,
            vehicle_type: d.mavtype as u8,
            autopilot: d.autopilot as u8,
        }),
        other => LinkRecord::Other(other.message_id()),
    }
}

#[async_trait]
impl<S> VehicleLink for MavlinkLink<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn index(&self) -> u8 {
        self.index
    }

    async fn send(&self, action: LinkAction) -> Result<()> {
        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let bytes = encode_message(header, &self.build_message(action))?;

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to write action: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to flush link: {}", e)))?;

        debug!("Vehicle {}: sent {:?} ({} bytes)", self.index, action, bytes.len());
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<LinkRecord>> {
        let mut reader = self.reader.lock().await;

        let (frame, message) = match tokio::time::timeout(timeout, reader.next_message()).await {
            Ok(result) => result?,
            Err(_) => return Ok(None),
        };
        drop(reader);

        let record = record_from_message(message);
        if let LinkRecord::Heartbeat(hb) = &record {
            self.observe_heartbeat(&frame, hb);
        }

        Ok(Some(record))
    }

    fn mode_mapping(&self) -> Option<ModeMapping> {
        self.identity()
            .and_then(|id| ModeMapping::for_vehicle_type(id.vehicle_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::frame::FrameDecoder;
    use mavlink::ardupilotmega::{HEARTBEAT_DATA, MavAutopilot, MavModeFlag, MavState, MavType};
    use tokio::io::{duplex, DuplexStream};

    fn vehicle_heartbeat(mavtype: MavType, custom_mode: u32) -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode,
            mavtype,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode: MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
                | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    fn vehicle_frame(system_id: u8, message: &MavMessage) -> Vec<u8> {
        let header = MavHeader {
            system_id,
            component_id: 1,
            sequence: 0,
        };
        encode_message(header, message).unwrap()
    }

    fn link_pair() -> (MavlinkLink<DuplexStream>, DuplexStream) {
        let (ours, vehicle) = duplex(4096);
        (MavlinkLink::from_stream(1, "duplex", ours), vehicle)
    }

    async fn read_sent(vehicle: &mut DuplexStream) -> Vec<MavMessage> {
        let mut buf = [0u8; 1024];
        let n = vehicle.read(&mut buf).await.unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&buf[..n]);
        std::iter::from_fn(|| decoder.next_frame())
            .map(|f| f.parse().unwrap())
            .collect()
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_BAUD_RATE, 57_600);
        assert_eq!(DEFAULT_SYSTEM_ID, 255);
    }

    #[test]
    fn test_open_invalid_path_returns_not_found() {
        let result =
            MavlinkLink::open(1, "/dev/nonexistent_serial_device_12345", DEFAULT_BAUD_RATE);

        match result {
            Err(BridgeError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recv_decodes_heartbeat_and_learns_identity() {
        let (link, mut vehicle) = link_pair();
        assert!(link.identity().is_none());
        assert!(link.mode_mapping().is_none());

        vehicle
            .write_all(&vehicle_frame(7, &vehicle_heartbeat(MavType::MAV_TYPE_QUADROTOR, 6)))
            .await
            .unwrap();

        let record = link.recv(Duration::from_secs(1)).await.unwrap();
        match record {
            Some(LinkRecord::Heartbeat(hb)) => {
                assert_eq!(hb.custom_mode, 6);
                assert_eq!(hb.base_mode & 0x80, 0x80);
                assert_eq!(hb.system_status, 4);
                assert_eq!(hb.vehicle_type, 2);
                assert_eq!(hb.autopilot, 3);
            }
            other => panic!("Expected heartbeat, got: {:?}", other),
        }

        let identity = link.identity().unwrap();
        assert_eq!(identity.system_id, 7);
        assert_eq!(identity.component_id, 1);
        assert_eq!(link.mode_mapping().unwrap().resolve("LOITER"), Some(5));
    }

    #[tokio::test]
    async fn test_gcs_heartbeat_does_not_set_identity() {
        let (link, mut vehicle) = link_pair();

        vehicle
            .write_all(&vehicle_frame(255, &vehicle_heartbeat(MavType::MAV_TYPE_GCS, 0)))
            .await
            .unwrap();

        assert!(link.recv(Duration::from_secs(1)).await.unwrap().is_some());
        assert!(link.identity().is_none());
    }

    #[tokio::test]
    async fn test_peripheral_heartbeat_keeps_vehicle_identity() {
        let (link, mut vehicle) = link_pair();

        vehicle
            .write_all(&vehicle_frame(1, &vehicle_heartbeat(MavType::MAV_TYPE_QUADROTOR, 5)))
            .await
            .unwrap();
        link.recv(Duration::from_secs(1)).await.unwrap();

        let gimbal = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GIMBAL,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        });
        let header = MavHeader {
            system_id: 1,
            component_id: 154,
            sequence: 1,
        };
        vehicle
            .write_all(&encode_message(header, &gimbal).unwrap())
            .await
            .unwrap();

        match link.recv(Duration::from_secs(1)).await.unwrap() {
            Some(LinkRecord::Heartbeat(hb)) => assert_eq!(hb.autopilot, MAV_AUTOPILOT_INVALID),
            other => panic!("Expected heartbeat, got: {:?}", other),
        }

        let identity = link.identity().unwrap();
        assert_eq!(identity.component_id, 1);
        assert_eq!(identity.vehicle_type, 2);
        assert_eq!(link.mode_mapping().unwrap().resolve("LOITER"), Some(5));

        link.send(LinkAction::ArmDisarm { arm: true }).await.unwrap();
        match &read_sent(&mut vehicle).await[..] {
            [MavMessage::COMMAND_LONG(cmd)] => {
                assert_eq!(cmd.target_system, 1);
                assert_eq!(cmd.target_component, 1);
            }
            other => panic!("Expected one COMMAND_LONG, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recv_times_out_without_data() {
        let (link, _vehicle) = link_pair();
        let record = link.recv(Duration::from_millis(20)).await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_recv_reports_closed_link() {
        let (link, vehicle) = link_pair();
        drop(vehicle);

        match link.recv(Duration::from_secs(1)).await {
            Err(BridgeError::Serial(msg)) => assert!(msg.contains("closed")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_arm_sends_forced_component_arm_disarm() {
        let (link, mut vehicle) = link_pair();
        vehicle
            .write_all(&vehicle_frame(3, &vehicle_heartbeat(MavType::MAV_TYPE_QUADROTOR, 0)))
            .await
            .unwrap();
        link.recv(Duration::from_secs(1)).await.unwrap();

        link.send(LinkAction::ArmDisarm { arm: true }).await.unwrap();

        let sent = read_sent(&mut vehicle).await;
        match &sent[..] {
            [MavMessage::COMMAND_LONG(cmd)] => {
                assert_eq!(cmd.command, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM);
                assert_eq!(cmd.param1, 1.0);
                assert_eq!(cmd.param2, 21196.0);
                assert_eq!(cmd.confirmation, 0);
                assert_eq!(cmd.target_system, 3);
            }
            other => panic!("Expected one COMMAND_LONG, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_mode_sends_custom_mode() {
        let (link, mut vehicle) = link_pair();

        link.send(LinkAction::SetMode { custom_mode: 5 }).await.unwrap();

        let sent = read_sent(&mut vehicle).await;
        match &sent[..] {
            [MavMessage::COMMAND_LONG(cmd)] => {
                assert_eq!(cmd.command, MavCmd::MAV_CMD_DO_SET_MODE);
                assert_eq!(cmd.param1, 1.0);
                assert_eq!(cmd.param2, 5.0);
            }
            other => panic!("Expected one COMMAND_LONG, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_stream_encoding() {
        let (link, mut vehicle) = link_pair();

        link.send(LinkAction::RequestDataStream {
            stream_id: 3,
            rate_hz: 50,
            start: true,
        })
        .await
        .unwrap();

        let sent = read_sent(&mut vehicle).await;
        match &sent[..] {
            [MavMessage::REQUEST_DATA_STREAM(req)] => {
                assert_eq!(req.req_stream_id, 3);
                assert_eq!(req.req_message_rate, 50);
                assert_eq!(req.start_stop, 1);
            }
            other => panic!("Expected one REQUEST_DATA_STREAM, got: {:?}", other),
        }
    }
}
