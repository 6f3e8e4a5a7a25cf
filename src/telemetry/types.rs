//! # Telemetry Types
//!
//! Raw link records as supplied by the vehicle link, and the converted
//! domain structs that are forwarded downstream or persisted.

use serde::Serialize;

/// Decoded record received from a vehicle link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkRecord {
    /// GLOBAL_POSITION_INT
    Position(RawPosition),
    /// ATTITUDE
    Attitude(RawAttitude),
    /// SYS_STATUS
    Battery(RawBattery),
    /// GPS_RAW_INT
    Gps(RawGps),
    /// HEARTBEAT
    Heartbeat(RawHeartbeat),
    /// Any other message, by message id
    Other(u32),
}

/// Raw global position fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawPosition {
    /// Latitude in degE7
    pub lat: i32,
    /// Longitude in degE7
    pub lon: i32,
    /// Altitude (MSL) in mm
    pub alt: i32,
    /// Altitude above home in mm
    pub relative_alt: i32,
    /// Ground X speed in cm/s
    pub vx: i16,
    /// Ground Y speed in cm/s
    pub vy: i16,
    /// Ground Z speed in cm/s
    pub vz: i16,
    /// Heading in cdeg
    pub hdg: u16,
}

/// Raw attitude fields (radians, rad/s)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawAttitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
}

/// Raw battery fields from the system status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawBattery {
    /// Battery voltage in mV (0 = unknown)
    pub voltage_battery: u16,
    /// Battery current in cA (-1 = unknown)
    pub current_battery: i16,
    /// Remaining capacity in percent (-1 = unknown)
    pub battery_remaining: i8,
    /// Battery temperature (0 when not reported)
    pub temperature: i16,
}

/// Raw GPS fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawGps {
    /// GPS_FIX_TYPE value
    pub fix_type: u8,
    pub satellites_visible: u8,
    /// Horizontal position uncertainty, scaled by 100 (65535 = unknown)
    pub eph: u16,
    /// Vertical position uncertainty, scaled by 100 (65535 = unknown)
    pub epv: u16,
    /// Horizontal dilution of precision, scaled by 100
    pub hdop: u16,
    /// Vertical dilution of precision, scaled by 100
    pub vdop: u16,
}

/// Raw heartbeat fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawHeartbeat {
    /// MAV_MODE_FLAG bits
    pub base_mode: u8,
    /// Autopilot specific mode id
    pub custom_mode: u32,
    /// MAV_STATE value
    pub system_status: u8,
    /// MAV_TYPE value
    pub vehicle_type: u8,
    /// MAV_AUTOPILOT value
    pub autopilot: u8,
}

/// Data types that pass through the rate gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Attitude,
    Battery,
    Gps,
    Status,
}

impl DataType {
    /// All gated data types
    pub const ALL: [DataType; 4] = [
        DataType::Attitude,
        DataType::Battery,
        DataType::Gps,
        DataType::Status,
    ];

    /// Envelope type name
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Attitude => "ATTITUDE",
            DataType::Battery => "BATTERY",
            DataType::Gps => "GPS",
            DataType::Status => "STATUS",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPS fix quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FixStatus {
    #[serde(rename = "NO_FIX")]
    NoFix,
    #[serde(rename = "FIX_2D")]
    Fix2d,
    #[serde(rename = "FIX_3D")]
    Fix3d,
}

/// Position snapshot written to the persistence sink
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSnapshot {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub relative_alt: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub hdg: f64,
    pub ground_speed: f64,
    pub timestamp: i64,
}

/// Attitude in degrees and degrees per second
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttitudeData {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub rollspeed: f64,
    pub pitchspeed: f64,
    pub yawspeed: f64,
    pub timestamp: i64,
}

/// Battery state in volts, amps and percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryData {
    pub voltage: f64,
    pub current: f64,
    pub remaining: i8,
    pub temperature: i16,
    pub timestamp: i64,
}

/// GPS quality summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsData {
    pub fix_type: u8,
    pub satellites_visible: u8,
    pub eph: f64,
    pub epv: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub fix_status: FixStatus,
    pub timestamp: i64,
}

/// Vehicle status derived from a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusData {
    pub mode: &'static str,
    pub armed: bool,
    pub system_status: &'static str,
    pub safety_switch: bool,
    pub timestamp: i64,
}

/// Converted sample eligible for forwarding
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GatedSample {
    Attitude(AttitudeData),
    Battery(BatteryData),
    Gps(GpsData),
    Status(StatusData),
}

impl GatedSample {
    /// Rate gate slot this sample competes for
    pub fn data_type(&self) -> DataType {
        match self {
            GatedSample::Attitude(_) => DataType::Attitude,
            GatedSample::Battery(_) => DataType::Battery,
            GatedSample::Gps(_) => DataType::Gps,
            GatedSample::Status(_) => DataType::Status,
        }
    }
}

/// A converted telemetry sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetrySample {
    /// Persisted, never gated
    Position(PositionSnapshot),
    /// Rate gated and forwarded
    Gated(GatedSample),
}
