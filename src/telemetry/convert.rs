//! # Unit Conversion and Classification
//!
//! Pure functions turning raw link records into domain units.
//!
//! Sentinel values that mean "unknown" on the wire are reported as 0
//! instead of being scaled.

use super::modes::{flight_mode_name, system_status_name};
use super::types::*;

/// MAV_MODE_FLAG_SAFETY_ARMED
pub const MODE_FLAG_SAFETY_ARMED: u8 = 0x80;

/// MAV_MODE_FLAG_SAFETY_ENABLED (hardware safety switch)
pub const MODE_FLAG_SAFETY_ENABLED: u8 = 0x01;

/// Unknown battery voltage
const VOLTAGE_UNKNOWN: u16 = 0;

/// Unknown battery current / remaining capacity
const CURRENT_UNKNOWN: i16 = -1;
const REMAINING_UNKNOWN: i8 = -1;

/// Unknown GPS position uncertainty
const EPH_EPV_UNKNOWN: u16 = u16::MAX;

/// Convert a raw position into a persisted snapshot
pub fn convert_position(raw: &RawPosition, timestamp: i64) -> PositionSnapshot {
    let vx = raw.vx as f64 / 100.0;
    let vy = raw.vy as f64 / 100.0;

    PositionSnapshot {
        lat: raw.lat as f64 / 1e7,
        lon: raw.lon as f64 / 1e7,
        alt: raw.alt as f64 / 1000.0,
        relative_alt: raw.relative_alt as f64 / 1000.0,
        vx,
        vy,
        vz: raw.vz as f64 / 100.0,
        hdg: raw.hdg as f64 / 100.0,
        ground_speed: vx.hypot(vy),
        timestamp,
    }
}

/// Convert raw attitude (radians) to degrees
pub fn convert_attitude(raw: &RawAttitude, timestamp: i64) -> AttitudeData {
    let deg = |rad: f32| (rad as f64).to_degrees();

    AttitudeData {
        roll: deg(raw.roll),
        pitch: deg(raw.pitch),
        yaw: deg(raw.yaw),
        rollspeed: deg(raw.rollspeed),
        pitchspeed: deg(raw.pitchspeed),
        yawspeed: deg(raw.yawspeed),
        timestamp,
    }
}

/// Convert raw battery fields, mapping sentinels to 0
pub fn convert_battery(raw: &RawBattery, timestamp: i64) -> BatteryData {
    let voltage = if raw.voltage_battery == VOLTAGE_UNKNOWN {
        0.0
    } else {
        raw.voltage_battery as f64 / 1000.0
    };

    let current = if raw.current_battery == CURRENT_UNKNOWN {
        0.0
    } else {
        raw.current_battery as f64 / 100.0
    };

    let remaining = if raw.battery_remaining == REMAINING_UNKNOWN {
        0
    } else {
        raw.battery_remaining
    };

    BatteryData {
        voltage,
        current,
        remaining,
        temperature: raw.temperature,
        timestamp,
    }
}

/// Classify a GPS fix type
pub fn classify_fix(fix_type: u8) -> FixStatus {
    match fix_type {
        0 | 1 => FixStatus::NoFix,
        2 => FixStatus::Fix2d,
        _ => FixStatus::Fix3d,
    }
}

/// Convert raw GPS fields, mapping eph/epv sentinels to 0
pub fn convert_gps(raw: &RawGps, timestamp: i64) -> GpsData {
    let uncertainty = |value: u16| {
        if value == EPH_EPV_UNKNOWN {
            0.0
        } else {
            value as f64 / 100.0
        }
    };

    GpsData {
        fix_type: raw.fix_type,
        satellites_visible: raw.satellites_visible,
        eph: uncertainty(raw.eph),
        epv: uncertainty(raw.epv),
        hdop: raw.hdop as f64 / 100.0,
        vdop: raw.vdop as f64 / 100.0,
        fix_status: classify_fix(raw.fix_type),
        timestamp,
    }
}

/// Derive vehicle status from a heartbeat
pub fn classify_heartbeat(raw: &RawHeartbeat, timestamp: i64) -> StatusData {
    StatusData {
        mode: flight_mode_name(raw.custom_mode),
        armed: raw.base_mode & MODE_FLAG_SAFETY_ARMED != 0,
        system_status: system_status_name(raw.system_status),
        safety_switch: raw.base_mode & MODE_FLAG_SAFETY_ENABLED != 0,
        timestamp,
    }
}

/// Convert any supported record, `None` for records the bridge ignores
pub fn convert_record(record: &LinkRecord, timestamp: i64) -> Option<TelemetrySample> {
    let sample = match record {
        LinkRecord::Position(raw) => TelemetrySample::Position(convert_position(raw, timestamp)),
        LinkRecord::Attitude(raw) => {
            TelemetrySample::Gated(GatedSample::Attitude(convert_attitude(raw, timestamp)))
        }
        LinkRecord::Battery(raw) => {
            TelemetrySample::Gated(GatedSample::Battery(convert_battery(raw, timestamp)))
        }
        LinkRecord::Gps(raw) => {
            TelemetrySample::Gated(GatedSample::Gps(convert_gps(raw, timestamp)))
        }
        LinkRecord::Heartbeat(raw) => {
            TelemetrySample::Gated(GatedSample::Status(classify_heartbeat(raw, timestamp)))
        }
        LinkRecord::Other(_) => return None,
    };

    Some(sample)
}
