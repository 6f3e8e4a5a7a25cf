//! # Flight Mode Tables
//!
//! ArduPilot custom mode tables and system status names.
//!
//! Heartbeat classification always uses the copter table, whatever the
//! vehicle type. Command resolution (`ModeMapping`) picks the table matching
//! the vehicle type advertised in the link's most recent heartbeat.

/// Name reported when a lookup misses
pub const UNKNOWN: &str = "UNKNOWN";

/// ArduCopter custom modes (id 12 is unassigned)
pub const COPTER_MODES: &[(&str, u32)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("LOITER", 5),
    ("RTL", 6),
    ("CIRCLE", 7),
    ("POSITION", 8),
    ("LAND", 9),
    ("OF_LOITER", 10),
    ("DRIFT", 11),
    ("SPORT", 13),
    ("FLIP", 14),
    ("AUTOTUNE", 15),
    ("POSHOLD", 16),
    ("BRAKE", 17),
    ("THROW", 18),
    ("AVOID_ADSB", 19),
    ("GUIDED_NOGPS", 20),
    ("SMART_RTL", 21),
    ("FLOWHOLD", 22),
    ("FOLLOW", 23),
    ("ZIGZAG", 24),
    ("SYSTEMID", 25),
    ("AUTOROTATE", 26),
    ("AUTO_RTL", 27),
];

/// ArduPlane custom modes
pub const PLANE_MODES: &[(&str, u32)] = &[
    ("MANUAL", 0),
    ("CIRCLE", 1),
    ("STABILIZE", 2),
    ("TRAINING", 3),
    ("ACRO", 4),
    ("FBWA", 5),
    ("FBWB", 6),
    ("CRUISE", 7),
    ("AUTOTUNE", 8),
    ("AUTO", 10),
    ("RTL", 11),
    ("LOITER", 12),
    ("TAKEOFF", 13),
    ("AVOID_ADSB", 14),
    ("GUIDED", 15),
    ("INITIALISING", 16),
    ("QSTABILIZE", 17),
    ("QHOVER", 18),
    ("QLOITER", 19),
    ("QLAND", 20),
    ("QRTL", 21),
    ("QAUTOTUNE", 22),
    ("QACRO", 23),
    ("THERMAL", 24),
];

/// ArduRover custom modes (rovers and boats)
pub const ROVER_MODES: &[(&str, u32)] = &[
    ("MANUAL", 0),
    ("ACRO", 1),
    ("LEARNING", 2),
    ("STEERING", 3),
    ("HOLD", 4),
    ("LOITER", 5),
    ("FOLLOW", 6),
    ("SIMPLE", 7),
    ("AUTO", 10),
    ("RTL", 11),
    ("SMART_RTL", 12),
    ("GUIDED", 15),
    ("INITIALISING", 16),
];

/// ArduSub custom modes
pub const SUB_MODES: &[(&str, u32)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("CIRCLE", 7),
    ("SURFACE", 9),
    ("POSHOLD", 16),
    ("MANUAL", 19),
];

/// MAV_STATE names indexed by value
pub const SYSTEM_STATES: [&str; 9] = [
    "UNINIT",
    "BOOT",
    "CALIBRATING",
    "STANDBY",
    "ACTIVE",
    "CRITICAL",
    "EMERGENCY",
    "POWEROFF",
    "TERMINATION",
];

// MAV_TYPE values grouped by ArduPilot firmware family
const COPTER_TYPES: &[u8] = &[2, 3, 4, 13, 14, 15, 29, 35];
const PLANE_TYPES: &[u8] = &[1, 19, 20, 21, 22, 23, 24, 25];
const ROVER_TYPES: &[u8] = &[10, 11];
const SUB_TYPES: &[u8] = &[12];

/// Look up a copter flight mode name, `UNKNOWN` on a miss
pub fn flight_mode_name(custom_mode: u32) -> &'static str {
    COPTER_MODES
        .iter()
        .find(|(_, id)| *id == custom_mode)
        .map(|(name, _)| *name)
        .unwrap_or(UNKNOWN)
}

/// Look up a MAV_STATE name, `UNKNOWN` on a miss
pub fn system_status_name(status: u8) -> &'static str {
    SYSTEM_STATES
        .get(status as usize)
        .copied()
        .unwrap_or(UNKNOWN)
}

/// Mode name to custom mode id lookup for one vehicle family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeMapping {
    table: &'static [(&'static str, u32)],
}

impl ModeMapping {
    /// Select the mode table for an advertised MAV_TYPE
    ///
    /// Returns `None` for vehicle types without an ArduPilot mode table
    /// (GCS, antenna trackers, unknown types).
    pub fn for_vehicle_type(mav_type: u8) -> Option<Self> {
        let table = if COPTER_TYPES.contains(&mav_type) {
            COPTER_MODES
        } else if PLANE_TYPES.contains(&mav_type) {
            PLANE_MODES
        } else if ROVER_TYPES.contains(&mav_type) {
            ROVER_MODES
        } else if SUB_TYPES.contains(&mav_type) {
            SUB_MODES
        } else {
            return None;
        };

        Some(Self { table })
    }

    /// Resolve a mode name (exact match) to its custom mode id
    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.table
            .iter()
            .find(|(mode, _)| *mode == name)
            .map(|(_, id)| *id)
    }

    /// Mode names known to this mapping
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.table.iter().map(|(name, _)| *name)
    }
}
