//! # Telemetry Module
//!
//! Vehicle telemetry records and their conversion to domain units.
//!
//! This module handles:
//! - Raw record types supplied by the vehicle links
//! - Unit conversion and sentinel handling
//! - Flight mode, system status and GPS fix classification
//! - Mode name tables used to resolve operator mode changes

pub mod convert;
pub mod modes;
pub mod types;

pub use convert::convert_record;
pub use modes::ModeMapping;
pub use types::*;
