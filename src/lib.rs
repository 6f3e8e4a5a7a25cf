//! # MAV Bridge Library
//!
//! Bridge MAVLink telemetry from two vehicles to a local consumer.
//!
//! Each vehicle gets a session worker that converts telemetry, persists
//! position snapshots and forwards attitude, battery, GPS and status updates
//! as JSON datagrams through a shared rate gate. Operator commands arrive as
//! JSON datagrams and are relayed to vehicle 1.

pub mod clock;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod link;
pub mod relay;
pub mod sink;
pub mod telemetry;
pub mod worker;
