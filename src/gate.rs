//! # Rate Gate
//!
//! Process-wide, per-data-type throttle deciding whether a converted sample
//! may be forwarded now.
//!
//! One gate is shared by both vehicle workers. It has no notion of which
//! vehicle produced a sample: within one interval the first sample of a type
//! wins and same-type samples from either vehicle are dropped.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, trace};

use crate::telemetry::DataType;

/// Minimum spacing between forwards of one data type
pub const DEFAULT_INTERVAL_MS: i64 = 100;

/// Status suppression after a successful mode change
pub const DEFAULT_STATUS_SUPPRESS_MS: i64 = 2000;

/// Per-type gate slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateSlot {
    /// Epoch ms of the last admitted sample (0 = never)
    pub last_sent_ms: i64,
    /// Admission denied before this epoch ms
    pub suppress_until_ms: i64,
}

/// Shared admission gate
#[derive(Debug)]
pub struct RateGate {
    interval_ms: i64,
    slots: Mutex<HashMap<DataType, GateSlot>>,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_MS)
    }
}

impl RateGate {
    /// Create a gate with the given minimum interval
    pub fn new(interval_ms: i64) -> Self {
        let slots = DataType::ALL
            .iter()
            .map(|t| (*t, GateSlot::default()))
            .collect();

        Self {
            interval_ms,
            slots: Mutex::new(slots),
        }
    }

    /// Minimum interval between admissions of one type
    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Decide whether a sample of `data_type` may be forwarded at `now_ms`
    ///
    /// On admission the slot's `last_sent_ms` is set to `now_ms`. The check
    /// and update happen under one lock so two workers can never both admit
    /// the same type inside one interval.
    pub fn admit(&self, data_type: DataType, now_ms: i64) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(data_type).or_default();

        if now_ms < slot.suppress_until_ms {
            trace!("{} suppressed for another {} ms", data_type, slot.suppress_until_ms - now_ms);
            return false;
        }

        if now_ms - slot.last_sent_ms < self.interval_ms {
            return false;
        }

        slot.last_sent_ms = now_ms;
        true
    }

    /// Deny admission of `data_type` until `deadline_ms`
    pub fn suppress_until(&self, data_type: DataType, deadline_ms: i64) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(data_type).or_default().suppress_until_ms = deadline_ms;
        debug!("{} updates suppressed until {}", data_type, deadline_ms);
    }

    /// Current state of one slot
    pub fn slot(&self, data_type: DataType) -> GateSlot {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(&data_type).copied().unwrap_or_default()
    }
}
