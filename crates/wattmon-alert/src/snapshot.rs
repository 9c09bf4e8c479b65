use chrono::{DateTime, Utc};
use wattmon_common::types::{DeviceEntry, ForecastRecord, Reading};

use crate::window::ReadingWindow;

/// Per-device input to one evaluation pass: registry metadata plus a
/// bounded window of recent readings, oldest first.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub entry: DeviceEntry,
    pub readings: Vec<Reading>,
}

impl DeviceState {
    /// Builds a device state, trimming `readings` to `window_secs` of
    /// trailing history relative to `now`.
    pub fn new(
        entry: DeviceEntry,
        readings: Vec<Reading>,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut window = ReadingWindow::new(window_secs);
        for reading in readings {
            window.push(reading);
        }
        window.evict(now);
        Self {
            entry,
            readings: window.into_vec(),
        }
    }

    pub fn latest_reading(&self) -> Option<&Reading> {
        self.readings.last()
    }
}

/// Per-location input to one evaluation pass.
#[derive(Debug, Clone)]
pub struct LocationState {
    /// Location key, `city,country`.
    pub location: String,
    /// Latest forecast for the location, if any was fetched.
    pub forecast: Option<ForecastRecord>,
}

/// The subject a rule is being evaluated against.
pub enum SubjectState<'a> {
    Device(&'a DeviceState),
    Location(&'a LocationState),
}

/// A fixed input snapshot for one pass. Evaluation is deterministic for a
/// given snapshot: same devices, readings, forecasts, and clock always
/// yield the same alert set.
#[derive(Debug, Clone)]
pub struct EvaluationSnapshot {
    /// Clock for the whole pass; staleness and window math use this, not
    /// wall time, so a snapshot can be replayed.
    pub taken_at: DateTime<Utc>,
    pub devices: Vec<DeviceState>,
    pub locations: Vec<LocationState>,
}

impl EvaluationSnapshot {
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            devices: Vec::new(),
            locations: Vec::new(),
        }
    }
}
