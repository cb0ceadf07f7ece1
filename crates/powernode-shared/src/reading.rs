// SPDX-License-Identifier: CC-BY-NC-ND-4.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One snapshot of the metering quantities taken at a single sampling instant.
///
/// The serialized form is the canonical telemetry body:
/// `{"voltage":..,"current":..,"power":..,"energy":..,"frequency":..,"pf":..}`.
/// `sampled_at` stays on the device and is never put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Line voltage (V)
    pub voltage: f32,
    /// Line current (A)
    pub current: f32,
    /// Active power (W)
    pub power: f32,
    /// Cumulative energy (kWh)
    pub energy: f32,
    /// Line frequency (Hz)
    pub frequency: f32,
    /// Power factor (0-1)
    pub pf: f32,
    #[serde(skip)]
    pub sampled_at: DateTime<Utc>,
}

impl Reading {
    /// Serialize into the telemetry body posted to the ingestion endpoint.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
