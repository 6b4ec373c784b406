// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Emission of decoded telemetry to the external storage collaborators.

use slog::info;

use crate::types::CycleCounts;
use crate::types::SensorReading;

/// Where decoded readings and cycle aggregates go.  The time-series
/// engine behind this port retains history; the poller core retains
/// nothing.
pub trait TelemetrySink: Send + Sync {
    /// Emit one sensor reading.  Idempotent per (sensor identity,
    /// timestamp).
    fn register_reading(&self, reading: &SensorReading);

    /// Emit the per-cycle ONT aggregate counts for a device.
    fn emit_cycle_summary(&self, device: &str, counts: &CycleCounts);
}

/// The default sink: structured log events.  A production deployment
/// wires a time-series implementation here instead.
pub struct LogSink {
    log: slog::Logger,
}

impl LogSink {
    pub fn new(log: slog::Logger) -> Self {
        LogSink { log }
    }
}

impl TelemetrySink for LogSink {
    fn register_reading(&self, reading: &SensorReading) {
        info!(self.log, "sensor reading";
            "device" => &reading.device,
            "sensor" => &reading.sensor_index,
            "descr" => &reading.descr,
            "value" => reading.value,
            "severity" => format!("{:?}", reading.severity),
        );
    }

    fn emit_cycle_summary(&self, device: &str, counts: &CycleCounts) {
        info!(self.log, "cycle summary";
            "device" => device,
            "total" => counts.total,
            "online" => counts.online,
            "offline" => counts.offline,
        );
    }
}
