// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::errors;
use mib::OnuStatus;

pub type OltdResult<T> = Result<T, errors::OltdError>;

/// Identity of a monitored OLT, as supplied by the external inventory.
/// Immutable for the duration of a poll cycle.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct DeviceIdentity {
    /// Unique display name of the device.
    pub name: String,
    /// Host name or address the SNMP transport should target.
    pub host: String,
    /// SNMPv2 community string.
    pub community: String,
    /// System description string reported by the device.
    pub sys_descr: String,
    /// Hardware/model string reported by the device.
    pub hardware: String,
}

/// The identity key of an ONT record.  The triple must be unique within
/// the store; the reconciliation engine never changes it once a record
/// exists.
#[derive(
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Deserialize,
    JsonSchema,
    Serialize,
)]
pub struct OntKey {
    pub device: String,
    pub pon_port: String,
    pub ont_index: u32,
}

impl fmt::Display for OntKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}:{}", self.device, self.pon_port, self.ont_index)
    }
}

/// A subscriber terminal attached to one of an OLT's PON ports.  Created
/// on first observation and updated on every later observation; never
/// deleted automatically, since absence from a walk may just be a
/// transient SNMP failure.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct OntRecord {
    /// Assigned when the ONT is first observed.  Survives for the life
    /// of the record.
    pub id: uuid::Uuid,
    pub key: OntKey,
    /// Serial number reported by the device; may be empty if unknown.
    pub serial_number: String,
    pub model: String,
    pub firmware_version: String,
    pub status: OnuStatus,
    /// Received optical power at the ONT, in dBm.
    pub rx_power: Option<f64>,
    /// When the ONT was first observed.
    pub first_seen: DateTime<Utc>,
    /// When the device last reported the ONT.  Refreshed every cycle in
    /// which the ONT appears in the walk.
    pub last_seen: DateTime<Utc>,
    /// True when the walk index this record came from did not carry the
    /// expected shelf/slot/port structure.
    pub unstructured: bool,
}

/// One decoded observation of an ONT, produced from a single walk row.
#[derive(Clone, Debug, PartialEq)]
pub struct OntObservation {
    pub key: OntKey,
    pub serial_number: String,
    pub model: String,
    pub firmware_version: String,
    pub status: OnuStatus,
    pub rx_power: Option<f64>,
    pub unstructured: bool,
}

/// The sensor classes this poller emits.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum SensorClass {
    OpticalTx,
    OpticalRx,
}

impl fmt::Display for SensorClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            SensorClass::OpticalTx => "optical-tx",
            SensorClass::OpticalRx => "optical-rx",
        };
        write!(f, "{s}")
    }
}

/// Severity assigned to a reading by threshold evaluation.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warn,
    Critical,
}

/// One decoded metric observation.  Produced and emitted within a single
/// cycle; historical retention belongs to the emission sink.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct SensorReading {
    pub device: String,
    pub class: SensorClass,
    /// Sensor identity within the device, e.g. "tx-1.1.1".
    pub sensor_index: String,
    /// Human-readable descriptor, e.g. "gpon-olt_1/1/1 TX Power".
    pub descr: String,
    /// The fully-qualified OID the reading came from.
    pub oid: String,
    /// Decoded value in physical units (dBm).
    pub value: f64,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Per-cycle ONT aggregate counts, emitted for time-series storage.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize,
)]
pub struct CycleCounts {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
}

/// Summary of one completed poll cycle for one device.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
pub struct PollCycleResult {
    /// False when the device did not match any vendor signature; the
    /// cycle then had no side effects at all.
    pub applicable: bool,
    pub counts: CycleCounts,
    /// Readings emitted this cycle.
    pub readings: Vec<SensorReading>,
    /// New ONT records created.
    pub created: u64,
    /// Existing records whose fields changed.
    pub updated: u64,
    /// Existing records that only had their last-seen refreshed.
    pub refreshed: u64,
    /// Identity conflicts observed (and not overwritten).
    pub conflicts: u64,
    /// Walk entries skipped because a value failed to decode.
    pub skipped: u64,
    /// Sub-metrics whose walk failed this cycle.  Degraded, not fatal:
    /// the other sub-metrics were still processed.
    pub degraded: Vec<String>,
}
