// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Decoding of raw SNMP column values into physical units and status
//! codes.

use std::fmt;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// A raw column value as returned by a table walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawValue {
    Integer(i64),
    OctetString(String),
}

impl RawValue {
    /// The value as an integer.  Some firmware revisions report numeric
    /// columns as strings, so those are parsed rather than rejected.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawValue::Integer(v) => Some(*v),
            RawValue::OctetString(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Integer(_) => None,
            RawValue::OctetString(s) => Some(s),
        }
    }
}

/// Scale a raw integer reading into its physical unit.  Optical power is
/// reported in hundredths of a dBm (scale 100) and is frequently
/// negative, so the sign must survive.
pub fn decode_scaled(raw: i64, scale: f64) -> f64 {
    raw as f64 / scale
}

/// Operational status reported by the device for an ONT.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum OnuStatus {
    Online,
    Offline,
    DyingGasp,
    Unknown,
}

impl OnuStatus {
    /// Decode the device's status code.  This is a closed enumeration:
    /// any unrecognized or absent code maps to Unknown, never an error.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => OnuStatus::Online,
            2 => OnuStatus::Offline,
            3 => OnuStatus::DyingGasp,
            _ => OnuStatus::Unknown,
        }
    }
}

impl fmt::Display for OnuStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            OnuStatus::Online => "online",
            OnuStatus::Offline => "offline",
            OnuStatus::DyingGasp => "dying-gasp",
            OnuStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_scaled() {
        assert_eq!(decode_scaled(-850, 100.0), -8.5);
        assert_eq!(decode_scaled(250, 100.0), 2.5);
        assert_eq!(decode_scaled(0, 100.0), 0.0);
    }

    #[test]
    fn test_decode_inverse() {
        for raw in [-3000, -1550, -1, 0, 1, 299] {
            assert_eq!(decode_scaled(raw, 100.0) * 100.0, raw as f64);
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OnuStatus::from_code(1), OnuStatus::Online);
        assert_eq!(OnuStatus::from_code(2), OnuStatus::Offline);
        assert_eq!(OnuStatus::from_code(3), OnuStatus::DyingGasp);
        assert_eq!(OnuStatus::from_code(0), OnuStatus::Unknown);
        assert_eq!(OnuStatus::from_code(99), OnuStatus::Unknown);
        assert_eq!(OnuStatus::from_code(-1), OnuStatus::Unknown);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(OnuStatus::DyingGasp.to_string(), "dying-gasp");
    }

    #[test]
    fn test_raw_value_coercion() {
        assert_eq!(RawValue::Integer(-850).as_i64(), Some(-850));
        assert_eq!(
            RawValue::OctetString("-850".to_string()).as_i64(),
            Some(-850)
        );
        assert_eq!(RawValue::OctetString("n/a".to_string()).as_i64(), None);
        assert_eq!(RawValue::Integer(1).as_str(), None);
    }
}
