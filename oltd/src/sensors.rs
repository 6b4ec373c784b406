// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Optical-power thresholds and severity evaluation.

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::OltdError;
use crate::types::OltdResult;
use crate::types::Severity;

/// Alarm bounds for one sensor class.  Optical power can breach in
/// either direction, so the set is two-sided.  The ordering invariant
/// low <= low_warn <= high_warn <= high is enforced at startup.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct ThresholdSet {
    pub low: f64,
    pub low_warn: f64,
    pub high_warn: f64,
    pub high: f64,
}

impl ThresholdSet {
    pub fn validate(&self) -> OltdResult<()> {
        if self.low <= self.low_warn
            && self.low_warn <= self.high_warn
            && self.high_warn <= self.high
        {
            Ok(())
        } else {
            Err(OltdError::Invalid(format!(
                "threshold ordering violated: {} <= {} <= {} <= {} required",
                self.low, self.low_warn, self.high_warn, self.high
            )))
        }
    }

    /// Assign a severity to a decoded value.  Bounds are inclusive: a
    /// value sitting exactly on a bound breaches it.
    pub fn evaluate(&self, value: f64) -> Severity {
        if value <= self.low || value >= self.high {
            Severity::Critical
        } else if value <= self.low_warn || value >= self.high_warn {
            Severity::Warn
        } else {
            Severity::Ok
        }
    }
}

/// Per-class thresholds.  The defaults are the C300 deployment ranges:
/// TX normally sits between -8 and +2 dBm, RX between -28 and -8 dBm.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct Thresholds {
    pub tx: ThresholdSet,
    pub rx: ThresholdSet,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            tx: ThresholdSet {
                low: -10.0,
                low_warn: -8.0,
                high_warn: 2.0,
                high: 3.0,
            },
            rx: ThresholdSet {
                low: -30.0,
                low_warn: -28.0,
                high_warn: -8.0,
                high: -6.0,
            },
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> OltdResult<()> {
        self.tx.validate()?;
        self.rx.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_severities() {
        let tx = Thresholds::default().tx;
        assert_eq!(tx.evaluate(-12.0), Severity::Critical);
        assert_eq!(tx.evaluate(-10.0), Severity::Critical);
        assert_eq!(tx.evaluate(-8.0), Severity::Warn);
        assert_eq!(tx.evaluate(-5.0), Severity::Ok);
        assert_eq!(tx.evaluate(0.0), Severity::Ok);
        assert_eq!(tx.evaluate(2.0), Severity::Warn);
        assert_eq!(tx.evaluate(3.0), Severity::Critical);
        assert_eq!(tx.evaluate(5.0), Severity::Critical);
    }

    #[test]
    fn test_rx_severities() {
        let rx = Thresholds::default().rx;
        assert_eq!(rx.evaluate(-31.0), Severity::Critical);
        assert_eq!(rx.evaluate(-28.0), Severity::Warn);
        assert_eq!(rx.evaluate(-12.0), Severity::Ok);
        assert_eq!(rx.evaluate(-8.0), Severity::Warn);
        assert_eq!(rx.evaluate(-6.0), Severity::Critical);
    }

    #[test]
    fn test_critical_wins_over_warn() {
        // A value below "low" also sits below "low_warn"; the first
        // matching rule assigns Critical.
        let t = ThresholdSet {
            low: -10.0,
            low_warn: -8.0,
            high_warn: 2.0,
            high: 3.0,
        };
        assert_eq!(t.evaluate(-11.0), Severity::Critical);
    }

    #[test]
    fn test_validate_ordering() {
        let t = ThresholdSet {
            low: -8.0,
            low_warn: -10.0,
            high_warn: 2.0,
            high: 3.0,
        };
        assert!(t.validate().is_err());

        let t = ThresholdSet {
            low: -10.0,
            low_warn: -8.0,
            high_warn: 3.0,
            high: 2.0,
        };
        assert!(t.validate().is_err());

        assert!(Thresholds::default().validate().is_ok());
    }

    #[test]
    fn test_degenerate_equal_bounds() {
        // All bounds equal is a legal, always-critical configuration.
        let t = ThresholdSet {
            low: 0.0,
            low_warn: 0.0,
            high_warn: 0.0,
            high: 0.0,
        };
        assert!(t.validate().is_ok());
        assert_eq!(t.evaluate(0.0), Severity::Critical);
    }
}
