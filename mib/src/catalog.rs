// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Resolution of logical metric names to vendor MIB object identifiers.
//!
//! The catalog is built once at startup, validated, and referenced
//! read-only for the life of the daemon.  Additional vendor families are
//! registered without any change to the code consuming the catalog.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::MibError;
use crate::MibResult;

// Metric names for the ZTE C300 family.  The table entries are walked as a
// whole; the column entries identify and decode individual columns.
pub const ONT_TABLE: &str = "ont-table";
pub const ONT_STATUS: &str = "ont-status";
pub const ONT_SERIAL: &str = "ont-serial";
pub const ONT_MODEL: &str = "ont-model";
pub const ONT_FIRMWARE: &str = "ont-firmware";
pub const ONT_RX_POWER: &str = "ont-rx-power";
pub const OPTICAL_TABLE: &str = "optical-ddm-table";
pub const OLT_TX_POWER: &str = "olt-tx-power";
pub const OLT_RX_POWER: &str = "olt-rx-power";

fn default_scale() -> f64 {
    1.0
}

/// A single catalog entry: where a metric lives and how to decode it.
#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct MetricSpec {
    /// Logical metric name, unique within the catalog.
    pub name: String,
    /// Numeric OID, with a leading dot.
    pub oid: String,
    /// Divisor applied to raw integer readings.  Optical power readings
    /// are reported in hundredths of a dBm, so their scale is 100.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Physical unit of the decoded value, if any.
    #[serde(default)]
    pub unit: Option<String>,
}

impl MetricSpec {
    fn validate(&self) -> MibResult<()> {
        let invalid = |reason: &str| MibError::InvalidMetric {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("empty name"));
        }
        if !self.oid.starts_with('.') {
            return Err(invalid("OID must start with a dot"));
        }
        if !self.oid[1..]
            .split('.')
            .all(|c| !c.is_empty() && c.chars().all(|d| d.is_ascii_digit()))
        {
            return Err(invalid("OID must be dot-separated digits"));
        }
        if self.scale == 0.0 {
            return Err(invalid("scale must be non-zero"));
        }
        Ok(())
    }
}

/// Mapping from logical metric names to vendor OIDs and decoding metadata.
#[derive(Clone, Debug, Default)]
pub struct OidCatalog {
    metrics: BTreeMap<String, MetricSpec>,
}

impl OidCatalog {
    pub fn new() -> Self {
        Default::default()
    }

    /// A catalog seeded with the ZTE C300 PON metric family.
    pub fn zte_c300() -> Self {
        let mut catalog = Self::new();
        let entries = [
            (ONT_TABLE, ".1.3.6.1.4.1.3902.1082.500.11.2.1", 1.0, None),
            (
                ONT_STATUS,
                ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.1",
                1.0,
                None,
            ),
            (
                ONT_SERIAL,
                ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.3",
                1.0,
                None,
            ),
            (
                ONT_MODEL,
                ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.4",
                1.0,
                None,
            ),
            (
                ONT_FIRMWARE,
                ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.5",
                1.0,
                None,
            ),
            (
                ONT_RX_POWER,
                ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.6",
                100.0,
                Some("dBm"),
            ),
            (
                OPTICAL_TABLE,
                ".1.3.6.1.4.1.3902.1082.500.10.2.1",
                1.0,
                None,
            ),
            (
                OLT_TX_POWER,
                ".1.3.6.1.4.1.3902.1082.500.10.2.1.1.1",
                100.0,
                Some("dBm"),
            ),
            (
                OLT_RX_POWER,
                ".1.3.6.1.4.1.3902.1082.500.10.2.1.1.2",
                100.0,
                Some("dBm"),
            ),
        ];
        for (name, oid, scale, unit) in entries {
            catalog
                .register(MetricSpec {
                    name: name.to_string(),
                    oid: oid.to_string(),
                    scale,
                    unit: unit.map(str::to_string),
                })
                .expect("built-in catalog entries are valid");
        }
        catalog
    }

    /// Register one metric.  Fails on a malformed definition or a name
    /// collision, so a bad config surfaces at startup rather than during
    /// a polling cycle.
    pub fn register(&mut self, spec: MetricSpec) -> MibResult<()> {
        spec.validate()?;
        if self.metrics.contains_key(&spec.name) {
            return Err(MibError::InvalidMetric {
                name: spec.name,
                reason: "already registered".to_string(),
            });
        }
        self.metrics.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> MibResult<&MetricSpec> {
        self.metrics
            .get(name)
            .ok_or_else(|| MibError::UnknownMetric(name.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resolve_known() {
        let catalog = OidCatalog::zte_c300();
        let spec = catalog.resolve(ONT_RX_POWER).unwrap();
        assert_eq!(spec.oid, ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.6");
        assert_eq!(spec.scale, 100.0);
        assert_eq!(spec.unit.as_deref(), Some("dBm"));
    }

    #[test]
    fn test_resolve_unknown() {
        let catalog = OidCatalog::zte_c300();
        match catalog.resolve("ont-temperature") {
            Err(MibError::UnknownMetric(name)) => {
                assert_eq!(name, "ont-temperature")
            }
            other => panic!("expected UnknownMetric, got {other:?}"),
        }
    }

    #[test]
    fn test_register_extension() {
        let mut catalog = OidCatalog::zte_c300();
        catalog
            .register(MetricSpec {
                name: "ont-distance".to_string(),
                oid: ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.9".to_string(),
                scale: 1.0,
                unit: Some("m".to_string()),
            })
            .unwrap();
        assert!(catalog.resolve("ont-distance").is_ok());
    }

    #[test]
    fn test_register_duplicate() {
        let mut catalog = OidCatalog::zte_c300();
        let dup = catalog.resolve(ONT_STATUS).unwrap().clone();
        assert!(catalog.register(dup).is_err());
    }

    #[test]
    fn test_register_malformed() {
        let mut catalog = OidCatalog::new();
        for oid in ["1.3.6.1", ".1.3..6", ".1.3.x.6", "."] {
            let res = catalog.register(MetricSpec {
                name: "bad".to_string(),
                oid: oid.to_string(),
                scale: 1.0,
                unit: None,
            });
            assert!(res.is_err(), "OID {oid:?} should be rejected");
        }
        let res = catalog.register(MetricSpec {
            name: "zero-scale".to_string(),
            oid: ".1.3.6.1".to_string(),
            scale: 0.0,
            unit: None,
        });
        assert!(res.is_err());
    }
}
