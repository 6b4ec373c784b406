// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Daemon configuration.
//!
//! All deployment-tunable knobs live in a single JSON file, loaded and
//! validated once at startup.  A bad threshold ordering or a malformed
//! catalog extension is fatal here so it can never surface mid-cycle.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::OltdError;
use crate::sensors::Thresholds;
use crate::types::DeviceIdentity;
use crate::types::OltdResult;
use mib::MetricSpec;
use mib::OidCatalog;

fn default_poll_interval() -> u64 {
    300
}

fn default_walk_timeout() -> u64 {
    30
}

fn default_walk_retries() -> u32 {
    3
}

fn default_vendor_signatures() -> Vec<String> {
    vec!["zte".to_string(), "c300".to_string()]
}

fn default_community() -> String {
    "public".to_string()
}

/// One statically configured device.  The identity fields mirror what
/// the external inventory knows about the device.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default)]
    pub sys_descr: String,
    #[serde(default)]
    pub hardware: String,
    /// Per-device override of the global polling interval.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

impl DeviceConfig {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            name: self.name.clone(),
            host: self.host.clone(),
            community: self.community.clone(),
            sys_descr: self.sys_descr.clone(),
            hardware: self.hardware.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Seconds between poll cycles for each device.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-request walk timeout handed to the transport, in seconds.
    #[serde(default = "default_walk_timeout")]
    pub walk_timeout_secs: u64,
    /// Walk retries handed to the transport.
    #[serde(default = "default_walk_retries")]
    pub walk_retries: u32,
    /// Case-insensitive substrings matched against a device's system
    /// description and hardware strings to decide applicability.
    #[serde(default = "default_vendor_signatures")]
    pub vendor_signatures: Vec<String>,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Additional catalog entries for vendor metric families beyond the
    /// built-in ones.
    #[serde(default)]
    pub extra_metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Addresses for the API server beyond the localhost default.
    #[serde(default)]
    pub listen_addresses: Vec<SocketAddr>,
}

impl Config {
    pub fn from_file(path: &str) -> OltdResult<Config> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| OltdError::Invalid(format!("{path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OltdResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(OltdError::Invalid(
                "poll_interval_secs must be positive".into(),
            ));
        }
        if self.walk_timeout_secs == 0 {
            return Err(OltdError::Invalid(
                "walk_timeout_secs must be positive".into(),
            ));
        }
        if self.vendor_signatures.iter().any(|s| s.is_empty()) {
            return Err(OltdError::Invalid(
                "vendor signatures must be non-empty".into(),
            ));
        }
        self.thresholds.validate()?;

        let mut names = BTreeSet::new();
        for device in &self.devices {
            if device.name.is_empty() || device.host.is_empty() {
                return Err(OltdError::Invalid(format!(
                    "device {:?} needs a name and a host",
                    device.name
                )));
            }
            if !names.insert(&device.name) {
                return Err(OltdError::Exists(format!(
                    "duplicate device name: {}",
                    device.name
                )));
            }
        }

        // Building the catalog validates the extension entries.
        self.catalog()?;
        Ok(())
    }

    /// The metric catalog for this deployment: the built-in ZTE C300
    /// family plus any configured extensions.
    pub fn catalog(&self) -> OltdResult<OidCatalog> {
        let mut catalog = OidCatalog::zte_c300();
        for spec in &self.extra_metrics {
            catalog.register(spec.clone())?;
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_interval_secs, 300);
        assert_eq!(config.walk_timeout_secs, 30);
        assert_eq!(config.walk_retries, 3);
        assert_eq!(config.vendor_signatures, vec!["zte", "c300"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_threshold_ordering_fails() {
        let text = r#"{
            "thresholds": {
                "tx": { "low": -8, "low_warn": -10, "high_warn": 2, "high": 3 },
                "rx": { "low": -30, "low_warn": -28, "high_warn": -8, "high": -6 }
            }
        }"#;
        let config: Config = serde_json::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_device_fails() {
        let text = r#"{
            "devices": [
                { "name": "olt-1", "host": "10.0.0.1" },
                { "name": "olt-1", "host": "10.0.0.2" }
            ]
        }"#;
        let config: Config = serde_json::from_str(text).unwrap();
        assert!(matches!(config.validate(), Err(OltdError::Exists(_))));
    }

    #[test]
    fn test_extra_metric_registered() {
        let text = r#"{
            "extra_metrics": [
                { "name": "ont-distance",
                  "oid": ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.9",
                  "unit": "m" }
            ]
        }"#;
        let config: Config = serde_json::from_str(text).unwrap();
        let catalog = config.catalog().unwrap();
        let spec = catalog.resolve("ont-distance").unwrap();
        assert_eq!(spec.scale, 1.0);
    }

    #[test]
    fn test_malformed_extra_metric_fails() {
        let text = r#"{
            "extra_metrics": [
                { "name": "bad", "oid": "not-an-oid" }
            ]
        }"#;
        let config: Config = serde_json::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_community_default() {
        let text = r#"{
            "devices": [ { "name": "olt-1", "host": "10.0.0.1" } ]
        }"#;
        let config: Config = serde_json::from_str(text).unwrap();
        assert_eq!(config.devices[0].community, "public");
    }
}
