// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Reconciliation of observed ONTs against the persistent entity store.
//!
//! Each cycle's observations are diffed against the records already
//! known for the device.  New identities become new records; known
//! identities have their mutable fields updated in place.  An ONT that
//! is absent from a walk is left untouched: absence is ambiguous (it may
//! be a partial SNMP failure) and must not be conflated with a status
//! transition reported by the device itself.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use slog::debug;
use slog::info;
use slog::warn;

use crate::types::OntKey;
use crate::types::OntObservation;
use crate::types::OntRecord;

/// Persistent storage for ONT records.  The store enforces identity-key
/// uniqueness; `upsert` is a single conditional create-or-update so
/// there is no read-then-write window against other writers.
pub trait OntStore: Send + Sync {
    /// All records belonging to one device, keyed by identity.  The
    /// engine prefetches this once per cycle rather than issuing one
    /// lookup per ONT; an OLT can serve thousands.
    fn device_onts(&self, device: &str) -> BTreeMap<OntKey, OntRecord>;

    /// Create-or-update by identity key.
    fn upsert(&self, record: OntRecord);
}

/// In-memory store.  The daemon's default, and the fixture the tests
/// reconcile against; a production deployment implements `OntStore` on
/// the platform's database instead.
#[derive(Default)]
pub struct MemStore {
    onts: Mutex<BTreeMap<OntKey, OntRecord>>,
}

impl MemStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.onts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &OntKey) -> Option<OntRecord> {
        self.onts.lock().unwrap().get(key).cloned()
    }
}

impl OntStore for MemStore {
    fn device_onts(&self, device: &str) -> BTreeMap<OntKey, OntRecord> {
        self.onts
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.device == device)
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    fn upsert(&self, record: OntRecord) {
        self.onts.lock().unwrap().insert(record.key.clone(), record);
    }
}

/// What one reconciliation pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Records created for identities not seen before.
    pub created: u64,
    /// Records whose mutable fields changed.
    pub updated: u64,
    /// Records that only had their last-seen refreshed.
    pub refreshed: u64,
    /// Serial-number identity conflicts detected (and not overwritten).
    pub conflicts: u64,
}

macro_rules! maybe_update {
    ($rec:ident, $obs:ident, $field:ident) => {
        if $rec.$field != $obs.$field {
            $rec.$field = $obs.$field.clone();
            true
        } else {
            false
        }
    };
}

/// Reconcile one device's observations against the store.
pub fn reconcile_onts(
    log: &slog::Logger,
    store: &dyn OntStore,
    device: &str,
    observations: &[OntObservation],
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let mut existing = store.device_onts(device);
    let mut outcome = ReconcileOutcome::default();

    for obs in observations {
        match existing.remove(&obs.key) {
            None => {
                info!(log, "new ont";
                    "key" => obs.key.to_string(),
                    "serial" => &obs.serial_number,
                    "status" => obs.status.to_string());
                store.upsert(OntRecord {
                    id: uuid::Uuid::new_v4(),
                    key: obs.key.clone(),
                    serial_number: obs.serial_number.clone(),
                    model: obs.model.clone(),
                    firmware_version: obs.firmware_version.clone(),
                    status: obs.status,
                    rx_power: obs.rx_power,
                    first_seen: now,
                    last_seen: now,
                    unstructured: obs.unstructured,
                });
                outcome.created += 1;
            }
            Some(mut rec) => {
                let mut changed = false;

                // The serial number is identity-bearing.  A different
                // non-empty serial under the same key is reported, and
                // the stored one kept; an empty observation never
                // clears a known serial.
                if obs.serial_number.is_empty()
                    || rec.serial_number == obs.serial_number
                {
                    // nothing to do
                } else if rec.serial_number.is_empty() {
                    rec.serial_number = obs.serial_number.clone();
                    changed = true;
                } else {
                    warn!(log, "ont serial conflict";
                        "key" => obs.key.to_string(),
                        "stored" => &rec.serial_number,
                        "observed" => &obs.serial_number);
                    outcome.conflicts += 1;
                }

                changed |= maybe_update!(rec, obs, model);
                changed |= maybe_update!(rec, obs, firmware_version);
                changed |= maybe_update!(rec, obs, rx_power);
                changed |= maybe_update!(rec, obs, unstructured);
                if rec.status != obs.status {
                    info!(log, "ont status change";
                        "key" => obs.key.to_string(),
                        "from" => rec.status.to_string(),
                        "to" => obs.status.to_string());
                    rec.status = obs.status;
                    changed = true;
                }

                rec.last_seen = now;
                store.upsert(rec);
                if changed {
                    outcome.updated += 1;
                } else {
                    outcome.refreshed += 1;
                }
            }
        }
    }

    if !existing.is_empty() {
        // Entities known to the store but absent from this walk.  Left
        // untouched: only a device-reported status drives transitions.
        debug!(log, "onts absent from walk";
            "device" => device, "count" => existing.len());
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use mib::OnuStatus;

    fn test_log() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn obs(port: &str, ont: u32, serial: &str) -> OntObservation {
        OntObservation {
            key: OntKey {
                device: "olt-1".to_string(),
                pon_port: port.to_string(),
                ont_index: ont,
            },
            serial_number: serial.to_string(),
            model: "ZTEG-F660".to_string(),
            firmware_version: "V6.0.1".to_string(),
            status: OnuStatus::Online,
            rx_power: Some(-15.5),
            unstructured: false,
        }
    }

    #[test]
    fn test_create_on_first_observation() {
        let store = MemStore::new();
        let observations = vec![obs("gpon-olt_1/1/1", 1, "ABC123")];

        let outcome = reconcile_onts(
            &test_log(),
            &store,
            "olt-1",
            &observations,
            Utc::now(),
        );
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.updated, 0);
        assert_eq!(store.len(), 1);

        let rec = store.get(&observations[0].key).unwrap();
        assert_eq!(rec.serial_number, "ABC123");
        assert_eq!(rec.status, OnuStatus::Online);
        assert_eq!(rec.first_seen, rec.last_seen);
    }

    #[test]
    fn test_idempotent_second_pass() {
        let store = MemStore::new();
        let observations = vec![obs("gpon-olt_1/1/1", 1, "ABC123")];
        let log = test_log();

        let t0 = Utc::now();
        reconcile_onts(&log, &store, "olt-1", &observations, t0);
        let before = store.get(&observations[0].key).unwrap();

        let t1 = t0 + chrono::Duration::seconds(300);
        let outcome = reconcile_onts(&log, &store, "olt-1", &observations, t1);
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.refreshed, 1);
        assert_eq!(store.len(), 1);

        // Identity, id and first-seen survive; only last-seen moved.
        let after = store.get(&observations[0].key).unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.first_seen, before.first_seen);
        assert_eq!(after.last_seen, t1);
        assert_eq!(after.serial_number, before.serial_number);
    }

    #[test]
    fn test_update_on_field_change() {
        let store = MemStore::new();
        let log = test_log();
        let mut observations = vec![obs("gpon-olt_1/1/1", 1, "ABC123")];
        reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());

        observations[0].status = OnuStatus::DyingGasp;
        observations[0].rx_power = Some(-29.0);
        let outcome =
            reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());
        assert_eq!(outcome.updated, 1);

        let rec = store.get(&observations[0].key).unwrap();
        assert_eq!(rec.status, OnuStatus::DyingGasp);
        assert_eq!(rec.rx_power, Some(-29.0));
    }

    #[test]
    fn test_absence_is_not_deletion() {
        let store = MemStore::new();
        let log = test_log();
        let observations = vec![
            obs("gpon-olt_1/1/1", 1, "ABC123"),
            obs("gpon-olt_1/1/1", 2, "DEF456"),
        ];
        reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());
        assert_eq!(store.len(), 2);

        // The next walk only reports the first ONT.  The second keeps
        // its record and its device-reported status.
        let outcome = reconcile_onts(
            &log,
            &store,
            "olt-1",
            &observations[..1],
            Utc::now(),
        );
        assert_eq!(outcome.created, 0);
        assert_eq!(store.len(), 2);
        let absent = store.get(&observations[1].key).unwrap();
        assert_eq!(absent.status, OnuStatus::Online);
    }

    #[test]
    fn test_serial_conflict_kept_and_reported() {
        let store = MemStore::new();
        let log = test_log();
        let mut observations = vec![obs("gpon-olt_1/1/1", 1, "ABC123")];
        reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());

        observations[0].serial_number = "XYZ999".to_string();
        observations[0].status = OnuStatus::Offline;
        let outcome =
            reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());
        assert_eq!(outcome.conflicts, 1);

        // The stored serial wins; non-identity fields still update.
        let rec = store.get(&observations[0].key).unwrap();
        assert_eq!(rec.serial_number, "ABC123");
        assert_eq!(rec.status, OnuStatus::Offline);
    }

    #[test]
    fn test_empty_serial_never_clears() {
        let store = MemStore::new();
        let log = test_log();
        let mut observations = vec![obs("gpon-olt_1/1/1", 1, "ABC123")];
        reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());

        observations[0].serial_number = String::new();
        let outcome =
            reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());
        assert_eq!(outcome.conflicts, 0);
        let rec = store.get(&observations[0].key).unwrap();
        assert_eq!(rec.serial_number, "ABC123");
    }

    #[test]
    fn test_late_serial_adopted() {
        let store = MemStore::new();
        let log = test_log();
        let mut observations = vec![obs("gpon-olt_1/1/1", 1, "")];
        reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());

        observations[0].serial_number = "ABC123".to_string();
        let outcome =
            reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());
        assert_eq!(outcome.updated, 1);
        let rec = store.get(&observations[0].key).unwrap();
        assert_eq!(rec.serial_number, "ABC123");
    }

    #[test]
    fn test_devices_are_independent() {
        let store = MemStore::new();
        let log = test_log();
        let mut other = obs("gpon-olt_1/1/1", 1, "OTHER");
        other.key.device = "olt-2".to_string();
        store.upsert(OntRecord {
            id: uuid::Uuid::new_v4(),
            key: other.key.clone(),
            serial_number: other.serial_number.clone(),
            model: String::new(),
            firmware_version: String::new(),
            status: OnuStatus::Online,
            rx_power: None,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            unstructured: false,
        });

        // Reconciling olt-1 sees an empty set even though olt-2 has a
        // record under the same port/index.
        let observations = vec![obs("gpon-olt_1/1/1", 1, "ABC123")];
        let outcome =
            reconcile_onts(&log, &store, "olt-1", &observations, Utc::now());
        assert_eq!(outcome.created, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&other.key).unwrap().serial_number, "OTHER");
    }
}
