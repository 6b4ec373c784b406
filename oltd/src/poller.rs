// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Per-device polling loops.
//!
//! Each configured device gets its own task running one poll cycle per
//! interval.  Devices are independent of each other; within one device
//! the loop is the only poller, which serializes reconciliation against
//! the store for that device's identity keys.
//!
//! A cycle always completes.  Walk failures degrade the affected
//! sub-metric for that cycle, undecodable entries are skipped and
//! counted, and a device that does not match the vendor signature
//! short-circuits with no side effects.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use slog::debug;
use slog::error;
use slog::info;
use slog::warn;
use tokio::sync::mpsc;

use crate::config::DeviceConfig;
use crate::errors::OltdError;
use crate::reconcile;
use crate::snmp::TableWalk;
use crate::types::CycleCounts;
use crate::types::DeviceIdentity;
use crate::types::OltdResult;
use crate::types::OntKey;
use crate::types::OntObservation;
use crate::types::PollCycleResult;
use crate::types::SensorClass;
use crate::types::SensorReading;
use crate::Global;
use mib::catalog;
use mib::OnuStatus;
use mib::PortIndex;

// Sub-metric labels used in PollCycleResult::degraded.
pub const SUBMETRIC_ONT_STATUS: &str = "ont-status";
pub const SUBMETRIC_OPTICAL_POWER: &str = "optical-power";

#[derive(Debug)]
pub struct Device {
    log: slog::Logger,

    /// Inventory identity of the device.
    pub identity: DeviceIdentity,

    /// Per-device override of the global poll interval.
    pub poll_interval: Option<Duration>,

    /// Counters across this device's cycles.
    pub stats: Stats,

    /// Summary of the most recent completed cycle.
    pub last_result: Option<PollCycleResult>,

    pub msg_tx: mpsc::Sender<DeviceMsg>,
}

/// Counters kept per device for observability.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, JsonSchema, Serialize,
)]
pub struct Stats {
    /// Cycles run, including not-applicable ones.
    pub cycles_total: u64,
    /// Cycles short-circuited by the vendor signature gate.
    pub cycles_not_applicable: u64,
    /// Table walks that failed and degraded a sub-metric.
    pub walks_degraded: u64,
    /// Walk entries skipped because a value failed to decode.
    pub entries_skipped: u64,
    /// Serial-number identity conflicts observed.
    pub conflicts_total: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceMsg {
    PollNow,
    TimeToGo,
}

// Convenience to look for a device in the hash and return a consistent
// error if it's not found.
fn get_device(g: &Global, name: &str) -> OltdResult<Arc<Mutex<Device>>> {
    g.devices
        .lock()
        .unwrap()
        .get(name)
        .ok_or(OltdError::Missing(format!("no such device: {name}")))
        .cloned()
}

/// Case-insensitive vendor gate: does any configured signature appear in
/// the device's system description or hardware string?
pub fn device_matches(identity: &DeviceIdentity, signatures: &[String]) -> bool {
    let sys_descr = identity.sys_descr.to_lowercase();
    let hardware = identity.hardware.to_lowercase();
    signatures.iter().any(|sig| {
        let sig = sig.to_lowercase();
        sys_descr.contains(&sig) || hardware.contains(&sig)
    })
}

// Fold one walked ONT-table row into an observation.  Returns the number
// of values skipped along the way.
fn ont_observation(
    log: &slog::Logger,
    device: &str,
    index: &str,
    row: &BTreeMap<String, mib::RawValue>,
    rx_scale: f64,
) -> (OntObservation, u64) {
    let mut skipped = 0;

    let parsed = PortIndex::parse(index);
    // A row without an ONT component still reconciles, under index 0,
    // but is flagged so nothing downstream trusts its structure.
    let (ont_index, unstructured) = match parsed.ont() {
        Some(ont) => (ont, false),
        None => (0, true),
    };

    let status = match row.get(catalog::ONT_STATUS).map(|v| v.as_i64()) {
        Some(Some(code)) => OnuStatus::from_code(code),
        Some(None) => {
            debug!(log, "non-numeric ont status";
                "device" => device, "index" => index);
            skipped += 1;
            OnuStatus::Unknown
        }
        None => OnuStatus::Unknown,
    };

    let string_col = |name: &str| {
        row.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let rx_power = match row.get(catalog::ONT_RX_POWER) {
        Some(raw) => match raw.as_i64() {
            Some(v) => Some(mib::value::decode_scaled(v, rx_scale)),
            None => {
                debug!(log, "non-numeric ont rx power";
                    "device" => device, "index" => index);
                skipped += 1;
                None
            }
        },
        None => None,
    };

    let obs = OntObservation {
        key: OntKey {
            device: device.to_string(),
            pon_port: parsed.port_name(),
            ont_index,
        },
        serial_number: string_col(catalog::ONT_SERIAL),
        model: string_col(catalog::ONT_MODEL),
        firmware_version: string_col(catalog::ONT_FIRMWARE),
        status,
        rx_power,
        unstructured: unstructured || parsed.is_unstructured(),
    };
    (obs, skipped)
}

// Turn the optical DDM walk into per-port TX/RX readings with severity
// attached.  Undecodable values are skipped and counted.
fn optical_readings(
    log: &slog::Logger,
    g: &Global,
    device: &str,
    walk: &TableWalk,
    now: DateTime<Utc>,
) -> OltdResult<(Vec<SensorReading>, u64)> {
    let tx_spec = g.catalog.resolve(catalog::OLT_TX_POWER)?;
    let rx_spec = g.catalog.resolve(catalog::OLT_RX_POWER)?;
    let mut readings = Vec::new();
    let mut skipped = 0;

    for (index, row) in walk {
        let port_name = PortIndex::parse(index).port_name();
        let classes = [
            (SensorClass::OpticalTx, tx_spec, "tx", g.config.thresholds.tx),
            (SensorClass::OpticalRx, rx_spec, "rx", g.config.thresholds.rx),
        ];
        for (class, spec, tag, thresholds) in classes {
            let Some(raw) = row.get(&spec.name) else {
                continue;
            };
            let Some(value) = raw.as_i64() else {
                debug!(log, "non-numeric optical reading";
                    "device" => device, "index" => index.as_str(),
                    "metric" => &spec.name);
                skipped += 1;
                continue;
            };
            let value = mib::value::decode_scaled(value, spec.scale);
            readings.push(SensorReading {
                device: device.to_string(),
                class,
                sensor_index: format!("{tag}-{index}"),
                descr: format!("{port_name} {} Power", tag.to_uppercase()),
                oid: format!("{}.{index}", spec.oid),
                value,
                severity: thresholds.evaluate(value),
                timestamp: now,
            });
        }
    }
    Ok((readings, skipped))
}

/// Run one poll cycle for a device.  Always completes: transport and
/// decode failures are folded into the result rather than raised.
pub async fn run_poll_cycle(
    g: &Global,
    identity: &DeviceIdentity,
) -> OltdResult<PollCycleResult> {
    let log = g.log.new(slog::o!("device" => identity.name.clone()));
    let mut result = PollCycleResult::default();

    if !device_matches(identity, &g.config.vendor_signatures) {
        debug!(log, "device does not match vendor signatures");
        return Ok(result);
    }
    result.applicable = true;

    let ont_table = g.catalog.resolve(catalog::ONT_TABLE)?;
    let ont_columns: Vec<mib::MetricSpec> = [
        catalog::ONT_STATUS,
        catalog::ONT_SERIAL,
        catalog::ONT_MODEL,
        catalog::ONT_FIRMWARE,
        catalog::ONT_RX_POWER,
    ]
    .iter()
    .map(|name| g.catalog.resolve(name).cloned())
    .collect::<Result<_, _>>()?;
    let rx_scale = g.catalog.resolve(catalog::ONT_RX_POWER)?.scale;

    let optical_table = g.catalog.resolve(catalog::OPTICAL_TABLE)?;
    let optical_columns: Vec<mib::MetricSpec> =
        [catalog::OLT_TX_POWER, catalog::OLT_RX_POWER]
            .iter()
            .map(|name| g.catalog.resolve(name).cloned())
            .collect::<Result<_, _>>()?;

    // The two walks have no data dependency, so they are issued
    // concurrently.  Either one failing degrades only its own
    // sub-metric.
    let (ont_walk, optical_walk) = tokio::join!(
        g.transport
            .walk_table(identity, &ont_table.oid, &ont_columns),
        g.transport
            .walk_table(identity, &optical_table.oid, &optical_columns),
    );

    let now = Utc::now();

    let ont_walk = match ont_walk {
        Ok(walk) => walk,
        Err(e) => {
            warn!(log, "ont table walk failed: {e}");
            result.degraded.push(SUBMETRIC_ONT_STATUS.to_string());
            TableWalk::new()
        }
    };
    let optical_walk = match optical_walk {
        Ok(walk) => walk,
        Err(e) => {
            warn!(log, "optical table walk failed: {e}");
            result.degraded.push(SUBMETRIC_OPTICAL_POWER.to_string());
            TableWalk::new()
        }
    };

    let mut observations = Vec::with_capacity(ont_walk.len());
    for (index, row) in &ont_walk {
        let (obs, skipped) =
            ont_observation(&log, &identity.name, index, row, rx_scale);
        result.skipped += skipped;
        observations.push(obs);
    }

    let (readings, skipped) =
        optical_readings(&log, g, &identity.name, &optical_walk, now)?;
    result.skipped += skipped;

    for reading in &readings {
        g.sink.register_reading(reading);
    }

    let outcome = reconcile::reconcile_onts(
        &log,
        g.store.as_ref(),
        &identity.name,
        &observations,
        now,
    );
    result.created = outcome.created;
    result.updated = outcome.updated;
    result.refreshed = outcome.refreshed;
    result.conflicts = outcome.conflicts;

    result.counts = CycleCounts {
        total: observations.len() as u64,
        online: observations
            .iter()
            .filter(|o| o.status == OnuStatus::Online)
            .count() as u64,
        offline: observations
            .iter()
            .filter(|o| o.status == OnuStatus::Offline)
            .count() as u64,
    };
    g.sink.emit_cycle_summary(&identity.name, &result.counts);

    info!(log, "poll cycle complete";
        "total" => result.counts.total,
        "online" => result.counts.online,
        "offline" => result.counts.offline,
        "created" => result.created,
        "skipped" => result.skipped,
        "degraded" => result.degraded.join(","));

    result.readings = readings;
    Ok(result)
}

enum WakeupEvent {
    Message(DeviceMsg),
    Timeout,
}

async fn wait_for_event(
    msg_rx: &mut mpsc::Receiver<DeviceMsg>,
    deadline: Instant,
) -> WakeupEvent {
    tokio::task::yield_now().await;
    let now = Instant::now();
    let delay = if deadline <= now {
        return WakeupEvent::Timeout;
    } else {
        deadline - now
    };

    tokio::select! {
        msg = msg_rx.recv() => WakeupEvent::Message(msg
            .expect("channel shouldn't be dropped while the device task is alive")),
        _ = tokio::time::sleep(delay) => WakeupEvent::Timeout,
    }
}

async fn device_loop(
    g: Arc<Global>,
    name: String,
    device_lock: Arc<Mutex<Device>>,
    mut msg_rx: mpsc::Receiver<DeviceMsg>,
) {
    let log = device_lock.lock().unwrap().log.clone();
    let interval = {
        let device = device_lock.lock().unwrap();
        device
            .poll_interval
            .unwrap_or(Duration::from_secs(g.config.poll_interval_secs))
    };

    debug!(log, "device loop started");

    // Stagger the first cycle so a fleet of devices doesn't walk in
    // lockstep.
    let mut next_poll = Instant::now()
        + common::random_interval(
            Duration::ZERO,
            interval.min(Duration::from_secs(30)),
        );

    loop {
        if Instant::now() >= next_poll {
            let identity = device_lock.lock().unwrap().identity.clone();
            match run_poll_cycle(&g, &identity).await {
                Ok(result) => {
                    let mut device = device_lock.lock().unwrap();
                    device.stats.cycles_total += 1;
                    if !result.applicable {
                        device.stats.cycles_not_applicable += 1;
                    }
                    device.stats.walks_degraded +=
                        result.degraded.len() as u64;
                    device.stats.entries_skipped += result.skipped;
                    device.stats.conflicts_total += result.conflicts;
                    device.last_result = Some(result);
                }
                // Only a configuration-level fault lands here; the
                // catalog was validated at startup, so this is not
                // expected in a running daemon.
                Err(e) => error!(log, "poll cycle failed: {e:?}"),
            }
            next_poll = Instant::now() + interval;
        }

        match wait_for_event(&mut msg_rx, next_poll).await {
            WakeupEvent::Message(DeviceMsg::TimeToGo) => break,
            WakeupEvent::Message(DeviceMsg::PollNow) => {
                next_poll = Instant::now()
            }
            WakeupEvent::Timeout => {
                // the poll happens at the top of the loop
            }
        }
    }

    debug!(log, "device loop shutting down");
    g.devices
        .lock()
        .unwrap()
        .remove(&name)
        .expect("device hash entry should persist until task exits");
}

pub async fn device_add(
    global: &Arc<Global>,
    cfg: DeviceConfig,
) -> OltdResult<()> {
    info!(&global.log, "adding device";
        "name" => &cfg.name, "host" => &cfg.host);

    let mut device_hash = global.devices.lock().unwrap();
    if device_hash.get(&cfg.name).is_some() {
        return Err(OltdError::Exists("device already added".into()));
    }

    let name = cfg.name.clone();
    let log = global.log.new(slog::o!("device" => name.clone()));
    let (msg_tx, msg_rx) = mpsc::channel(1);

    let device = Device {
        log,
        identity: cfg.identity(),
        poll_interval: cfg.poll_interval_secs.map(Duration::from_secs),
        stats: Stats::default(),
        last_result: None,
        msg_tx,
    };

    let device_lock = Arc::new(Mutex::new(device));
    device_hash.insert(name.clone(), device_lock.clone());

    let global = global.clone();
    let _hdl = tokio::task::spawn(async move {
        device_loop(global.clone(), name, device_lock, msg_rx).await
    });

    Ok(())
}

pub async fn device_remove(
    global: &Arc<Global>,
    name: String,
) -> OltdResult<()> {
    for tries in 1..11 {
        {
            // Look in the hash for this device.  If we find it, make a
            // copy of the tx channel needed to ask it to shut down.
            let msg_tx = {
                let device_hash = global.devices.lock().unwrap();
                device_hash
                    .get(&name)
                    .map(|device| device.lock().unwrap().msg_tx.clone())
            };

            // On the first attempt a missing channel means the device
            // was never configured.  On a later attempt it means the
            // loop has shut down in response to our message.
            match (tries, msg_tx) {
                (_, Some(tx)) => {
                    info!(global.log, "shutting down {name}. Attempt: {tries}");
                    let _ = tx.send(DeviceMsg::TimeToGo).await;
                }
                (1, None) => {
                    return Err(OltdError::Missing(
                        "no such device configured".into(),
                    ))
                }
                (_, None) => {
                    info!(global.log, "poll loop for {name} shut down");
                    return Ok(());
                }
            };
        }
        let _ = tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    Err(OltdError::Other("device poll loop failed to shut down".into()))
}

/// Ask a device's loop to run a cycle immediately.
pub async fn poll_now(g: &Global, name: &str) -> OltdResult<()> {
    let msg_tx = {
        let device = get_device(g, name)?;
        let device = device.lock().unwrap();
        device.msg_tx.clone()
    };
    let _ = msg_tx.send(DeviceMsg::PollNow).await;
    Ok(())
}

pub async fn shutdown_all(g: &Global) {
    debug!(&g.log, "shutting down device tasks");
    let msgs: Vec<mpsc::Sender<DeviceMsg>> = g
        .devices
        .lock()
        .unwrap()
        .values()
        .map(|d| d.lock().unwrap().msg_tx.clone())
        .collect();

    for msg_tx in &msgs {
        let _ = msg_tx.send(DeviceMsg::TimeToGo).await;
    }
    debug!(&g.log, "waiting for tasks to exit");
    while !g.devices.lock().unwrap().is_empty() {
        let _ = tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
