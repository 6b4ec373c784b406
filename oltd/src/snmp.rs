// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! SNMP table walking.
//!
//! The poller core only sees the `SnmpTransport` trait: a walk either
//! succeeds with N rows or fails with a `TransportError`.  Timeouts and
//! retries are the transport's responsibility.  The default
//! implementation shells out to the net-snmp `snmpbulkwalk` binary, the
//! same collaborator the monitoring platforms in this space rely on.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use slog::debug;

use crate::types::DeviceIdentity;
use mib::MetricSpec;
use mib::RawValue;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("device unreachable: {0}")]
    Unreachable(String),
    #[error("walk timed out after {0} seconds")]
    Timeout(u64),
    #[error("malformed walk response: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rows of one walked table: index string to column values, with
/// columns named by the metric that recognized them.
pub type TableWalk = BTreeMap<String, BTreeMap<String, RawValue>>;

#[async_trait]
pub trait SnmpTransport: Send + Sync {
    /// Walk `table_oid` on the target device and fold the results into
    /// row form.  `columns` names the columns of interest; anything the
    /// walk returns outside those columns is dropped.  An empty result
    /// is not an error.
    async fn walk_table(
        &self,
        target: &DeviceIdentity,
        table_oid: &str,
        columns: &[MetricSpec],
    ) -> Result<TableWalk, TransportError>;
}

/// Walks tables by running `snmpbulkwalk` against the device.
pub struct NetSnmpTransport {
    log: slog::Logger,
    timeout_secs: u64,
    retries: u32,
}

impl NetSnmpTransport {
    pub fn new(log: slog::Logger, timeout_secs: u64, retries: u32) -> Self {
        NetSnmpTransport {
            log,
            timeout_secs,
            retries,
        }
    }
}

#[async_trait]
impl SnmpTransport for NetSnmpTransport {
    async fn walk_table(
        &self,
        target: &DeviceIdentity,
        table_oid: &str,
        columns: &[MetricSpec],
    ) -> Result<TableWalk, TransportError> {
        debug!(self.log, "walking table";
            "device" => &target.name, "oid" => table_oid);

        let child = tokio::process::Command::new("snmpbulkwalk")
            .arg("-v2c")
            .arg("-c")
            .arg(&target.community)
            .arg("-On")
            .arg("-t")
            .arg(self.timeout_secs.to_string())
            .arg("-r")
            .arg(self.retries.to_string())
            .arg(&target.host)
            .arg(table_oid)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // net-snmp enforces the per-request timeout and retries; the
        // outer deadline only catches a wedged binary.
        let deadline =
            Duration::from_secs(self.timeout_secs * (self.retries as u64 + 2));
        let out =
            match tokio::time::timeout(deadline, child.wait_with_output())
                .await
            {
                Ok(out) => out?,
                Err(_) => {
                    return Err(TransportError::Timeout(deadline.as_secs()))
                }
            };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stderr = stderr.trim();
            return if stderr.contains("Timeout") {
                Err(TransportError::Timeout(self.timeout_secs))
            } else {
                Err(TransportError::Unreachable(format!(
                    "{}: {stderr}",
                    target.host
                )))
            };
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        parse_walk_output(&stdout, columns)
    }
}

// Parse `snmpbulkwalk -On` output lines of the form
//   .1.3.6.1.4.1.3902.1082.500.11.2.1.1.1.1.1.1.1 = INTEGER: 1
// into rows keyed by the index remaining after a recognized column OID.
fn parse_walk_output(
    text: &str,
    columns: &[MetricSpec],
) -> Result<TableWalk, TransportError> {
    let mut rows = TableWalk::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("No Such Object")
            || line.starts_with("No Such Instance")
            || line.contains("No more variables left")
        {
            continue;
        }
        let (oid, rhs) = line.split_once(" = ").ok_or_else(|| {
            TransportError::Malformed(format!("unparseable line: {line:?}"))
        })?;

        // Ignore columns we were not asked about.
        let Some((name, index)) = columns.iter().find_map(|spec| {
            oid.strip_prefix(&spec.oid)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|index| (spec.name.clone(), index.to_string()))
        }) else {
            continue;
        };

        rows.entry(index)
            .or_default()
            .insert(name, parse_typed_value(rhs));
    }

    Ok(rows)
}

// The right-hand side carries a "TYPE: value" tag.  Integer-ish types
// map to RawValue::Integer, everything else rides along as a string.
fn parse_typed_value(rhs: &str) -> RawValue {
    let (tag, value) = match rhs.split_once(": ") {
        Some((tag, value)) => (tag, value),
        None => return RawValue::OctetString(rhs.trim().to_string()),
    };

    match tag {
        "INTEGER" | "Gauge32" | "Counter32" | "Counter64" | "Unsigned32" => {
            match value.trim().parse() {
                Ok(v) => RawValue::Integer(v),
                Err(_) => RawValue::OctetString(value.trim().to_string()),
            }
        }
        "STRING" => {
            RawValue::OctetString(value.trim().trim_matches('"').to_string())
        }
        _ => RawValue::OctetString(value.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mib::catalog;
    use mib::OidCatalog;

    fn ont_columns() -> Vec<MetricSpec> {
        let cat = OidCatalog::zte_c300();
        [
            catalog::ONT_STATUS,
            catalog::ONT_SERIAL,
            catalog::ONT_RX_POWER,
        ]
        .iter()
        .map(|name| cat.resolve(name).unwrap().clone())
        .collect()
    }

    #[test]
    fn test_parse_walk_output() {
        let text = "\
.1.3.6.1.4.1.3902.1082.500.11.2.1.1.1.1.2.3.4 = INTEGER: 1
.1.3.6.1.4.1.3902.1082.500.11.2.1.1.3.1.2.3.4 = STRING: \"ABC123\"
.1.3.6.1.4.1.3902.1082.500.11.2.1.1.6.1.2.3.4 = INTEGER: -1550
.1.3.6.1.4.1.3902.1082.500.11.2.1.1.1.1.2.3.5 = INTEGER: 2
";
        let rows = parse_walk_output(text, &ont_columns()).unwrap();
        assert_eq!(rows.len(), 2);

        let row = &rows["1.2.3.4"];
        assert_eq!(row[catalog::ONT_STATUS], RawValue::Integer(1));
        assert_eq!(
            row[catalog::ONT_SERIAL],
            RawValue::OctetString("ABC123".to_string())
        );
        assert_eq!(row[catalog::ONT_RX_POWER], RawValue::Integer(-1550));

        let row = &rows["1.2.3.5"];
        assert_eq!(row[catalog::ONT_STATUS], RawValue::Integer(2));
    }

    #[test]
    fn test_parse_ignores_unrequested_columns() {
        // Column .4 (model) was not requested, so the row never forms.
        let text =
            ".1.3.6.1.4.1.3902.1082.500.11.2.1.1.4.1.1.1.1 = STRING: \"F660\"";
        let rows = parse_walk_output(text, &ont_columns()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_empty_walk() {
        let rows = parse_walk_output("", &ont_columns()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_malformed_line() {
        let res = parse_walk_output("not an snmp line", &ont_columns());
        assert!(matches!(res, Err(TransportError::Malformed(_))));
    }

    #[test]
    fn test_parse_typed_value() {
        assert_eq!(parse_typed_value("INTEGER: -850"), RawValue::Integer(-850));
        assert_eq!(parse_typed_value("Gauge32: 42"), RawValue::Integer(42));
        assert_eq!(
            parse_typed_value("STRING: \"ZTEG-F660\""),
            RawValue::OctetString("ZTEG-F660".to_string())
        );
        assert_eq!(
            parse_typed_value("Hex-STRING: 00 1A"),
            RawValue::OctetString("00 1A".to_string())
        );
    }
}
