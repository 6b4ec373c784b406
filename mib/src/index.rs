// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Parsing of the hierarchical table indices used by PON OLT MIBs.
//!
//! OLTs address a PON interface as shelf.slot.port, and an ONT as
//! shelf.slot.port.ont.  Index layouts vary across firmware versions, so a
//! malformed index is a degraded-but-handled case rather than an error:
//! parsing never fails, it falls back to an unstructured identifier.

use std::fmt;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// A shelf/slot/port triple addressing one PON interface on an OLT.
#[derive(
    Clone,
    Copy,
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
pub struct PonPort {
    pub shelf: u32,
    pub slot: u32,
    pub port: u32,
}

impl fmt::Display for PonPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "gpon-olt_{}/{}/{}", self.shelf, self.slot, self.port)
    }
}

/// The result of decoding one table index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortIndex {
    /// A full shelf.slot.port.ont index.  Components beyond the fourth
    /// are ignored.
    Ont { port: PonPort, ont: u32 },
    /// A shelf.slot.port index with no ONT component.
    Port(PonPort),
    /// The index did not carry the expected structure.  The payload is a
    /// synthesized fallback identifier; downstream code must not assume
    /// shelf/slot/port semantics for it.
    Unstructured(String),
}

impl PortIndex {
    pub fn parse(raw: &str) -> Self {
        let comps: Vec<u32> = raw
            .split('.')
            .map_while(|c| c.parse().ok())
            .collect();

        match comps.as_slice() {
            [shelf, slot, port, ont, ..] => PortIndex::Ont {
                port: PonPort {
                    shelf: *shelf,
                    slot: *slot,
                    port: *port,
                },
                ont: *ont,
            },
            [shelf, slot, port] => PortIndex::Port(PonPort {
                shelf: *shelf,
                slot: *slot,
                port: *port,
            }),
            _ => PortIndex::Unstructured(format!("pon-port-{raw}")),
        }
    }

    /// The canonical port name this index resolves to.
    pub fn port_name(&self) -> String {
        match self {
            PortIndex::Ont { port, .. } => port.to_string(),
            PortIndex::Port(port) => port.to_string(),
            PortIndex::Unstructured(name) => name.clone(),
        }
    }

    pub fn ont(&self) -> Option<u32> {
        match self {
            PortIndex::Ont { ont, .. } => Some(*ont),
            _ => None,
        }
    }

    pub fn is_unstructured(&self) -> bool {
        matches!(self, PortIndex::Unstructured(_))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_full_ont_index() {
        let idx = PortIndex::parse("1.1.1.4");
        assert_eq!(
            idx,
            PortIndex::Ont {
                port: PonPort {
                    shelf: 1,
                    slot: 1,
                    port: 1
                },
                ont: 4
            }
        );
        assert_eq!(idx.port_name(), "gpon-olt_1/1/1");
        assert_eq!(idx.ont(), Some(4));
        assert!(!idx.is_unstructured());
    }

    #[test]
    fn test_trailing_components_ignored() {
        let idx = PortIndex::parse("2.3.4.5.6.7");
        assert_eq!(idx.port_name(), "gpon-olt_2/3/4");
        assert_eq!(idx.ont(), Some(5));
    }

    #[test]
    fn test_port_only_index() {
        let idx = PortIndex::parse("1.2.3");
        assert_eq!(
            idx,
            PortIndex::Port(PonPort {
                shelf: 1,
                slot: 2,
                port: 3
            })
        );
        assert_eq!(idx.port_name(), "gpon-olt_1/2/3");
        assert_eq!(idx.ont(), None);
    }

    #[test]
    fn test_short_index_falls_back() {
        let idx = PortIndex::parse("1.7");
        assert_eq!(idx, PortIndex::Unstructured("pon-port-1.7".to_string()));
        assert_eq!(idx.port_name(), "pon-port-1.7");
        assert!(idx.is_unstructured());
    }

    #[test]
    fn test_non_numeric_falls_back() {
        let idx = PortIndex::parse("1.x.3.4");
        assert!(idx.is_unstructured());
        assert_eq!(idx.port_name(), "pon-port-1.x.3.4");

        let idx = PortIndex::parse("");
        assert!(idx.is_unstructured());
    }
}
