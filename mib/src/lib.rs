// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Vendor MIB knowledge for PON access devices: metric-to-OID catalogs,
//! table index parsing, and raw value decoding.  This crate is pure
//! protocol knowledge and performs no I/O of its own.

pub mod catalog;
pub mod index;
pub mod value;

pub use catalog::MetricSpec;
pub use catalog::OidCatalog;
pub use index::PonPort;
pub use index::PortIndex;
pub use value::OnuStatus;
pub use value::RawValue;

#[derive(Debug, thiserror::Error)]
pub enum MibError {
    /// The named metric is not registered in the catalog.
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
    /// A metric definition failed validation when it was registered.
    #[error("invalid metric {name}: {reason}")]
    InvalidMetric { name: String, reason: String },
}

pub type MibResult<T> = Result<T, MibError>;
