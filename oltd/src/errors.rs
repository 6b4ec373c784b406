// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::convert;

use crate::snmp::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum OltdError {
    /// A table walk failed or the device was unreachable.  Recovered at
    /// the orchestrator level: the affected sub-metric is degraded for
    /// the cycle, independent sub-metrics continue.
    #[error("transport error: {0}")]
    Transport(String),
    /// A metric name missing from the OID catalog.  A configuration
    /// error: fatal at startup, never raised by a running cycle.
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
    #[error("I/O error: {0:?}")]
    Io(std::io::Error),
    #[error("Resource already exists: {0}")]
    Exists(String),
    #[error("No such resource: {0}")]
    Missing(String),
    #[error("Invalid argument: {0}")]
    Invalid(String),
    #[error("error: {0}")]
    Other(String),
}

impl convert::From<std::io::Error> for OltdError {
    fn from(err: std::io::Error) -> Self {
        OltdError::Io(err)
    }
}

impl convert::From<TransportError> for OltdError {
    fn from(err: TransportError) -> Self {
        OltdError::Transport(err.to_string())
    }
}

impl convert::From<mib::MibError> for OltdError {
    fn from(err: mib::MibError) -> Self {
        match err {
            mib::MibError::UnknownMetric(name) => {
                OltdError::UnknownMetric(name)
            }
            e @ mib::MibError::InvalidMetric { .. } => {
                OltdError::Invalid(e.to_string())
            }
        }
    }
}

impl convert::From<OltdError> for dropshot::HttpError {
    fn from(o: OltdError) -> dropshot::HttpError {
        match o {
            OltdError::Transport(e) => {
                dropshot::HttpError::for_internal_error(format!(
                    "transport error: {e}"
                ))
            }
            OltdError::UnknownMetric(e) => {
                dropshot::HttpError::for_internal_error(format!(
                    "unknown metric: {e}"
                ))
            }
            OltdError::Io(e) => {
                dropshot::HttpError::for_internal_error(e.to_string())
            }
            OltdError::Exists(e) => dropshot::HttpError::for_status(
                Some(e),
                http::StatusCode::CONFLICT,
            ),
            OltdError::Missing(e) => dropshot::HttpError::for_status(
                Some(e),
                http::StatusCode::NOT_FOUND,
            ),
            OltdError::Invalid(e) => {
                dropshot::HttpError::for_bad_request(None, e)
            }
            OltdError::Other(e) => dropshot::HttpError::for_internal_error(e),
        }
    }
}

impl convert::From<String> for OltdError {
    fn from(err: String) -> Self {
        OltdError::Other(err)
    }
}

impl convert::From<&str> for OltdError {
    fn from(err: &str) -> Self {
        OltdError::Other(err.to_string())
    }
}

impl convert::From<anyhow::Error> for OltdError {
    fn from(err: anyhow::Error) -> Self {
        OltdError::Other(err.to_string())
    }
}
