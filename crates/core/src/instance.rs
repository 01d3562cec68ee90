// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance records: the attributes one running service instance publishes
//! into the coordination store, and the key consumers look them up under.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

/// Deterministic instance UUID: `"<ip>:<port>-<pid>-<name>-<version>"`.
///
/// Re-running the same service on the same endpoint from the same process
/// produces the same UUID, so re-registration updates in place instead of
/// leaking a second record.
pub fn instance_uuid(ip: &str, port: u16, pid: u32, name: &str, version: &str) -> String {
    format!("{}:{}-{}-{}-{}", ip, port, pid, name, version)
}

/// The set of attributes published per running service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub uuid: String,
    pub name: String,
    pub version: String,
    pub region: String,
    pub ip: String,
    pub port: u16,
    /// Upper bound when the server probed upward from its configured port.
    pub max_port: u16,
    /// Atomic publish flag. The instance is invisible to consumers until
    /// this is true; it is always the last attribute written.
    pub registered: bool,
}

impl InstanceRecord {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.ip.clone(), self.port)
    }
}

/// Lookup key for the registry index: `"<name>/<version>/<region>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub name: String,
    pub version: String,
    pub region: String,
}

impl ServiceKey {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self { name: name.into(), version: version.into(), region: region.into() }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.version, self.region)
    }
}

impl FromStr for ServiceKey {
    type Err = ServiceKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(version), Some(region))
                if !name.is_empty() && !version.is_empty() && !region.is_empty() =>
            {
                Ok(Self::new(name, version, region))
            }
            _ => Err(ServiceKeyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid service key (want name/version/region): {0:?}")]
pub struct ServiceKeyParseError(pub String);

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
