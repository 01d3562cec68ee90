// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network endpoint (`host:port`) addressing a running service instance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A `host:port` pair hosting one or more services.
///
/// The host is kept as written (hostname or IP literal); resolution to an
/// IPv4 address for locality scoring happens in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointParseError {
    #[error("endpoint missing ':' separator: {0:?}")]
    MissingSeparator(String),

    #[error("endpoint has an invalid port: {0:?}")]
    InvalidPort(String),

    #[error("endpoint has an empty host: {0:?}")]
    EmptyHost(String),
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // rsplit so IPv6-ish hosts with colons keep everything before the
        // final separator as the host part.
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingSeparator(s.to_string()))?;
        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost(s.to_string()));
        }
        let port =
            port.parse::<u16>().map_err(|_| EndpointParseError::InvalidPort(s.to_string()))?;
        Ok(Self { host: host.to_string(), port })
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> String {
        e.to_string()
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
