// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide configuration surface.
//!
//! Deserialized from the YAML profile the CLI selects; every field has a
//! default so an empty document is a valid configuration. Options we do
//! not recognize are collected and logged at warn level, never rejected.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::net;

/// Top-level configuration for a Skynet process.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_region")]
    pub region: String,

    /// Directory the server task loads service definitions from.
    #[serde(default = "default_services_path")]
    pub services_path: PathBuf,

    /// First port the server tries to bind; probed upward when taken.
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Address other hosts reach this process on. Auto-detected via an
    /// outbound-UDP probe when unset.
    #[serde(default)]
    pub local_ip: Option<Ipv4Addr>,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Options we do not recognize. Kept so `log_unknown_options` can
    /// report them without failing deserialization.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            services_path: default_services_path(),
            server_port: default_server_port(),
            local_ip: None,
            registry: RegistryConfig::default(),
            unknown: BTreeMap::new(),
        }
    }
}

impl Config {
    /// The effective local IPv4 address, probing when not configured.
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip.unwrap_or_else(net::local_ipv4)
    }

    /// Warn about any options the configurator did not recognize.
    pub fn log_unknown_options(&self) {
        for key in self.unknown.keys() {
            warn!(option = %key, "ignoring unrecognized configuration option");
        }
    }
}

/// Which coordination-store backend the registry speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    Zk,
    Doozer,
    /// In-process loopback store for single-process setups and tests.
    Memory,
}

/// Coordination-store and connection-pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_backend")]
    pub backend: RegistryBackend,

    #[serde(default = "default_registry_servers")]
    pub servers: Vec<String>,

    /// Seconds to wait for a coordination-store session to come up.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default)]
    pub pool: PoolSettings,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            servers: default_registry_servers(),
            connect_timeout: default_connect_timeout(),
            pool: PoolSettings::default(),
        }
    }
}

impl RegistryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// Per-endpoint RPC connection pool settings (seconds).
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_pool_size")]
    pub size: usize,

    #[serde(default = "default_borrow_timeout")]
    pub borrow_timeout: u64,

    /// Waits longer than this are logged before the borrow gives up.
    #[serde(default = "default_warn")]
    pub warn: u64,

    /// Idle connections older than this are closed on the next sweep.
    #[serde(default = "default_idle")]
    pub idle: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            borrow_timeout: default_borrow_timeout(),
            warn: default_warn(),
            idle: default_idle(),
        }
    }
}

impl PoolSettings {
    pub fn borrow_timeout(&self) -> Duration {
        Duration::from_secs(self.borrow_timeout)
    }

    pub fn warn_timeout(&self) -> Duration {
        Duration::from_secs(self.warn)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle)
    }
}

fn default_region() -> String {
    "Development".to_string()
}

fn default_services_path() -> PathBuf {
    PathBuf::from("app/services")
}

fn default_server_port() -> u16 {
    2000
}

fn default_backend() -> RegistryBackend {
    RegistryBackend::Zk
}

fn default_registry_servers() -> Vec<String> {
    vec!["127.0.0.1:2181".to_string()]
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_pool_size() -> usize {
    5
}

fn default_borrow_timeout() -> u64 {
    30
}

fn default_warn() -> u64 {
    5
}

fn default_idle() -> u64 {
    600
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
