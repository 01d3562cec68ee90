// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod call;
pub mod server;

use std::sync::Arc;

use anyhow::{bail, Result};

use skynet_core::{Config, RegistryBackend};
use skynet_registry::{RegistryLayout, ServiceRegistry};
use skynet_store::{MemoryStore, StoreConnector};

/// Build the coordination-store connector for the configured backend.
///
/// The ZooKeeper and Doozer transports live outside this workspace; a
/// build without one linked can still run everything against the
/// in-process loopback store.
pub fn connector(config: &Config) -> Result<Arc<dyn StoreConnector>> {
    match config.registry.backend {
        RegistryBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        backend @ (RegistryBackend::Zk | RegistryBackend::Doozer) => bail!(
            "the {:?} transport adapter is not linked into this build; \
             set `registry.backend: memory` or link an adapter crate",
            backend
        ),
    }
}

pub async fn open_registry(config: &Config) -> Result<ServiceRegistry> {
    let connector = connector(config)?;
    let registry =
        ServiceRegistry::open(connector, config.local_ip(), RegistryLayout::Instances).await?;
    Ok(registry)
}
