// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the end-to-end specs.

use std::sync::Arc;
use std::time::Duration;

use skynet_client::{ConnectOptions, ConnectionPool, PoolOptions};
use skynet_registry::{RegistryLayout, ServiceRegistry};
use skynet_server::{Server, ServerHandle, ServerOptions, SkynetService};
use skynet_store::MemoryStore;

pub async fn open_registry(store: &MemoryStore) -> ServiceRegistry {
    ServiceRegistry::open(
        Arc::new(store.clone()),
        "127.0.0.1".parse().unwrap(),
        RegistryLayout::Instances,
    )
    .await
    .unwrap()
}

pub fn pool_with_read_timeout(read_timeout: Duration) -> ConnectionPool {
    ConnectionPool::new(PoolOptions {
        size: 5,
        borrow_timeout: Duration::from_secs(5),
        warn_timeout: Duration::from_secs(1),
        idle_timeout: Duration::from_secs(600),
        connect: ConnectOptions {
            connect_timeout: Duration::from_secs(2),
            retry_count: 0,
            retry_interval: Duration::from_millis(10),
            read_timeout,
        },
    })
}

pub fn pool() -> ConnectionPool {
    pool_with_read_timeout(Duration::from_secs(10))
}

/// Bind and run a server for `services`, returning its control handle and
/// the bound port.
pub async fn start_server(
    store: &MemoryStore,
    port_start: u16,
    services: Vec<Arc<dyn SkynetService>>,
) -> (ServerHandle, u16) {
    let registry = open_registry(store).await;
    let server =
        Server::bind("127.0.0.1", port_start, registry, services, ServerOptions::default())
            .await
            .unwrap();
    let handle = server.handle();
    let port = server.port();
    tokio::spawn(server.run());
    (handle, port)
}

/// Poll until `check` passes or five seconds elapse.
pub async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
