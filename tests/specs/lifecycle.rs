// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle specs: shutdown, session expiry, and rebuilt caches.

use std::sync::Arc;

use bson::doc;

use skynet_client::ServiceClient;
use skynet_server::EchoService;
use skynet_store::MemoryStore;

use super::prelude::*;

#[tokio::test]
async fn shutdown_makes_the_service_invisible_to_peers() {
    let store = MemoryStore::new();
    let (handle, _port) =
        start_server(&store, 2300, vec![Arc::new(EchoService::new("Test"))]).await;

    let consumer = open_registry(&store).await;
    wait_for("endpoint visible", || consumer.servers_for("EchoService", "*", "Test").is_ok())
        .await;

    handle.shutdown().await;

    wait_for("endpoint removed", || consumer.servers_for("EchoService", "*", "Test").is_err())
        .await;
}

#[tokio::test]
async fn dead_session_removes_its_instances_from_consumers() {
    let store = MemoryStore::new();
    // The server's registry opens the first store session.
    let (_handle, _port) =
        start_server(&store, 2400, vec![Arc::new(EchoService::new("Test"))]).await;
    let server_session = store.session_ids()[0];

    let consumer = open_registry(&store).await;
    wait_for("endpoint visible", || consumer.servers_for("EchoService", "*", "Test").is_ok())
        .await;

    // Simulate the server process losing its coordination-store session:
    // its ephemeral instance record dies with it.
    store.expire(server_session);

    wait_for("endpoint removed", || consumer.servers_for("EchoService", "*", "Test").is_err())
        .await;
}

#[tokio::test]
async fn consumer_cache_survives_its_own_session_expiry() {
    let store = MemoryStore::new();
    let consumer = open_registry(&store).await;
    let consumer_session = store.session_ids()[0];

    let (_handle, _port) =
        start_server(&store, 2500, vec![Arc::new(EchoService::new("Test"))]).await;
    wait_for("endpoint visible", || consumer.servers_for("EchoService", "*", "Test").is_ok())
        .await;

    // The consumer's session dies; a fresh session re-bootstraps the
    // cache and the instance is indexed again from the snapshot.
    store.expire(consumer_session);

    wait_for("endpoint still resolvable after re-bootstrap", || {
        consumer.servers_for("EchoService", "*", "Test").is_ok()
    })
    .await;

    let client = ServiceClient::new(consumer, pool(), "EchoService", "*", "Test");
    let reply = client.call("echo", &doc! { "back": true }).await.unwrap();
    assert_eq!(reply, doc! { "back": true });
}

#[tokio::test]
async fn rebinding_after_shutdown_reuses_the_registry_cleanly() {
    let store = MemoryStore::new();
    let (handle, first_port) =
        start_server(&store, 2600, vec![Arc::new(EchoService::new("Test"))]).await;
    handle.shutdown().await;

    let (_handle, second_port) =
        start_server(&store, 2600, vec![Arc::new(EchoService::new("Test"))]).await;

    let consumer = open_registry(&store).await;
    wait_for("rebound endpoint visible", || {
        consumer
            .servers_for("EchoService", "*", "Test")
            .map(|s| s.iter().any(|e| e.port == second_port))
            .unwrap_or(false)
    })
    .await;

    let client = ServiceClient::new(consumer, pool(), "EchoService", "*", "Test");
    let reply = client.call("echo", &doc! { "n": 1i64 }).await.unwrap();
    assert_eq!(reply, doc! { "n": 1i64 });

    // Informational: the first bind's port may or may not be reused.
    let _ = first_port;
}
