// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use skynet_store::MemoryStore;

use super::*;

const LOCAL: &str = "192.168.11.0";

async fn open_registry(store: &MemoryStore) -> ServiceRegistry {
    ServiceRegistry::open(Arc::new(store.clone()), LOCAL.parse().unwrap(), RegistryLayout::Instances)
        .await
        .unwrap()
}

/// Poll until `check` passes or two seconds elapse.
async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn register_makes_endpoint_visible() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    registry.register("EchoService", "1", "Test", "127.0.0.1", 2000).await.unwrap();

    wait_for("endpoint indexed", || registry.servers_for("EchoService", "1", "Test").is_ok())
        .await;
    let servers = registry.servers_for("EchoService", "1", "Test").unwrap();
    assert_eq!(servers, vec![Endpoint::new("127.0.0.1", 2000)]);
}

#[tokio::test]
async fn endpoints_group_by_descending_locality() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    for host in ["192.168.11.0", "192.168.11.10", "192.168.10.0", "192.5.10.0", "10.0.11.0"] {
        registry.register("Svc", "1", "R", host, 7000).await.unwrap();
    }

    let key = ServiceKey::new("Svc", "1", "R");
    wait_for("all five indexed", || {
        registry.groups(&key).iter().map(|g| g.endpoints.len()).sum::<usize>() == 5
    })
    .await;

    let groups = registry.groups(&key);
    let scores: Vec<u8> = groups.iter().map(|g| g.score).collect();
    assert_eq!(scores, vec![4, 3, 2, 1, 0]);

    // servers_for returns only the best group.
    let best = registry.servers_for("Svc", "1", "R").unwrap();
    assert_eq!(best, vec![Endpoint::new("192.168.11.0", 7000)]);
}

#[tokio::test]
async fn reregistration_is_idempotent() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    registry.register("Svc", "1", "R", "10.0.0.1", 9000).await.unwrap();
    registry.register("Svc", "1", "R", "10.0.0.1", 9000).await.unwrap();

    let key = ServiceKey::new("Svc", "1", "R");
    wait_for("indexed", || !registry.groups(&key).is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let groups = registry.groups(&key);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].endpoints, vec![Endpoint::new("10.0.0.1", 9000)]);
}

#[tokio::test]
async fn wildcard_version_resolves_to_highest_integer() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    registry.register("Svc", "1", "R", "10.0.0.1", 9001).await.unwrap();
    registry.register("Svc", "3", "R", "10.0.0.1", 9003).await.unwrap();
    registry.register("Svc", "2", "R", "10.0.0.1", 9002).await.unwrap();

    wait_for("three versions indexed", || registry.key_count() == 3).await;

    let servers = registry.servers_for("Svc", "*", "R").unwrap();
    assert_eq!(servers, vec![Endpoint::new("10.0.0.1", 9003)]);
}

#[tokio::test]
async fn missing_service_reports_unavailable_with_details() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    let err = registry.servers_for("SomeService", "*", "Test").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("SomeService"), "{message}");
    assert!(message.contains("*"), "{message}");
    assert!(message.contains("Test"), "{message}");

    let err = registry.servers_for("SomeService", "2", "Test").unwrap_err();
    assert!(err.to_string().contains("2"));
}

#[tokio::test]
async fn deregister_removes_endpoint_before_returning() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    registry.register("Svc", "1", "R", "10.0.0.1", 9000).await.unwrap();
    wait_for("indexed", || registry.servers_for("Svc", "1", "R").is_ok()).await;

    registry.deregister("Svc", "1", "R", "10.0.0.1", 9000).await.unwrap();

    // Synchronous local removal: no watch round-trip needed.
    assert!(registry.servers_for("Svc", "1", "R").is_err());
}

#[tokio::test]
async fn removing_last_endpoint_removes_the_key() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    registry.register("Svc", "1", "R", "10.0.0.1", 9000).await.unwrap();
    wait_for("indexed", || registry.key_count() == 1).await;

    registry.deregister("Svc", "1", "R", "10.0.0.1", 9000).await.unwrap();
    assert_eq!(registry.key_count(), 0);
}

#[tokio::test]
async fn consumer_observes_remote_registration_and_expiry() {
    let store = MemoryStore::new();
    let producer = open_registry(&store).await;
    let producer_session = store.session_ids()[0];
    let consumer = open_registry(&store).await;

    let removed = Arc::new(AtomicUsize::new(0));
    producer.register("Svc", "1", "R", "10.0.0.9", 9000).await.unwrap();

    wait_for("consumer sees endpoint", || consumer.servers_for("Svc", "1", "R").is_ok()).await;

    let counter = Arc::clone(&removed);
    consumer.on_server_removed(&Endpoint::new("10.0.0.9", 9000), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // The producer's session dies; its ephemeral record goes with it.
    store.expire(producer_session);

    wait_for("consumer drops endpoint", || consumer.servers_for("Svc", "1", "R").is_err()).await;
    wait_for("removal callback fired", || removed.load(Ordering::SeqCst) == 1).await;

    // One-shot: callbacks are cleared after firing.
    assert_eq!(removed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn graceful_deregister_does_not_fire_removal_callbacks() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    registry.register("Svc", "1", "R", "10.0.0.1", 9000).await.unwrap();
    wait_for("indexed", || registry.servers_for("Svc", "1", "R").is_ok()).await;

    let removed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&removed);
    registry.on_server_removed(&Endpoint::new("10.0.0.1", 9000), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.deregister("Svc", "1", "R", "10.0.0.1", 9000).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(removed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn server_for_picks_within_the_best_group() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    registry.register("Svc", "1", "R", "192.168.11.0", 8001).await.unwrap();
    registry.register("Svc", "1", "R", "192.168.11.0", 8002).await.unwrap();
    registry.register("Svc", "1", "R", "10.9.9.9", 8003).await.unwrap();

    let key = ServiceKey::new("Svc", "1", "R");
    wait_for("all indexed", || {
        registry.groups(&key).iter().map(|g| g.endpoints.len()).sum::<usize>() == 3
    })
    .await;

    for _ in 0..50 {
        let picked = registry.server_for("Svc", "1", "R").unwrap();
        assert_eq!(picked.host, "192.168.11.0", "low-score endpoint must never be picked");
    }
}

#[tokio::test]
async fn services_layout_roundtrip() {
    let store = MemoryStore::new();
    let registry = ServiceRegistry::open(
        Arc::new(store.clone()),
        LOCAL.parse().unwrap(),
        RegistryLayout::Services,
    )
    .await
    .unwrap();

    registry.register("Blob", "2", "R", "10.1.0.1", 4000).await.unwrap();
    wait_for("blob indexed", || registry.servers_for("Blob", "2", "R").is_ok()).await;
    assert_eq!(
        registry.servers_for("Blob", "2", "R").unwrap(),
        vec![Endpoint::new("10.1.0.1", 4000)]
    );

    registry.deregister("Blob", "2", "R", "10.1.0.1", 4000).await.unwrap();
    assert!(registry.servers_for("Blob", "2", "R").is_err());
}
