// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core RPC specs: echo round-trip, handler exceptions, read timeouts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Document};

use skynet_client::{RpcError, ServiceClient};
use skynet_server::{EchoService, ServiceError, SkynetService};
use skynet_store::MemoryStore;

use super::prelude::*;

struct FailingService;

#[async_trait]
impl SkynetService for FailingService {
    fn service_name(&self) -> &str {
        "FailingService"
    }

    fn service_version(&self) -> &str {
        "1"
    }

    fn service_region(&self) -> &str {
        "Test"
    }

    async fn dispatch(
        &self,
        _method: &str,
        _params: Document,
    ) -> Result<Option<Document>, ServiceError> {
        Err(ServiceError::new("Exception message"))
    }
}

#[tokio::test]
async fn echo_round_trip_with_wildcard_version() {
    let store = MemoryStore::new();
    let (_handle, _port) =
        start_server(&store, 2000, vec![Arc::new(EchoService::new("Test"))]).await;

    let registry = open_registry(&store).await;
    wait_for("EchoService visible", || {
        registry.servers_for("EchoService", "*", "Test").is_ok()
    })
    .await;

    let client = ServiceClient::new(registry, pool(), "EchoService", "*", "Test");
    let reply = client.call("echo", &doc! { "hello": "world" }).await.unwrap();
    assert_eq!(reply, doc! { "hello": "world" });
}

#[tokio::test]
async fn unregistered_service_raises_unavailable_with_details() {
    let store = MemoryStore::new();
    let registry = open_registry(&store).await;

    let client = ServiceClient::new(registry, pool(), "SomeService", "*", "Test");
    let err = client.call("anything", &doc! {}).await.unwrap_err();

    assert!(matches!(err, RpcError::Unavailable(_)), "got {err:?}");
    let message = err.to_string();
    assert!(message.contains("SomeService"), "{message}");
    assert!(message.contains("*"), "{message}");
    assert!(message.contains("Test"), "{message}");
}

#[tokio::test]
async fn handler_exception_reaches_the_caller_as_a_reply() {
    let store = MemoryStore::new();
    let (_handle, _port) = start_server(&store, 2100, vec![Arc::new(FailingService)]).await;

    let registry = open_registry(&store).await;
    wait_for("FailingService visible", || {
        registry.servers_for("FailingService", "*", "Test").is_ok()
    })
    .await;

    let client = ServiceClient::new(registry, pool(), "FailingService", "*", "Test");
    let reply = client.call("explode", &doc! {}).await.unwrap();

    let exception = reply.get_document("exception").unwrap();
    assert_eq!(exception.get_str("message").unwrap(), "Exception message");
}

#[tokio::test]
async fn slow_handler_hits_the_read_timeout() {
    let store = MemoryStore::new();
    let (_handle, _port) =
        start_server(&store, 2200, vec![Arc::new(EchoService::new("Test"))]).await;

    let registry = open_registry(&store).await;
    wait_for("EchoService visible", || {
        registry.servers_for("EchoService", "*", "Test").is_ok()
    })
    .await;

    let client = ServiceClient::new(
        registry,
        pool_with_read_timeout(Duration::from_secs(3)),
        "EchoService",
        "*",
        "Test",
    );
    let err = client.call("sleep", &doc! { "seconds": 3.5f64 }).await.unwrap_err();

    assert!(matches!(err, RpcError::ReadTimeout(_)), "got {err:?}");
    let message = err.to_string();
    assert!(message.contains("read"), "{message}");
    assert!(message.contains("3"), "{message}");
}
