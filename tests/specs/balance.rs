// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Selection specs: equal-score endpoints share load uniformly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Document};

use skynet_client::ServiceClient;
use skynet_server::{ServiceError, SkynetService};
use skynet_store::MemoryStore;

use super::prelude::*;

/// Echo-style service that identifies which instance answered.
struct TaggedService {
    tag: &'static str,
}

#[async_trait]
impl SkynetService for TaggedService {
    fn service_name(&self) -> &str {
        "EchoService"
    }

    fn service_version(&self) -> &str {
        "1"
    }

    fn service_region(&self) -> &str {
        "R"
    }

    async fn dispatch(
        &self,
        method: &str,
        _params: Document,
    ) -> Result<Option<Document>, ServiceError> {
        match method {
            "who" => Ok(Some(doc! { "tag": self.tag })),
            other => Err(ServiceError::unknown_method(self.service_name(), other)),
        }
    }
}

#[tokio::test]
async fn equal_score_endpoints_split_load_roughly_evenly() {
    let store = MemoryStore::new();
    let (_a, _port_a) =
        start_server(&store, 2000, vec![Arc::new(TaggedService { tag: "a" })]).await;
    let (_b, _port_b) =
        start_server(&store, 2001, vec![Arc::new(TaggedService { tag: "b" })]).await;

    let registry = open_registry(&store).await;
    wait_for("both endpoints visible", || {
        registry.servers_for("EchoService", "1", "R").map(|s| s.len()).unwrap_or(0) == 2
    })
    .await;

    let client = ServiceClient::new(registry, pool(), "EchoService", "*", "R");

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..1000 {
        let reply = client.call("who", &doc! {}).await.unwrap();
        *counts.entry(reply.get_str("tag").unwrap().to_string()).or_default() += 1;
    }

    let a = counts.get("a").copied().unwrap_or(0);
    let b = counts.get("b").copied().unwrap_or(0);
    assert_eq!(a + b, 1000);
    // Uniform selection: 50/50 within ±5%.
    assert!((450..=550).contains(&a), "selection skewed: a={a} b={b}");
}
