// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `skynet call` - invoke a method on a remote service.

use anyhow::{bail, Context, Result};
use bson::Document;

use skynet_client::{ConnectOptions, ConnectionPool, PoolOptions, ServiceClient};
use skynet_core::Config;

pub struct CallArgs {
    pub config: Config,
    pub service: String,
    pub method: String,
    pub params: Option<String>,
    pub version: String,
    pub region: Option<String>,
    pub idempotent: bool,
}

pub async fn run(args: CallArgs) -> Result<()> {
    let registry = super::open_registry(&args.config).await?;
    let pool = ConnectionPool::new(PoolOptions::from_settings(
        &args.config.registry.pool,
        ConnectOptions::default(),
    ));
    let region = args.region.unwrap_or_else(|| args.config.region.clone());

    let params = parse_params(args.params.as_deref())?;
    let client = ServiceClient::new(registry, pool, args.service, args.version, region);
    let reply = if args.idempotent {
        client.call_idempotent(&args.method, &params).await?
    } else {
        client.call(&args.method, &params).await?
    };

    println!("{}", reply);
    Ok(())
}

fn parse_params(text: Option<&str>) -> Result<Document> {
    let Some(text) = text else {
        return Ok(Document::new());
    };
    let json: serde_json::Value =
        serde_json::from_str(text).context("parameters must be a JSON object")?;
    if !json.is_object() {
        bail!("parameters must be a JSON object, got: {}", json);
    }
    bson::to_document(&json).context("converting parameters to BSON")
}
