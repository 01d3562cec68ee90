// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `skynet server` - run a pre-configured RPC server until shutdown.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use skynet_core::Config;
use skynet_server::{EchoService, Server, ServerOptions, SkynetService};

/// Start the server, publish its services, and block until ctrl-c.
pub async fn run(config: Config) -> Result<()> {
    let registry = super::open_registry(&config).await?;

    // Compiled language: services are linked into the binary rather than
    // loaded from source files at startup.
    info!(
        services_path = %config.services_path.display(),
        "serving compiled-in services; the services directory is not scanned"
    );
    let services: Vec<Arc<dyn SkynetService>> =
        vec![Arc::new(EchoService::new(config.region.clone()))];

    let host = config.local_ip().to_string();
    let server = Server::bind(
        &host,
        config.server_port,
        registry.clone(),
        services,
        ServerOptions::default(),
    )
    .await?;
    for instance in server.instances() {
        info!(
            service = %instance.name,
            version = %instance.version,
            region = %instance.region,
            endpoint = %instance.endpoint(),
            "service registered"
        );
    }

    let handle = server.handle();
    let acceptor = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await;
    registry.close().await;
    acceptor.await?;
    Ok(())
}
