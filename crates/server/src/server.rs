// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bind, accept, publish, shut down.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use skynet_core::{instance_uuid, InstanceRecord};
use skynet_registry::{RegistryError, ServiceRegistry};

use crate::conn::{self, ServiceMap};
use crate::service::{self, SkynetService};

/// How far past the configured port the bind probes on "address in use".
const PORT_PROBE_RANGE: u16 = 999;

#[derive(Debug, Error)]
pub enum ServerError {
    /// A registered object does not satisfy the service contract.
    #[error("invalid service: {0}")]
    InvalidService(String),

    #[error("no free port in {host}:{start}..={end}")]
    NoFreePort { host: String, start: u16, end: u16 },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Applies to framed reads that follow another frame mid-request.
    pub read_timeout: Duration,
    /// How long shutdown waits for live connection handlers.
    pub drain_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { read_timeout: Duration::from_secs(60), drain_timeout: Duration::from_secs(5) }
    }
}

/// A bound, registered RPC server. Drive it with [`run`](Self::run);
/// stop it through its [`ServerHandle`].
pub struct Server {
    registry: ServiceRegistry,
    services: Arc<ServiceMap>,
    instances: Vec<InstanceRecord>,
    listener: TcpListener,
    addr: SocketAddr,
    host: String,
    options: ServerOptions,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("addr", &self.addr).field("host", &self.host).finish()
    }
}

impl Server {
    /// Listen at `(host, port_start)`, probing upward past taken ports,
    /// then publish every service at the bound address.
    pub async fn bind(
        host: &str,
        port_start: u16,
        registry: ServiceRegistry,
        services: Vec<Arc<dyn SkynetService>>,
        options: ServerOptions,
    ) -> Result<Self, ServerError> {
        let mut map: ServiceMap = HashMap::new();
        for svc in services {
            service::validate(svc.as_ref()).map_err(ServerError::InvalidService)?;
            let name = svc.service_name().to_string();
            if map.insert(name.clone(), svc).is_some() {
                return Err(ServerError::InvalidService(format!(
                    "duplicate service name {:?}",
                    name
                )));
            }
        }

        let (listener, addr) = probe_bind(host, port_start).await?;
        info!(%addr, services = map.len(), "server listening");

        let mut instances = Vec::with_capacity(map.len());
        for svc in map.values() {
            registry
                .register(
                    svc.service_name(),
                    svc.service_version(),
                    svc.service_region(),
                    host,
                    addr.port(),
                )
                .await?;
            instances.push(InstanceRecord {
                uuid: instance_uuid(
                    host,
                    addr.port(),
                    std::process::id(),
                    svc.service_name(),
                    svc.service_version(),
                ),
                name: svc.service_name().to_string(),
                version: svc.service_version().to_string(),
                region: svc.service_region().to_string(),
                ip: host.to_string(),
                port: addr.port(),
                max_port: port_start.saturating_add(PORT_PROBE_RANGE),
                registered: true,
            });
        }

        Ok(Self {
            registry,
            services: Arc::new(map),
            instances,
            listener,
            addr,
            host: host.to_string(),
            options,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The records this server published at bind.
    pub fn instances(&self) -> &[InstanceRecord] {
        &self.instances
    }

    /// A handle that outlives [`run`](Self::run) for shutting down.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            registry: self.registry.clone(),
            services: Arc::clone(&self.services),
            host: self.host.clone(),
            port: self.addr.port(),
            options: self.options.clone(),
            cancel: self.cancel.clone(),
            tracker: self.tracker.clone(),
        }
    }

    /// Accept loop: one task per connection, until shutdown. Handler
    /// failures are contained to their connection.
    pub async fn run(self) {
        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    self.tracker.spawn(conn::serve(
                        stream,
                        Arc::clone(&self.services),
                        self.options.clone(),
                        self.cancel.child_token(),
                    ));
                }
                Err(e) => error!(error = %e, "accept failed"),
            }
        }
        debug!(addr = %self.addr, "acceptor stopped");
    }
}

/// Controls a running server from outside its accept loop.
#[derive(Clone)]
pub struct ServerHandle {
    registry: ServiceRegistry,
    services: Arc<ServiceMap>,
    host: String,
    port: u16,
    options: ServerOptions,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl ServerHandle {
    /// Deregister every service, stop the acceptor, and drain connection
    /// handlers best-effort. Deregistration comes first so peers observe
    /// removal before the listener goes away.
    pub async fn shutdown(&self) {
        for svc in self.services.values() {
            if let Err(e) = self
                .registry
                .deregister(
                    svc.service_name(),
                    svc.service_version(),
                    svc.service_region(),
                    &self.host,
                    self.port,
                )
                .await
            {
                warn!(service = svc.service_name(), error = %e, "deregister failed");
            }
        }

        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(self.options.drain_timeout, self.tracker.wait()).await.is_err() {
            warn!("connection handlers did not drain within the timeout");
        }
    }
}

/// Try `port_start`, incrementing on "address in use" up to the probe
/// range, then fail.
async fn probe_bind(host: &str, port_start: u16) -> Result<(TcpListener, SocketAddr), ServerError> {
    let end = port_start.saturating_add(PORT_PROBE_RANGE);
    for port in port_start..=end {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                let addr = listener.local_addr()?;
                return Ok((listener, addr));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                debug!(host, port, "port taken; probing the next one");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ServerError::NoFreePort { host: host.to_string(), start: port_start, end })
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
