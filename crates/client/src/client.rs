// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The service view: resolve, borrow, invoke, fail over.

use std::collections::HashSet;
use std::sync::Arc;

use bson::Document;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use skynet_core::Endpoint;
use skynet_registry::ServiceRegistry;

use crate::connection::{CallError, CallRequest, Phase};
use crate::error::RpcError;
use crate::pool::ConnectionPool;

/// Endpoint reselections (and fresh-connection resends) allowed per call.
const MAX_RETRIES: u32 = 3;

/// A client bound to one `(name, version, region)` tuple.
///
/// Method names are passed straight to [`call`](Self::call); there is no
/// per-method surface to keep in sync with the server.
#[derive(Clone)]
pub struct ServiceClient {
    registry: ServiceRegistry,
    pool: ConnectionPool,
    name: String,
    version: String,
    region: String,
    /// Endpoints with a registered removal hook, so each pool is evicted
    /// at most once per disappearance.
    hooked: Arc<Mutex<HashSet<Endpoint>>>,
}

impl ServiceClient {
    pub fn new(
        registry: ServiceRegistry,
        pool: ConnectionPool,
        name: impl Into<String>,
        version: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            pool,
            name: name.into(),
            version: version.into(),
            region: region.into(),
            hooked: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Invoke `method`. Not assumed idempotent: a failure after the request
    /// was sent is surfaced, since the server may have processed it.
    pub async fn call(&self, method: &str, params: &Document) -> Result<Document, RpcError> {
        self.invoke(method, params, false).await
    }

    /// Invoke a method the caller declares idempotent: failed reads are
    /// retried on a fresh connection.
    pub async fn call_idempotent(
        &self,
        method: &str,
        params: &Document,
    ) -> Result<Document, RpcError> {
        self.invoke(method, params, true).await
    }

    /// Serialize/deserialize convenience over [`call`](Self::call).
    pub async fn call_typed<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = bson::to_document(params).map_err(skynet_wire::ProtocolError::from)?;
        let reply = self.call(method, &params).await?;
        Ok(bson::from_document(reply).map_err(skynet_wire::ProtocolError::from)?)
    }

    async fn invoke(
        &self,
        method: &str,
        params: &Document,
        idempotent: bool,
    ) -> Result<Document, RpcError> {
        let request_id = Uuid::new_v4().to_string();
        let mut reselects = 0u32;
        let mut resends = 0u32;
        let mut retry_count = 0i32;

        loop {
            let endpoint = self.registry.server_for(&self.name, &self.version, &self.region)?;
            self.hook_removal(&endpoint);

            let mut conn = match self.pool.borrow(&endpoint).await {
                Ok(conn) => conn,
                Err(e)
                    if (e.is_connection_refused() || matches!(e, RpcError::NotRegistered(_)))
                        && reselects < MAX_RETRIES =>
                {
                    reselects += 1;
                    retry_count += 1;
                    warn!(endpoint = %endpoint, error = %e, "endpoint unreachable; reselecting");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let request = CallRequest {
                request_id: &request_id,
                service: &self.name,
                method,
                params,
                retry_count,
                idempotent,
            };
            match conn.call(&request).await {
                Ok(reply) => return Ok(reply),
                Err(CallError { phase, error }) => {
                    // Whatever went wrong, this connection's session state
                    // is unusable now.
                    conn.discard();
                    let retryable = match phase {
                        Phase::Write => error.is_transport(),
                        Phase::Read => error.is_transport() && idempotent,
                    };
                    if retryable && resends < MAX_RETRIES {
                        resends += 1;
                        retry_count += 1;
                        debug!(
                            endpoint = %endpoint,
                            method,
                            error = %error,
                            "resending on a fresh connection"
                        );
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Arrange for this endpoint's pool to be dropped when the registry
    /// observes it disappearing.
    fn hook_removal(&self, endpoint: &Endpoint) {
        let mut hooked = self.hooked.lock();
        if !hooked.insert(endpoint.clone()) {
            return;
        }
        let pool = self.pool.clone();
        let hooked_set = Arc::clone(&self.hooked);
        let key = endpoint.clone();
        let endpoint = endpoint.clone();
        self.registry.on_server_removed(&key, move || {
            pool.evict(&endpoint);
            hooked_set.lock().remove(&endpoint);
        });
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
