// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-endpoint bounded connection pools.
//!
//! Borrowing is blocking with a timeout; waits past the warn threshold are
//! logged. Idle connections are reused LIFO and swept once they outlive
//! the idle timeout. A failed connection is discarded, never returned.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use skynet_core::{Clock, Endpoint, PoolSettings, SystemClock};

use crate::connection::{ConnectOptions, Connection};
use crate::error::RpcError;

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum live connections per endpoint.
    pub size: usize,
    pub borrow_timeout: Duration,
    pub warn_timeout: Duration,
    pub idle_timeout: Duration,
    pub connect: ConnectOptions,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from_settings(&PoolSettings::default(), ConnectOptions::default())
    }
}

impl PoolOptions {
    pub fn from_settings(settings: &PoolSettings, connect: ConnectOptions) -> Self {
        Self {
            size: settings.size,
            borrow_timeout: settings.borrow_timeout(),
            warn_timeout: settings.warn_timeout(),
            idle_timeout: settings.idle_timeout(),
            connect,
        }
    }
}

/// Counters for one endpoint's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_flight: usize,
}

/// Pools keyed on endpoint. Cheap to clone and share.
pub struct ConnectionPool<C: Clock = SystemClock> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Clock> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct PoolInner<C> {
    options: PoolOptions,
    clock: C,
    pools: Mutex<HashMap<Endpoint, Arc<EndpointPool>>>,
}

struct EndpointPool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConn>>,
}

struct IdleConn {
    conn: Connection,
    since: Instant,
}

impl ConnectionPool<SystemClock> {
    pub fn new(options: PoolOptions) -> Self {
        Self::with_clock(options, SystemClock)
    }
}

impl<C: Clock> ConnectionPool<C> {
    pub fn with_clock(options: PoolOptions, clock: C) -> Self {
        Self { inner: Arc::new(PoolInner { options, clock, pools: Mutex::new(HashMap::new()) }) }
    }

    /// Borrow a connection for `endpoint`, dialing a fresh one when no idle
    /// connection survives the sweep. Blocks while the pool is exhausted.
    pub async fn borrow(&self, endpoint: &Endpoint) -> Result<PooledConn<C>, RpcError> {
        let pool = self.endpoint_pool(endpoint);
        let options = &self.inner.options;

        let acquire = Arc::clone(&pool.semaphore).acquire_owned();
        let permit = match tokio::time::timeout(options.warn_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(RpcError::PoolClosed),
            Err(_) => {
                warn!(endpoint = %endpoint, waited = ?options.warn_timeout, "pool borrow is slow");
                let remaining = options.borrow_timeout.saturating_sub(options.warn_timeout);
                let acquire = Arc::clone(&pool.semaphore).acquire_owned();
                match tokio::time::timeout(remaining, acquire).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(RpcError::PoolClosed),
                    Err(_) => {
                        return Err(RpcError::BorrowTimeout {
                            timeout: options.borrow_timeout,
                            endpoint: endpoint.clone(),
                        })
                    }
                }
            }
        };

        let reused = {
            let mut idle = pool.idle.lock();
            let now = self.inner.clock.now();
            idle.retain(|entry| now.duration_since(entry.since) < options.idle_timeout);
            idle.pop()
        };

        let conn = match reused {
            Some(entry) => {
                debug!(endpoint = %endpoint, "reusing pooled connection");
                entry.conn
            }
            // The permit is held across the dial, so a failure still counts
            // against capacity until it returns; it is released on drop.
            None => Connection::connect(endpoint, &options.connect).await?,
        };

        Ok(PooledConn {
            conn: Some(conn),
            pool,
            clock: self.inner.clock.clone(),
            _permit: permit,
        })
    }

    /// Drop all idle connections for an endpoint and forget its pool.
    /// Called when the registry observes the endpoint disappearing.
    pub fn evict(&self, endpoint: &Endpoint) {
        if let Some(pool) = self.inner.pools.lock().remove(endpoint) {
            let dropped = pool.idle.lock().drain(..).count();
            debug!(endpoint = %endpoint, dropped, "evicted endpoint pool");
        }
    }

    pub fn stats(&self, endpoint: &Endpoint) -> PoolStats {
        match self.inner.pools.lock().get(endpoint) {
            Some(pool) => {
                let idle = pool.idle.lock().len();
                PoolStats {
                    idle,
                    in_flight: pool.capacity - pool.semaphore.available_permits(),
                }
            }
            None => PoolStats { idle: 0, in_flight: 0 },
        }
    }

    fn endpoint_pool(&self, endpoint: &Endpoint) -> Arc<EndpointPool> {
        let mut pools = self.inner.pools.lock();
        Arc::clone(pools.entry(endpoint.clone()).or_insert_with(|| {
            Arc::new(EndpointPool {
                capacity: self.inner.options.size,
                semaphore: Arc::new(Semaphore::new(self.inner.options.size)),
                idle: Mutex::new(Vec::new()),
            })
        }))
    }
}

/// A borrowed connection. Dropping it returns the connection to its pool;
/// [`discard`](Self::discard) closes it instead, freeing the slot for a
/// fresh dial.
pub struct PooledConn<C: Clock = SystemClock> {
    conn: Option<Connection>,
    pool: Arc<EndpointPool>,
    clock: C,
    _permit: OwnedSemaphorePermit,
}

impl<C: Clock> std::fmt::Debug for PooledConn<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn").field("conn", &self.conn).finish()
    }
}

impl<C: Clock> PooledConn<C> {
    /// Close the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl<C: Clock> Deref for PooledConn<C> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection already discarded"),
        }
    }
}

impl<C: Clock> DerefMut for PooledConn<C> {
    fn deref_mut(&mut self) -> &mut Connection {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection already discarded"),
        }
    }
}

impl<C: Clock> Drop for PooledConn<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().push(IdleConn { conn, since: self.clock.now() });
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
