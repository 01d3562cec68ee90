// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! skynet-client: pooled RPC connections and the retrying service client.
//!
//! A [`Connection`] owns one TCP session through the Skynet handshake and
//! per-session sequence ordering. [`ConnectionPool`] keeps bounded LIFO
//! pools per endpoint. [`ServiceClient`] resolves endpoints through the
//! registry, borrows connections, and applies the failover/retry policy.

mod client;
mod connection;
mod error;
mod pool;

#[cfg(test)]
mod test_server;

pub use client::ServiceClient;
pub use connection::{CallRequest, ConnectOptions, Connection};
pub use error::RpcError;
pub use pool::{ConnectionPool, PoolOptions, PoolStats, PooledConn};
