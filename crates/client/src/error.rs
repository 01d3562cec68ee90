// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side RPC error taxonomy.

use std::time::Duration;

use thiserror::Error;

use skynet_core::Endpoint;
use skynet_registry::ServiceUnavailable;
use skynet_wire::ProtocolError;

#[derive(Debug, Error)]
pub enum RpcError {
    /// TCP dial exhausted its retries. Triggers endpoint failover.
    #[error("connection to {endpoint} failed: {source}")]
    ConnectionFailure {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// A framed read exceeded the configured read timeout.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// Framing error, sequence mismatch, or malformed handshake.
    /// The connection is terminal.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Non-empty `error` in a response header from the peer.
    #[error("skynet error from peer: {0}")]
    Skynet(String),

    /// Non-empty `error` in a response body from the peer.
    #[error("service error from peer: {0}")]
    Service(String),

    #[error(transparent)]
    Unavailable(#[from] ServiceUnavailable),

    /// The peer's handshake said it is not accepting clients; the endpoint
    /// must be re-resolved from the registry.
    #[error("endpoint {0} is not accepting clients")]
    NotRegistered(Endpoint),

    #[error("pool borrow timed out after {timeout:?} for {endpoint}")]
    BorrowTimeout { timeout: Duration, endpoint: Endpoint },

    #[error("connection pool closed")]
    PoolClosed,
}

impl RpcError {
    /// Whether this failure is rooted in ECONNREFUSED (nothing listening),
    /// which makes trying a different endpoint worthwhile.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            RpcError::ConnectionFailure { source, .. } => {
                source.kind() == std::io::ErrorKind::ConnectionRefused
            }
            _ => false,
        }
    }

    /// Transport-level failures where the remote may never have seen (or
    /// finished) the request, as opposed to definitive peer answers.
    pub(crate) fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::ConnectionFailure { .. }
                | RpcError::ReadTimeout(_)
                | RpcError::Protocol(ProtocolError::Io(_))
                | RpcError::Protocol(ProtocolError::ShortRead)
        )
    }
}
