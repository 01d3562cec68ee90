// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination-store adapter interface.
//!
//! The transport itself (ZooKeeper, Doozer) lives outside this workspace;
//! everything here is written against these traits. Adapters are expected
//! to retry their own transient failures internally, so callers only see
//! the distinguished conditions below.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Node metadata returned alongside reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    /// Data version, bumped on every `set`.
    pub version: i64,
    pub num_children: usize,
    /// Ephemeral nodes have no children and vanish with their creator's
    /// session.
    pub ephemeral: bool,
}

/// Session events delivered to the single watcher sink.
///
/// Watches are one-shot: after any event for a path, the observer must
/// re-issue a watching read to keep observing that node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ChangedValue(String),
    ChangedChildren(String),
    Created(String),
    Deleted(String),
    SessionExpired,
    Disconnected,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no node: {0}")]
    NoNode(String),

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("ephemeral nodes cannot have children: {0}")]
    EphemeralParent(String),

    #[error("session expired")]
    SessionExpired,

    #[error("store connection failed: {0}")]
    Connection(String),
}

/// One live session against the coordination store.
///
/// All paths are absolute, `'/'`-separated. Reads take a `watch` flag that
/// arms a one-shot watch on the node before returning.
#[async_trait]
pub trait StoreSession: Send + Sync {
    async fn create(&self, path: &str, data: &[u8], ephemeral: bool) -> Result<(), StoreError>;

    async fn set(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Single-node read. `Ok(None)` is the distinguished "missing" result.
    async fn get(&self, path: &str, watch: bool)
        -> Result<Option<(Vec<u8>, NodeStat)>, StoreError>;

    async fn children(&self, path: &str, watch: bool) -> Result<Vec<String>, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// End the session, releasing its ephemeral nodes.
    async fn close(&self);
}

/// Opens sessions. A lost session cannot be revived; the consumer connects
/// again and re-bootstraps.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn StoreSession>, mpsc::UnboundedReceiver<StoreEvent>), StoreError>;
}
