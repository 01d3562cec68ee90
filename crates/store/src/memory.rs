// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process loopback coordination store.
//!
//! Implements the full adapter contract against a shared in-memory tree:
//! versioned nodes, per-session ephemeral ownership, one-shot data and
//! child watches, and ordered per-session event delivery. Serves two
//! roles: the `memory` registry backend for single-process setups, and
//! the store every test suite in the workspace runs against.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::adapter::{NodeStat, StoreConnector, StoreError, StoreEvent, StoreSession};
use crate::paths;

/// Shared loopback store. Cloning shares the tree, so one `MemoryStore`
/// can serve several sessions in the same process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tree>>,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<u64, mpsc::UnboundedSender<StoreEvent>>,
    data_watches: HashMap<String, HashSet<u64>>,
    child_watches: HashMap<String, HashSet<u64>>,
    next_session_id: u64,
}

struct Node {
    data: Vec<u8>,
    version: i64,
    ephemeral: bool,
    owner: Option<u64>,
    children: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session directly (the connector trait does the same).
    pub fn session(&self) -> (Arc<MemorySession>, mpsc::UnboundedReceiver<StoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut tree = self.inner.lock();
            tree.next_session_id += 1;
            let id = tree.next_session_id;
            tree.sessions.insert(id, tx);
            tree.ensure_root();
            id
        };
        (Arc::new(MemorySession { store: self.clone(), id }), rx)
    }

    /// Live session ids, in creation order.
    pub fn session_ids(&self) -> Vec<u64> {
        let tree = self.inner.lock();
        let mut ids: Vec<u64> = tree.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Kill a session the way a lost heartbeat would: its ephemerals are
    /// deleted (notifying every other watcher) and the session's own sink
    /// receives `SessionExpired`.
    pub fn expire(&self, session_id: u64) {
        let mut tree = self.inner.lock();
        if let Some(tx) = tree.sessions.get(&session_id) {
            let _ = tx.send(StoreEvent::SessionExpired);
        }
        tree.end_session(session_id);
    }

    #[cfg(feature = "test-support")]
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn StoreSession>, mpsc::UnboundedReceiver<StoreEvent>), StoreError> {
        let (session, rx) = self.session();
        let session: Arc<dyn StoreSession> = session;
        Ok((session, rx))
    }
}

/// One session against a [`MemoryStore`].
pub struct MemorySession {
    store: MemoryStore,
    id: u64,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn create(&self, path: &str, data: &[u8], ephemeral: bool) -> Result<(), StoreError> {
        let mut tree = self.store.inner.lock();
        tree.check_session(self.id)?;
        tree.create(path, data, ephemeral, self.id)
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut tree = self.store.inner.lock();
        tree.check_session(self.id)?;
        let node = tree.nodes.get_mut(path).ok_or_else(|| StoreError::NoNode(path.into()))?;
        node.data = data.to_vec();
        node.version += 1;
        tree.fire_data(path, StoreEvent::ChangedValue(path.to_string()));
        Ok(())
    }

    async fn get(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<Option<(Vec<u8>, NodeStat)>, StoreError> {
        let mut tree = self.store.inner.lock();
        tree.check_session(self.id)?;
        let Some(node) = tree.nodes.get(path) else {
            return Ok(None);
        };
        let result = (
            node.data.clone(),
            NodeStat {
                version: node.version,
                num_children: node.children.len(),
                ephemeral: node.ephemeral,
            },
        );
        if watch {
            tree.data_watches.entry(path.to_string()).or_default().insert(self.id);
        }
        Ok(Some(result))
    }

    async fn children(&self, path: &str, watch: bool) -> Result<Vec<String>, StoreError> {
        let mut tree = self.store.inner.lock();
        tree.check_session(self.id)?;
        let node = tree.nodes.get(path).ok_or_else(|| StoreError::NoNode(path.into()))?;
        let kids: Vec<String> = node.children.iter().cloned().collect();
        if watch {
            tree.child_watches.entry(path.to_string()).or_default().insert(self.id);
        }
        Ok(kids)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut tree = self.store.inner.lock();
        tree.check_session(self.id)?;
        tree.delete(path)
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let mut tree = self.store.inner.lock();
        tree.check_session(self.id)?;
        Ok(tree.nodes.contains_key(path))
    }

    async fn close(&self) {
        let mut tree = self.store.inner.lock();
        debug!(session = self.id, "closing loopback store session");
        tree.end_session(self.id);
    }
}

impl Tree {
    fn ensure_root(&mut self) {
        self.nodes.entry("/".to_string()).or_insert_with(|| Node {
            data: Vec::new(),
            version: 0,
            ephemeral: false,
            owner: None,
            children: BTreeSet::new(),
        });
    }

    fn check_session(&self, id: u64) -> Result<(), StoreError> {
        if self.sessions.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::SessionExpired)
        }
    }

    fn create(
        &mut self,
        path: &str,
        data: &[u8],
        ephemeral: bool,
        owner: u64,
    ) -> Result<(), StoreError> {
        if self.nodes.contains_key(path) {
            return Err(StoreError::NodeExists(path.into()));
        }
        let parent_path =
            paths::parent(path).ok_or_else(|| StoreError::NoNode(path.into()))?.to_string();
        let parent =
            self.nodes.get_mut(&parent_path).ok_or(StoreError::NoNode(parent_path.clone()))?;
        if parent.ephemeral {
            return Err(StoreError::EphemeralParent(parent_path));
        }
        parent.children.insert(paths::basename(path).to_string());

        self.nodes.insert(
            path.to_string(),
            Node {
                data: data.to_vec(),
                version: 0,
                ephemeral,
                owner: ephemeral.then_some(owner),
                children: BTreeSet::new(),
            },
        );
        self.fire_children(&parent_path, StoreEvent::ChangedChildren(parent_path.clone()));
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), StoreError> {
        let node = self.nodes.get(path).ok_or_else(|| StoreError::NoNode(path.into()))?;
        if !node.children.is_empty() {
            return Err(StoreError::NotEmpty(path.into()));
        }
        self.nodes.remove(path);
        if let Some(parent_path) = paths::parent(path).map(str::to_string) {
            if let Some(parent) = self.nodes.get_mut(&parent_path) {
                parent.children.remove(paths::basename(path));
            }
            // A node watched for both data and children still yields one
            // Deleted event.
            let mut watchers = self.data_watches.remove(path).unwrap_or_default();
            watchers.extend(self.child_watches.remove(path).unwrap_or_default());
            self.send_all(watchers, StoreEvent::Deleted(path.to_string()));
            self.fire_children(&parent_path, StoreEvent::ChangedChildren(parent_path.clone()));
        }
        Ok(())
    }

    /// Deliver a one-shot data-watch event for `path` and clear the watch.
    fn fire_data(&mut self, path: &str, event: StoreEvent) {
        if let Some(watchers) = self.data_watches.remove(path) {
            self.send_all(watchers, event);
        }
    }

    fn fire_children(&mut self, path: &str, event: StoreEvent) {
        if let Some(watchers) = self.child_watches.remove(path) {
            self.send_all(watchers, event);
        }
    }

    fn send_all(&self, watchers: HashSet<u64>, event: StoreEvent) {
        for id in watchers {
            if let Some(tx) = self.sessions.get(&id) {
                let _ = tx.send(event.clone());
            }
        }
    }

    fn end_session(&mut self, id: u64) {
        if self.sessions.remove(&id).is_none() {
            return;
        }
        for watchers in self.data_watches.values_mut() {
            watchers.remove(&id);
        }
        for watchers in self.child_watches.values_mut() {
            watchers.remove(&id);
        }

        // Ephemeral nodes die with their creator's session; every other
        // watcher observes ordinary deletions.
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.owner == Some(id))
            .map(|(p, _)| p.clone())
            .collect();
        for path in owned {
            // Ephemeral nodes have no children, so this cannot fail on
            // NotEmpty; a NoNode here means a previous iteration removed it.
            let _ = self.delete(&path);
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
