// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watched hierarchical store cache.
//!
//! Mirrors a configured subtree of the coordination store, keeps one-shot
//! watches armed across every event, and fans out created/updated/deleted
//! callbacks to subscribers. All keys in the public API are relative to
//! the configured root.

use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::adapter::{StoreConnector, StoreError, StoreEvent, StoreSession};
use crate::codec::{self, Value};
use crate::paths;

/// Wildcard pattern matching every path.
pub const WILDCARD: &str = "*";

const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

type NodeCallback = Arc<dyn Fn(&str, &Value, i64) + Send + Sync>;
type GoneCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] codec::CodecError),

    #[error("cache is closed")]
    Closed,
}

/// A mirrored subtree of the coordination store.
///
/// `open` connects, `on_*` register subscribers, `start` takes the initial
/// snapshot and begins watching. Registration before `start` guarantees a
/// subscriber also sees the nodes that already existed.
pub struct TreeCache {
    shared: Arc<Shared>,
}

struct Shared {
    connector: Arc<dyn StoreConnector>,
    root: String,
    session: Mutex<Option<Arc<dyn StoreSession>>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<StoreEvent>>>,
    state: Mutex<CacheState>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct CacheState {
    /// Remembered child list per watched node, for ChangedChildren diffs.
    children: HashMap<String, BTreeSet<String>>,
    create_subs: Vec<(String, NodeCallback)>,
    update_subs: Vec<(String, NodeCallback)>,
    delete_subs: Vec<(String, GoneCallback)>,
}

impl TreeCache {
    /// Connect a session for the subtree rooted at `root` (absolute path).
    pub async fn open(
        connector: Arc<dyn StoreConnector>,
        root: impl Into<String>,
    ) -> Result<Self, CacheError> {
        let root = normalize_root(root.into());
        let (session, events) = connector.connect().await?;
        Ok(Self {
            shared: Arc::new(Shared {
                connector,
                root,
                session: Mutex::new(Some(session)),
                events: Mutex::new(Some(events)),
                state: Mutex::new(CacheState::default()),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Take the initial snapshot and start the watcher task.
    ///
    /// Creates the root if absent (non-ephemeral), walks the subtree depth
    /// first with watches installed, and fires `on_create` for every node
    /// that already has a value.
    pub async fn start(&self) -> Result<(), CacheError> {
        let session = self.shared.current_session()?;
        ensure_root(&session, &self.shared.root).await?;
        bootstrap(&self.shared, &session).await?;

        let rx = self
            .shared
            .events
            .lock()
            .take()
            .ok_or(CacheError::Closed)?;
        tokio::spawn(run_events(Arc::clone(&self.shared), rx));
        Ok(())
    }

    /// Single-node read. `None` for a missing node or an empty value.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let session = self.shared.current_session()?;
        let abs = paths::join(&self.shared.root, key);
        match session.get(&abs, false).await? {
            Some((data, _)) if !data.is_empty() => Ok(Some(decode_bytes(&data))),
            _ => Ok(None),
        }
    }

    /// Write a value, creating any missing ancestors with empty values.
    pub async fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.put_node(key, value, false).await
    }

    /// Like [`put`](Self::put), but the leaf dies with this session.
    pub async fn put_ephemeral(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.put_node(key, value, true).await
    }

    async fn put_node(&self, key: &str, value: &Value, ephemeral: bool) -> Result<(), CacheError> {
        let session = self.shared.current_session()?;
        let abs = paths::join(&self.shared.root, key);
        let bytes = codec::encode(value)?.into_bytes();

        let mut missing = Vec::new();
        for ancestor in paths::ancestors_below(&abs, &self.shared.root) {
            if session.exists(ancestor).await? {
                break;
            }
            missing.push(ancestor.to_string());
        }
        for ancestor in missing.iter().rev() {
            match session.create(ancestor, b"", false).await {
                Ok(()) | Err(StoreError::NodeExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        match session.create(&abs, &bytes, ephemeral).await {
            Ok(()) => Ok(()),
            Err(StoreError::NodeExists(_)) => Ok(session.set(&abs, &bytes).await?),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the leaf; with `remove_empty_parents`, walk ancestors removing
    /// each that has no value and no children.
    pub async fn delete(&self, key: &str, remove_empty_parents: bool) -> Result<(), CacheError> {
        let session = self.shared.current_session()?;
        let abs = paths::join(&self.shared.root, key);
        match session.delete(&abs).await {
            Ok(()) | Err(StoreError::NoNode(_)) => {}
            Err(e) => return Err(e.into()),
        }

        if remove_empty_parents {
            for ancestor in paths::ancestors_below(&abs, &self.shared.root) {
                let empty_value = match session.get(ancestor, false).await? {
                    Some((data, _)) => data.is_empty(),
                    None => break,
                };
                let no_children = match session.children(ancestor, false).await {
                    Ok(kids) => kids.is_empty(),
                    Err(StoreError::NoNode(_)) => break,
                    Err(e) => return Err(e.into()),
                };
                if !(empty_value && no_children) {
                    break;
                }
                match session.delete(ancestor).await {
                    Ok(()) | Err(StoreError::NoNode(_)) | Err(StoreError::NotEmpty(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Visit every node under `subpath` depth first, skipping intermediate
    /// nodes whose value is empty. Paths passed to the visitor are relative
    /// to the cache root.
    pub async fn each_pair(
        &self,
        subpath: &str,
        mut visit: impl FnMut(&str, &Value),
    ) -> Result<(), CacheError> {
        let session = self.shared.current_session()?;
        let start = paths::join(&self.shared.root, subpath);
        let mut stack = vec![start];
        while let Some(path) = stack.pop() {
            let Some((data, stat)) = session.get(&path, false).await? else {
                continue;
            };
            if !data.is_empty() {
                if let Some(rel) = paths::relative(&self.shared.root, &path) {
                    visit(rel, &decode_bytes(&data));
                }
            }
            if !stat.ephemeral {
                match session.children(&path, false).await {
                    Ok(kids) => {
                        // Reverse so the stack pops in lexicographic order.
                        for kid in kids.into_iter().rev() {
                            stack.push(paths::join(&path, &kid));
                        }
                    }
                    Err(StoreError::NoNode(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Subscribe to node creations. `pattern` is an exact relative path or
    /// the `"*"` wildcard. Callback args: (relative path, value, version).
    pub fn on_create(
        &self,
        pattern: impl Into<String>,
        callback: impl Fn(&str, &Value, i64) + Send + Sync + 'static,
    ) {
        self.shared.state.lock().create_subs.push((pattern.into(), Arc::new(callback)));
    }

    /// Subscribe to value updates.
    pub fn on_update(
        &self,
        pattern: impl Into<String>,
        callback: impl Fn(&str, &Value, i64) + Send + Sync + 'static,
    ) {
        self.shared.state.lock().update_subs.push((pattern.into(), Arc::new(callback)));
    }

    /// Subscribe to node deletions. Callback arg: relative path.
    pub fn on_delete(
        &self,
        pattern: impl Into<String>,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) {
        self.shared.state.lock().delete_subs.push((pattern.into(), Arc::new(callback)));
    }

    /// Release the session and stop all callbacks.
    pub async fn close(&self) {
        self.shared.cancel.cancel();
        let session = self.shared.session.lock().take();
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// The absolute root this cache mirrors.
    pub fn root(&self) -> &str {
        &self.shared.root
    }
}

impl Shared {
    fn current_session(&self) -> Result<Arc<dyn StoreSession>, CacheError> {
        if self.cancel.is_cancelled() {
            return Err(CacheError::Closed);
        }
        self.session.lock().clone().ok_or(CacheError::Closed)
    }

    fn fire_node(&self, subs: Sub, rel: &str, value: &Value, version: i64) {
        let callbacks: Vec<NodeCallback> = {
            let state = self.state.lock();
            let table = match subs {
                Sub::Create => &state.create_subs,
                Sub::Update => &state.update_subs,
            };
            matching(table, rel)
        };
        for cb in callbacks {
            invoke(rel, || cb(rel, value, version));
        }
    }

    fn fire_delete(&self, rel: &str) {
        let callbacks: Vec<GoneCallback> = {
            let state = self.state.lock();
            matching(&state.delete_subs, rel)
        };
        for cb in callbacks {
            invoke(rel, || cb(rel));
        }
    }
}

#[derive(Clone, Copy)]
enum Sub {
    Create,
    Update,
}

/// Matching callbacks in invocation order: specific subscriptions first,
/// then wildcards, each in registration order. A subscriber registered
/// under both patterns is called once per subscription.
fn matching<C: Clone>(table: &[(String, C)], rel: &str) -> Vec<C> {
    let specific = table.iter().filter(|(p, _)| p == rel).map(|(_, c)| c.clone());
    let wild = table.iter().filter(|(p, _)| p == WILDCARD).map(|(_, c)| c.clone());
    specific.chain(wild).collect()
}

/// Subscriber exceptions are caught and logged; they never stop the
/// watcher loop.
fn invoke(rel: &str, f: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(path = rel, "subscriber callback panicked");
    }
}

fn decode_bytes(data: &[u8]) -> Value {
    codec::decode(&String::from_utf8_lossy(data))
}

fn normalize_root(root: String) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

async fn ensure_root(session: &Arc<dyn StoreSession>, root: &str) -> Result<(), CacheError> {
    let mut to_create = Vec::new();
    let mut current = root.to_string();
    loop {
        if current == "/" || session.exists(&current).await? {
            break;
        }
        to_create.push(current.clone());
        match paths::parent(&current) {
            Some(p) => current = p.to_string(),
            None => break,
        }
    }
    for path in to_create.iter().rev() {
        match session.create(path, b"", false).await {
            Ok(()) | Err(StoreError::NodeExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Depth-first snapshot of the whole subtree with watches installed.
async fn bootstrap(shared: &Arc<Shared>, session: &Arc<dyn StoreSession>) -> Result<(), CacheError> {
    shared.state.lock().children.clear();
    subscribe_subtree(shared, session, shared.root.clone()).await
}

/// Walk `start` and everything below it: arm a data watch per node, fire
/// `on_create` for non-empty values, and remember+watch child lists so
/// later ChangedChildren events can be diffed. Ephemeral nodes get no
/// child read.
async fn subscribe_subtree(
    shared: &Arc<Shared>,
    session: &Arc<dyn StoreSession>,
    start: String,
) -> Result<(), CacheError> {
    let mut stack = vec![start];
    while let Some(path) = stack.pop() {
        let Some((data, stat)) = session.get(&path, true).await? else {
            continue;
        };
        if !data.is_empty() {
            if let Some(rel) = paths::relative(&shared.root, &path) {
                if !rel.is_empty() {
                    shared.fire_node(Sub::Create, rel, &decode_bytes(&data), stat.version);
                }
            }
        }
        if stat.ephemeral {
            continue;
        }
        let kids = match session.children(&path, true).await {
            Ok(kids) => kids,
            Err(StoreError::NoNode(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        let kid_set: BTreeSet<String> = kids.iter().cloned().collect();
        shared.state.lock().children.insert(path.clone(), kid_set);
        for kid in kids.into_iter().rev() {
            stack.push(paths::join(&path, &kid));
        }
    }
    Ok(())
}

/// Watcher loop: every store event re-arms the reads it consumed and fans
/// out subscriber callbacks. Runs until close or session loss.
async fn run_events(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<StoreEvent>) {
    loop {
        let event = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            ev = rx.recv() => ev,
        };
        let Some(event) = event else {
            warn!("store event channel closed; treating as disconnect");
            return;
        };

        let session = match shared.current_session() {
            Ok(s) => s,
            Err(_) => return,
        };

        match event {
            StoreEvent::ChangedValue(path) => handle_changed_value(&shared, &session, &path).await,
            StoreEvent::ChangedChildren(path) => {
                handle_changed_children(&shared, &session, &path).await
            }
            StoreEvent::Deleted(path) => {
                shared.state.lock().children.remove(&path);
                if let Some(rel) = paths::relative(&shared.root, &path) {
                    shared.fire_delete(rel);
                }
            }
            // A re-appearance is covered by the parent's ChangedChildren.
            StoreEvent::Created(_) => {}
            StoreEvent::SessionExpired => {
                warn!(root = %shared.root, "store session expired; re-bootstrapping");
                // Re-bootstrap on a fresh task so it is not serialized
                // behind this dying watcher.
                tokio::spawn(resession(Arc::clone(&shared)));
                return;
            }
            StoreEvent::Disconnected => {
                warn!(root = %shared.root, "store disconnected; adapter will resume watches");
            }
        }
    }
}

async fn handle_changed_value(shared: &Arc<Shared>, session: &Arc<dyn StoreSession>, path: &str) {
    match session.get(path, true).await {
        Ok(Some((data, stat))) => {
            if data.is_empty() {
                return;
            }
            if let Some(rel) = paths::relative(&shared.root, path) {
                if !rel.is_empty() {
                    shared.fire_node(Sub::Update, rel, &decode_bytes(&data), stat.version);
                }
            }
        }
        Ok(None) | Err(StoreError::NoNode(_)) => {}
        Err(e) => warn!(path, error = %e, "re-read after value change failed"),
    }
}

async fn handle_changed_children(
    shared: &Arc<Shared>,
    session: &Arc<dyn StoreSession>,
    path: &str,
) {
    let kids = match session.children(path, true).await {
        Ok(kids) => kids,
        Err(StoreError::NoNode(_)) => {
            debug!(path, "node vanished before child re-read");
            return;
        }
        Err(e) => {
            warn!(path, error = %e, "re-read after child change failed");
            return;
        }
    };
    let new_set: BTreeSet<String> = kids.iter().cloned().collect();
    let added: Vec<String> = {
        let mut state = shared.state.lock();
        let old = state.children.insert(path.to_string(), new_set.clone());
        match old {
            // Deleted children are reported through their own Deleted event.
            Some(old) => new_set.difference(&old).cloned().collect(),
            None => new_set.into_iter().collect(),
        }
    };
    for kid in added {
        let kid_abs = paths::join(path, &kid);
        if let Err(e) = subscribe_subtree(shared, session, kid_abs.clone()).await {
            warn!(path = %kid_abs, error = %e, "failed to subscribe new subtree");
        }
    }
}

/// Open a new session and repeat the initial snapshot. Subscribers remain
/// registered; only the mirrored tree state is rebuilt.
///
/// Returns a boxed future (rather than being an `async fn`) so its opaque
/// return type doesn't form a cycle with `run_events`'s opaque type, since
/// each spawns the other.
fn resession(shared: Arc<Shared>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        loop {
            if shared.cancel.is_cancelled() {
                return;
            }
            match shared.connector.connect().await {
                Ok((session, rx)) => {
                    *shared.session.lock() = Some(Arc::clone(&session));
                    match async {
                        ensure_root(&session, &shared.root).await?;
                        bootstrap(&shared, &session).await
                    }
                    .await
                    {
                        Ok(()) => {
                            debug!(root = %shared.root, "session re-established");
                            tokio::spawn(run_events(shared, rx));
                            return;
                        }
                        Err(e) => {
                            warn!(error = %e, "re-bootstrap failed; retrying");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "store reconnect failed; retrying");
                }
            }
            tokio::time::sleep(RECONNECT_INTERVAL).await;
        }
    })
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
