// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The service registry: instance-record events in, locality-ordered
//! endpoint lookups out.

use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, info, warn};

use skynet_core::{instance_uuid, Endpoint, ServiceKey};
use skynet_store::cache::WILDCARD;
use skynet_store::{codec, CacheError, StoreConnector, TreeCache, Value};

use crate::index::{add_to_groups, remove_from_groups, ScoreGroup};
use crate::score::locality_score;

const ATTR_ADDR: &str = "addr";
const ATTR_NAME: &str = "name";
const ATTR_VERSION: &str = "version";
const ATTR_REGION: &str = "region";
const ATTR_REGISTERED: &str = "registered";

/// How instance records are laid out in the coordination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryLayout {
    /// One directory per UUID under `/instances`, one leaf per attribute.
    Instances,
    /// `/services/<name>/<version>/<region>/<host>/<port>` with a single
    /// JSON blob per instance, for backends without per-attribute nodes.
    Services,
}

impl RegistryLayout {
    fn root(self) -> &'static str {
        match self {
            RegistryLayout::Instances => "/instances",
            RegistryLayout::Services => "/services",
        }
    }
}

/// The registry has no endpoints for the requested tuple.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("service unavailable: {name} ({version}) in region {region}")]
pub struct ServiceUnavailable {
    pub name: String,
    pub version: String,
    pub region: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Unavailable(#[from] ServiceUnavailable),
}

/// A live, watched view of running service instances, indexed for
/// locality-ranked lookup. Cheap to clone; clones share one cache session.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    cache: TreeCache,
    layout: RegistryLayout,
    local_ip: Ipv4Addr,
    index: Mutex<BTreeMap<ServiceKey, Vec<ScoreGroup>>>,
    partials: Mutex<HashMap<String, Partial>>,
    removed_cbs: Mutex<HashMap<String, Vec<Box<dyn FnOnce() + Send>>>>,
    /// Non-literal hosts are resolved to IPv4 once and remembered.
    resolver: Mutex<HashMap<String, Option<Ipv4Addr>>>,
}

/// Per-UUID attribute stash, completed when the publish flag arrives.
#[derive(Default)]
struct Partial {
    addr: Option<String>,
    name: Option<String>,
    version: Option<String>,
    region: Option<String>,
    registered: bool,
    /// Set once the instance entered the index, so deletion can find it.
    indexed: Option<(ServiceKey, Endpoint)>,
}

impl ServiceRegistry {
    /// Connect, subscribe to instance-record events, and take the initial
    /// snapshot. Pre-existing instances are indexed before this returns.
    pub async fn open(
        connector: Arc<dyn StoreConnector>,
        local_ip: Ipv4Addr,
        layout: RegistryLayout,
    ) -> Result<Self, RegistryError> {
        let cache = TreeCache::open(connector, layout.root()).await?;
        let inner = Arc::new(Inner {
            cache,
            layout,
            local_ip,
            index: Mutex::new(BTreeMap::new()),
            partials: Mutex::new(HashMap::new()),
            removed_cbs: Mutex::new(HashMap::new()),
            resolver: Mutex::new(HashMap::new()),
        });

        let weak = Arc::downgrade(&inner);
        inner.cache.on_create(WILDCARD, node_event_handler(weak.clone()));
        inner.cache.on_update(WILDCARD, node_event_handler(weak.clone()));
        inner.cache.on_delete(WILDCARD, move |rel| {
            if let Some(inner) = weak.upgrade() {
                inner.node_deleted(rel);
            }
        });
        inner.cache.start().await?;

        Ok(Self { inner })
    }

    /// Publish an instance record. The `registered` flag goes in last: all
    /// other attributes are readable before the instance becomes visible.
    pub async fn register(
        &self,
        name: &str,
        version: &str,
        region: &str,
        host: &str,
        port: u16,
    ) -> Result<(), RegistryError> {
        let cache = &self.inner.cache;
        let endpoint = Endpoint::new(host, port);
        info!(service = name, version, region, endpoint = %endpoint, "registering service");

        match self.inner.layout {
            RegistryLayout::Instances => {
                let uuid = instance_uuid(host, port, std::process::id(), name, version);
                let attr = |a: &str| format!("{}/{}", uuid, a);
                cache.put_ephemeral(&attr(ATTR_ADDR), &Value::str(endpoint.to_string())).await?;
                cache.put_ephemeral(&attr(ATTR_NAME), &Value::str(name)).await?;
                cache.put_ephemeral(&attr(ATTR_VERSION), &Value::str(version)).await?;
                cache.put_ephemeral(&attr(ATTR_REGION), &Value::str(region)).await?;
                cache.put_ephemeral(&attr(ATTR_REGISTERED), &Value::Bool(true)).await?;
            }
            RegistryLayout::Services => {
                let key = services_path(name, version, region, host, port);
                let blob = Value::Map(vec![
                    (Value::str(ATTR_NAME), Value::str(name)),
                    (Value::str(ATTR_VERSION), Value::str(version)),
                    (Value::str(ATTR_REGION), Value::str(region)),
                    (Value::str(ATTR_ADDR), Value::str(endpoint.to_string())),
                    (Value::str(ATTR_REGISTERED), Value::Bool(true)),
                ]);
                cache.put_ephemeral(&key, &blob).await?;
            }
        }
        Ok(())
    }

    /// Remove an instance record. The local index entry goes synchronously
    /// (a graceful leave does not fire removal callbacks); remote
    /// consumers observe the deletions through their own watches.
    pub async fn deregister(
        &self,
        name: &str,
        version: &str,
        region: &str,
        host: &str,
        port: u16,
    ) -> Result<(), RegistryError> {
        let endpoint = Endpoint::new(host, port);
        let key = ServiceKey::new(name, version, region);
        info!(service = %key, endpoint = %endpoint, "deregistering service");
        self.inner.remove_server(&key, &endpoint, false);

        let cache = &self.inner.cache;
        match self.inner.layout {
            RegistryLayout::Instances => {
                let uuid = instance_uuid(host, port, std::process::id(), name, version);
                for attr in [ATTR_REGISTERED, ATTR_ADDR, ATTR_NAME, ATTR_VERSION, ATTR_REGION] {
                    cache.delete(&format!("{}/{}", uuid, attr), false).await?;
                }
                cache.delete(&uuid, false).await?;
            }
            RegistryLayout::Services => {
                cache.delete(&services_path(name, version, region, host, port), true).await?;
            }
        }
        Ok(())
    }

    /// Best endpoints for a tuple: the members of the highest-scoring
    /// group. A version of `"*"` resolves to the highest integer version
    /// observed for `(name, region)`.
    pub fn servers_for(
        &self,
        name: &str,
        version: &str,
        region: &str,
    ) -> Result<Vec<Endpoint>, ServiceUnavailable> {
        let index = self.inner.index.lock();

        let resolved = if version == "*" {
            match highest_version(&index, name, region) {
                Some(v) => v,
                None => return Err(unavailable(name, version, region)),
            }
        } else {
            version.to_string()
        };

        let key = ServiceKey::new(name, resolved.clone(), region);
        match index.get(&key).and_then(|groups| groups.first()) {
            Some(group) if !group.endpoints.is_empty() => Ok(group.endpoints.clone()),
            _ => Err(unavailable(name, &resolved, region)),
        }
    }

    /// Uniform random selection among [`servers_for`](Self::servers_for).
    pub fn server_for(
        &self,
        name: &str,
        version: &str,
        region: &str,
    ) -> Result<Endpoint, ServiceUnavailable> {
        let servers = self.servers_for(name, version, region)?;
        servers
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| unavailable(name, version, region))
    }

    /// One-shot callback for when the store observes `endpoint` vanishing
    /// (ephemeral deletion, not a graceful deregister from this process).
    pub fn on_server_removed(&self, endpoint: &Endpoint, callback: impl FnOnce() + Send + 'static) {
        self.inner
            .removed_cbs
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push(Box::new(callback));
    }

    /// Release the store session and stop watching.
    pub async fn close(&self) {
        self.inner.cache.close().await;
    }

    #[cfg(test)]
    fn groups(&self, key: &ServiceKey) -> Vec<ScoreGroup> {
        self.inner.index.lock().get(key).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    fn key_count(&self) -> usize {
        self.inner.index.lock().len()
    }
}

fn node_event_handler(weak: Weak<Inner>) -> impl Fn(&str, &Value, i64) + Send + Sync {
    move |rel, value, _version| {
        if let Some(inner) = weak.upgrade() {
            inner.node_event(rel, value);
        }
    }
}

impl Inner {
    /// Stash an observed attribute; when the publish flag is set and the
    /// record is complete, the instance enters the index.
    fn node_event(&self, rel: &str, value: &Value) {
        let ready = match self.layout {
            RegistryLayout::Instances => {
                let Some((uuid, attr)) = split_attr(rel) else {
                    return;
                };
                let mut partials = self.partials.lock();
                let partial = partials.entry(uuid.to_string()).or_default();
                match attr {
                    ATTR_ADDR => partial.addr = Some(attr_text(value)),
                    ATTR_NAME => partial.name = Some(attr_text(value)),
                    ATTR_VERSION => partial.version = Some(attr_text(value)),
                    ATTR_REGION => partial.region = Some(attr_text(value)),
                    ATTR_REGISTERED => partial.registered = value.as_bool() == Some(true),
                    other => {
                        debug!(uuid, attr = other, "ignoring unknown instance attribute");
                    }
                }
                partial.take_ready()
            }
            RegistryLayout::Services => services_entry(rel),
        };

        if let Some((key, endpoint)) = ready {
            self.add_server(key, endpoint);
        }
    }

    fn node_deleted(&self, rel: &str) {
        match self.layout {
            RegistryLayout::Instances => {
                let Some((uuid, attr)) = split_attr(rel) else {
                    return;
                };
                if attr != ATTR_REGISTERED {
                    return;
                }
                let evicted = self.partials.lock().remove(uuid);
                if let Some(Partial { indexed: Some((key, endpoint)), .. }) = evicted {
                    self.remove_server(&key, &endpoint, true);
                }
            }
            RegistryLayout::Services => {
                if let Some((key, endpoint)) = services_entry(rel) {
                    self.remove_server(&key, &endpoint, true);
                }
            }
        }
    }

    fn add_server(&self, key: ServiceKey, endpoint: Endpoint) {
        let score = self.score_endpoint(&endpoint.host);
        let mut index = self.index.lock();
        let groups = index.entry(key.clone()).or_default();
        add_to_groups(groups, score, endpoint.clone());
        drop(index);
        info!(service = %key, endpoint = %endpoint, score, "server added");
    }

    fn remove_server(&self, key: &ServiceKey, endpoint: &Endpoint, notify: bool) {
        let removed = {
            let mut index = self.index.lock();
            match index.get_mut(key) {
                Some(groups) => {
                    let removed = remove_from_groups(groups, endpoint);
                    // A key with zero endpoints is removed, not retained.
                    if groups.is_empty() {
                        index.remove(key);
                    }
                    removed
                }
                None => false,
            }
        };
        if !removed {
            return;
        }
        info!(service = %key, endpoint = %endpoint, notified = notify, "server removed");
        if notify {
            let callbacks = self.removed_cbs.lock().remove(&endpoint.to_string());
            for callback in callbacks.unwrap_or_default() {
                callback();
            }
        }
    }

    fn score_endpoint(&self, host: &str) -> u8 {
        match self.resolve(host) {
            Some(ip) => locality_score(self.local_ip, ip),
            None => 0,
        }
    }

    fn resolve(&self, host: &str) -> Option<Ipv4Addr> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Some(ip);
        }
        let mut cache = self.resolver.lock();
        if let Some(cached) = cache.get(host) {
            return *cached;
        }
        let resolved = (host, 0u16).to_socket_addrs().ok().and_then(|mut addrs| {
            addrs.find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
        });
        if resolved.is_none() {
            warn!(host, "could not resolve endpoint host to IPv4; scoring 0");
        }
        cache.insert(host.to_string(), resolved);
        resolved
    }
}

impl Partial {
    /// The (key, endpoint) pair exactly once, when the record completes.
    fn take_ready(&mut self) -> Option<(ServiceKey, Endpoint)> {
        if !self.registered || self.indexed.is_some() {
            return None;
        }
        let (addr, name, version, region) = (
            self.addr.as_deref()?,
            self.name.as_deref()?,
            self.version.as_deref()?,
            self.region.as_deref()?,
        );
        let endpoint: Endpoint = match addr.parse() {
            Ok(ep) => ep,
            Err(e) => {
                warn!(addr, error = %e, "instance published an unparseable addr");
                return None;
            }
        };
        let key = ServiceKey::new(name, version, region);
        self.indexed = Some((key.clone(), endpoint.clone()));
        Some((key, endpoint))
    }
}

/// `"<uuid>/<attr>"` split; deeper or shallower paths are not attributes.
fn split_attr(rel: &str) -> Option<(&str, &str)> {
    let (uuid, attr) = rel.split_once('/')?;
    if attr.contains('/') || uuid.is_empty() || attr.is_empty() {
        return None;
    }
    Some((uuid, attr))
}

/// `"<name>/<version>/<region>/<host>/<port>"` for the services layout.
fn services_entry(rel: &str) -> Option<(ServiceKey, Endpoint)> {
    let parts: Vec<&str> = rel.split('/').collect();
    let &[name, version, region, host, port] = parts.as_slice() else {
        return None;
    };
    let port = port.parse::<u16>().ok()?;
    Some((ServiceKey::new(name, version, region), Endpoint::new(host, port)))
}

fn services_path(name: &str, version: &str, region: &str, host: &str, port: u16) -> String {
    format!("{}/{}/{}/{}/{}", name, version, region, host, port)
}

/// Attribute values come back from the codec typed; the registry wants
/// their original text ("1" stays "1" whether it decoded as Int or Str).
fn attr_text(value: &Value) -> String {
    codec::encode(value).unwrap_or_default()
}

fn highest_version(
    index: &BTreeMap<ServiceKey, Vec<ScoreGroup>>,
    name: &str,
    region: &str,
) -> Option<String> {
    index
        .keys()
        .filter(|k| k.name == name && k.region == region)
        .filter_map(|k| k.version.parse::<i64>().ok())
        .max()
        .map(|v| v.to_string())
}

fn unavailable(name: &str, version: &str, region: &str) -> ServiceUnavailable {
    ServiceUnavailable {
        name: name.to_string(),
        version: version.to_string(),
        region: region.to_string(),
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
