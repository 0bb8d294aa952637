/*!
 * Remote registry mirror.
 *
 * A client-side cache of a peer's resource registry, keyed by UUID and
 * reconciled by polling the peer's `get_resources` surface. Because
 * the substrate is request/response only, the mirror is exactly as
 * fresh as its last successful `refresh()`; events can hint that an
 * early refresh is worthwhile but are never a source of truth.
 */
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use benchlink_core::config::RemoteConfig;
use benchlink_core::error::{Error, Result};
use benchlink_core::event::{EventFilter, SharedEventBus};
use benchlink_core::types::{PropertyMap, ResourceId, Value};
use benchlink_core::utils::with_timeout;

use crate::rpc::RpcClient;

/// A proxy handle for one resource on the peer.
///
/// Serves the snapshot captured at the last reconciliation and
/// forwards commands over the RPC substrate.
#[derive(Debug)]
pub struct RemoteResource {
    id: ResourceId,
    client: Arc<dyn RpcClient>,
    call_timeout: Duration,
    snapshot: RwLock<PropertyMap>,
}

impl RemoteResource {
    fn new(
        id: ResourceId,
        client: Arc<dyn RpcClient>,
        call_timeout: Duration,
        snapshot: PropertyMap,
    ) -> Self {
        Self {
            id,
            client,
            call_timeout,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// The peer-side resource UUID
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The property snapshot from the last reconciliation
    pub async fn properties(&self) -> PropertyMap {
        self.snapshot.read().await.clone()
    }

    /// Re-fetch this resource's snapshot from the peer
    pub async fn refresh(&self) -> Result<()> {
        let value = self
            .call(
                "get_resource",
                vec![Value::String(self.id.to_string())],
            )
            .await?;
        match value {
            Value::Object(snapshot) => {
                self.update_snapshot(snapshot).await;
                Ok(())
            }
            other => Err(Error::Serialization(format!(
                "expected a snapshot object, got {:?}",
                other
            ))),
        }
    }

    /// Ask the peer to load a driver onto this resource
    pub async fn load_driver(&self, descriptor: Option<&str>) -> Result<bool> {
        let mut params = vec![Value::String(self.id.to_string())];
        if let Some(descriptor) = descriptor {
            params.push(Value::String(descriptor.to_string()));
        }
        let value = self.call("load_driver", params).await?;
        value
            .as_bool()
            .ok_or_else(|| Error::Serialization("expected a boolean result".to_string()))
    }

    /// Ask the peer to unload this resource's driver
    pub async fn unload_driver(&self) -> Result<bool> {
        let value = self
            .call(
                "unload_driver",
                vec![Value::String(self.id.to_string())],
            )
            .await?;
        value
            .as_bool()
            .ok_or_else(|| Error::Serialization("expected a boolean result".to_string()))
    }

    /// Invoke a declared driver command on the peer
    pub async fn invoke(&self, command: &str, args: Vec<Value>) -> Result<Value> {
        let mut params = vec![
            Value::String(self.id.to_string()),
            Value::String(command.to_string()),
        ];
        params.extend(args);
        self.call("invoke", params).await
    }

    pub(crate) async fn update_snapshot(&self, snapshot: PropertyMap) {
        *self.snapshot.write().await = snapshot;
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        call_peer(&self.client, self.call_timeout, method, params).await
    }
}

struct ProxyInner {
    client: Arc<dyn RpcClient>,
    call_timeout: Duration,
    cache: RwLock<HashMap<ResourceId, Arc<RemoteResource>>>,
    degraded: AtomicBool,
    stale: AtomicBool,
}

/// A polled mirror of a peer's resource registry. Cheap to clone;
/// clones share one cache.
#[derive(Clone)]
pub struct RemoteRegistry {
    inner: Arc<ProxyInner>,
}

impl RemoteRegistry {
    /// Create a mirror over an RPC client with the configured call
    /// timeout
    pub fn new(client: Arc<dyn RpcClient>, config: &RemoteConfig) -> Self {
        Self::with_timeout(client, config.call_timeout())
    }

    /// Create a mirror with a specific per-call timeout
    pub fn with_timeout(client: Arc<dyn RpcClient>, call_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                client,
                call_timeout,
                cache: RwLock::new(HashMap::new()),
                degraded: AtomicBool::new(false),
                stale: AtomicBool::new(false),
            }),
        }
    }

    /// Poll the peer and reconcile the local cache.
    ///
    /// On success the cached UUID set equals the peer's snapshot set
    /// exactly. On failure the cache is left at its last-known-good
    /// state, the peer is marked degraded, and `RemoteUnreachable` is
    /// returned.
    pub async fn refresh(&self) -> Result<()> {
        let response = with_timeout(
            self.inner.call_timeout,
            self.inner.client.call("get_resources", Vec::new()),
        )
        .await;

        let value = match response {
            Ok(value) => value,
            Err(e) => {
                self.inner.degraded.store(true, Ordering::SeqCst);
                warn!("Remote refresh failed, keeping last-known cache: {}", e);
                return Err(Error::remote_unreachable(e.to_string()));
            }
        };

        let snapshots = match parse_snapshot_map(value) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                self.inner.degraded.store(true, Ordering::SeqCst);
                warn!("Remote snapshot was malformed, keeping last-known cache: {}", e);
                return Err(e);
            }
        };

        let mut cache = self.inner.cache.write().await;
        cache.retain(|id, _| snapshots.contains_key(id));
        for (id, snapshot) in snapshots {
            match cache.get(&id) {
                Some(proxy) => proxy.update_snapshot(snapshot).await,
                None => {
                    debug!(resource = %id, "Mirroring new remote resource");
                    cache.insert(
                        id,
                        Arc::new(RemoteResource::new(
                            id,
                            self.inner.client.clone(),
                            self.inner.call_timeout,
                            snapshot,
                        )),
                    );
                }
            }
        }
        drop(cache);

        self.inner.degraded.store(false, Ordering::SeqCst);
        self.inner.stale.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Get the cached proxy for a UUID, reconciling once lazily when
    /// the UUID is not cached or the cache has been hinted stale. A
    /// failed reconciliation falls back to the last-known cache.
    pub async fn get_resource(&self, id: ResourceId) -> Option<Arc<RemoteResource>> {
        if !self.inner.stale.load(Ordering::SeqCst) {
            if let Some(proxy) = self.inner.cache.read().await.get(&id) {
                return Some(proxy.clone());
            }
        }
        if let Err(e) = self.refresh().await {
            debug!("Lazy refresh failed: {}", e);
        }
        self.inner.cache.read().await.get(&id).cloned()
    }

    /// UUIDs currently mirrored
    pub async fn resource_ids(&self) -> Vec<ResourceId> {
        self.inner.cache.read().await.keys().copied().collect()
    }

    /// Cached property snapshots of every mirrored resource
    pub async fn resources(&self) -> HashMap<ResourceId, PropertyMap> {
        let cache = self.inner.cache.read().await;
        let mut snapshots = HashMap::with_capacity(cache.len());
        for (id, proxy) in cache.iter() {
            snapshots.insert(*id, proxy.properties().await);
        }
        snapshots
    }

    /// UUIDs of mirrored resources whose cached snapshot satisfies the
    /// predicate. Predicates cannot cross the RPC surface, so this
    /// filters the local cache.
    pub async fn find_resources<P>(&self, predicate: P) -> Vec<ResourceId>
    where
        P: Fn(&PropertyMap) -> bool,
    {
        self.resources()
            .await
            .into_iter()
            .filter(|(_, snapshot)| predicate(snapshot))
            .map(|(id, _)| id)
            .collect()
    }

    /// Ask the peer to run an out-of-band scan of one or all of its
    /// adapters before the next poll
    pub async fn refresh_peer(&self, adapter: Option<&str>) -> Result<()> {
        let params = match adapter {
            Some(name) => vec![Value::String(name.to_string())],
            None => Vec::new(),
        };
        call_peer(&self.inner.client, self.inner.call_timeout, "refresh", params).await?;
        Ok(())
    }

    /// Whether the last poll of the peer failed
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }

    /// Hint that the mirror is out of date; the next lookup reconciles
    /// first. Events are a hint, never a substitute for `refresh()`.
    pub fn mark_stale(&self) {
        self.inner.stale.store(true, Ordering::SeqCst);
    }

    /// Turn registry events into staleness hints
    pub fn hint_on(&self, bus: &SharedEventBus) -> JoinHandle<()> {
        let proxy = self.clone();
        bus.subscribe_fn(EventFilter::all(), move |_event| proxy.mark_stale())
    }
}

impl std::fmt::Debug for RemoteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRegistry")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

async fn call_peer(
    client: &Arc<dyn RpcClient>,
    call_timeout: Duration,
    method: &str,
    params: Vec<Value>,
) -> Result<Value> {
    match with_timeout(call_timeout, client.call(method, params)).await {
        Ok(value) => Ok(value),
        Err(Error::Timeout(msg)) => Err(Error::remote_unreachable(msg)),
        Err(other) => Err(other),
    }
}

fn parse_snapshot_map(value: Value) -> Result<HashMap<ResourceId, PropertyMap>> {
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(Error::Serialization(format!(
                "expected a snapshot map, got {:?}",
                other
            )));
        }
    };

    let mut snapshots = HashMap::with_capacity(map.len());
    for (raw_id, entry) in map {
        let id: ResourceId = raw_id
            .parse()
            .map_err(|_| Error::Serialization(format!("invalid resource id {}", raw_id)))?;
        match entry {
            Value::Object(snapshot) => {
                snapshots.insert(id, snapshot);
            }
            other => {
                return Err(Error::Serialization(format!(
                    "expected a snapshot object for {}, got {:?}",
                    id, other
                )));
            }
        }
    }
    Ok(snapshots)
}
