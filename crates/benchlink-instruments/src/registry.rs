/*!
 * Resource registry.
 *
 * The registry aggregates every adapter's resources into one
 * UUID-keyed map, reconciles scan-reported additions and removals,
 * and is the single authority other components consult. All mutation
 * of the global map is serialized behind a write lock; reads take a
 * consistent snapshot.
 */
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use benchlink_core::config::BenchlinkConfig;
use benchlink_core::error::{Error, Result};
use benchlink_core::event::{
    EventFilter, EventKind, EventSubscription, RegistryEvent, SharedEventBus,
};
use benchlink_core::types::{Identity, PropertyMap, ResourceId, Value};

use crate::adapter::InterfaceAdapter;
use crate::loader::{DriverLoader, LoadOutcome};
use crate::resource::{Resource, ResourceState};
use crate::scan::AdapterHandle;

/// A purged resource keeping its UUID reservation for the grace window
struct RetiredEntry {
    adapter: String,
    native_id: String,
    identity: Identity,
    id: ResourceId,
    retired_at: Instant,
}

struct RegistryInner {
    config: BenchlinkConfig,
    resources: RwLock<HashMap<ResourceId, Arc<Resource>>>,
    retired: StdMutex<Vec<RetiredEntry>>,
    loader: DriverLoader,
    events: SharedEventBus,
    adapters: Mutex<HashMap<String, AdapterHandle>>,
}

/// The resource registry. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct ResourceRegistry {
    inner: Arc<RegistryInner>,
}

impl ResourceRegistry {
    /// Create a registry with the given configuration and the
    /// startup-time driver registration table
    pub fn new(config: BenchlinkConfig, loader: DriverLoader) -> Self {
        let events = SharedEventBus::with_capacity(config.events.channel_capacity);
        Self {
            inner: Arc::new(RegistryInner {
                config,
                resources: RwLock::new(HashMap::new()),
                retired: StdMutex::new(Vec::new()),
                loader,
                events,
                adapters: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a registry with default configuration
    pub fn with_defaults(loader: DriverLoader) -> Self {
        Self::new(BenchlinkConfig::default(), loader)
    }

    /// The registry's event bus
    pub fn events(&self) -> &SharedEventBus {
        &self.inner.events
    }

    /// Subscribe to registry events matching the filter
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        self.inner.events.subscribe(filter)
    }

    /// Register an adapter and start scanning it on the configured
    /// default period
    pub async fn register_adapter(&self, adapter: Arc<dyn InterfaceAdapter>) -> Result<()> {
        let period = self.inner.config.scan.period();
        self.register_adapter_with_period(adapter, period).await
    }

    /// Register an adapter and start scanning it on a specific period.
    ///
    /// The adapter is opened first; if it reports itself unavailable
    /// it is never scanned and `InterfaceUnavailable` is returned.
    pub async fn register_adapter_with_period(
        &self,
        adapter: Arc<dyn InterfaceAdapter>,
        period: Duration,
    ) -> Result<()> {
        let name = adapter.name().to_string();
        let mut adapters = self.inner.adapters.lock().await;
        if adapters.contains_key(&name) {
            return Err(Error::other(format!("Adapter {} already registered", name)));
        }

        match adapter.open().await {
            Ok(true) => {}
            Ok(false) => {
                error!(adapter = %name, "Adapter is unavailable and will not be scanned");
                return Err(Error::interface_unavailable(&name));
            }
            Err(e) => {
                error!(adapter = %name, "Adapter open failed, it will not be scanned: {}", e);
                return Err(Error::interface_unavailable(format!("{}: {}", name, e)));
            }
        }

        let handle = AdapterHandle::spawn(
            self.clone(),
            adapter,
            period,
            self.inner.config.scan.enumerate_timeout(),
        );
        adapters.insert(name.clone(), handle);
        info!(adapter = %name, "Adapter registered with scan period {:?}", period);
        Ok(())
    }

    /// Stop scanning an adapter, close it, and purge its resources as
    /// a batch, drivers detached first.
    ///
    /// Blocks until the adapter's in-flight tick (if any) has finished;
    /// no tick runs concurrently with or after the teardown.
    pub async fn close_adapter(&self, name: &str) -> Result<()> {
        let handle = self
            .inner
            .adapters
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| Error::not_found(format!("Adapter {} not registered", name)))?;

        let adapter = handle.stop().await;
        adapter.close().await;

        let ids: Vec<ResourceId> = self
            .resources_read()?
            .values()
            .filter(|resource| resource.adapter() == name)
            .map(|resource| resource.id())
            .collect();
        for id in ids {
            if let Err(e) = self.purge_resource(id).await {
                warn!(adapter = %name, resource = %id, "Purge during close failed: {}", e);
            }
        }

        info!(adapter = %name, "Adapter closed");
        Ok(())
    }

    /// Close every adapter and stop the registry.
    ///
    /// Workers are stopped with their ticks awaited before resources
    /// are purged; event publication is synchronous with mutation, so
    /// nothing can trail the teardown into subscriber channels.
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.inner.adapters.lock().await.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.close_adapter(&name).await {
                warn!(adapter = %name, "Close during shutdown failed: {}", e);
            }
        }
        info!("Registry shut down");
    }

    /// Names of the currently registered adapters
    pub async fn adapter_names(&self) -> Vec<String> {
        self.inner.adapters.lock().await.keys().cloned().collect()
    }

    /// Trigger an immediate out-of-band scan of one adapter, or of all
    /// adapters, and wait for it to complete
    pub async fn refresh(&self, adapter: Option<&str>) -> Result<()> {
        let adapters = self.inner.adapters.lock().await;
        match adapter {
            Some(name) => {
                let handle = adapters
                    .get(name)
                    .ok_or_else(|| Error::not_found(format!("Adapter {} not registered", name)))?;
                handle.refresh().await
            }
            None => {
                for handle in adapters.values() {
                    handle.refresh().await?;
                }
                Ok(())
            }
        }
    }

    /// Flattened property snapshots of every tracked resource
    pub async fn resources(&self) -> Result<HashMap<ResourceId, PropertyMap>> {
        let list: Vec<Arc<Resource>> = self.resources_read()?.values().cloned().collect();
        let mut snapshots = HashMap::with_capacity(list.len());
        for resource in list {
            snapshots.insert(resource.id(), resource.snapshot().await);
        }
        Ok(snapshots)
    }

    /// Get a resource by UUID
    pub fn resource(&self, id: &ResourceId) -> Result<Arc<Resource>> {
        self.resources_read()?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Resource {} not found", id)))
    }

    /// UUIDs of every resource whose property snapshot satisfies the
    /// predicate
    pub async fn find_resources<P>(&self, predicate: P) -> Result<Vec<ResourceId>>
    where
        P: Fn(&PropertyMap) -> bool,
    {
        let snapshots = self.resources().await?;
        Ok(snapshots
            .into_iter()
            .filter(|(_, snapshot)| predicate(snapshot))
            .map(|(id, _)| id)
            .collect())
    }

    /// Number of tracked resources
    pub fn count(&self) -> Result<usize> {
        Ok(self.resources_read()?.len())
    }

    /// Whether a UUID is currently tracked
    pub fn contains(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.resources_read()?.contains_key(id))
    }

    /// Load a driver onto a resource.
    ///
    /// With a descriptor id the compatibility predicate is bypassed;
    /// without one, automatic matching applies and an ambiguous match
    /// loads nothing. Returns true when the request ends with a driver
    /// attached by this call or an earlier one; ambiguous matches and
    /// failures return false. Diagnostics are logged rather than
    /// raised so batch callers are not aborted by one failure.
    pub async fn load_driver(&self, id: ResourceId, descriptor: Option<&str>) -> bool {
        let resource = match self.resource(&id) {
            Ok(resource) => resource,
            Err(e) => {
                warn!(resource = %id, "Driver load refused: {}", e);
                return false;
            }
        };

        let outcome = match descriptor {
            Some(descriptor_id) => self.inner.loader.load_explicit(&resource, descriptor_id).await,
            None => self.inner.loader.auto_load(&resource).await,
        };

        match outcome {
            Ok(LoadOutcome::Loaded(descriptor_id)) => {
                self.inner.events.publish(
                    RegistryEvent::new(EventKind::DriverAttached, id).with_payload(descriptor_id),
                );
                true
            }
            Ok(LoadOutcome::AlreadyLoaded(descriptor_id)) => {
                debug!(resource = %id, "Driver {} already attached", descriptor_id);
                true
            }
            Ok(LoadOutcome::Ambiguous(candidates)) => {
                info!(
                    resource = %id,
                    "Driver match ambiguous, {} candidates, nothing attached",
                    candidates.len()
                );
                false
            }
            Err(e) => {
                warn!(resource = %id, "Driver load failed: {}", e);
                false
            }
        }
    }

    /// Detach the driver from a resource, if any. Idempotent; returns
    /// false only when the UUID is unknown.
    pub async fn unload_driver(&self, id: ResourceId) -> bool {
        let resource = match self.resource(&id) {
            Ok(resource) => resource,
            Err(e) => {
                warn!(resource = %id, "Driver unload refused: {}", e);
                return false;
            }
        };

        if self.inner.loader.unload(&resource).await {
            self.inner
                .events
                .publish(RegistryEvent::new(EventKind::DriverDetached, id));
        }
        true
    }

    /// Invoke a declared driver command on a resource
    pub async fn invoke(&self, id: ResourceId, command: &str, args: Vec<Value>) -> Result<Value> {
        let resource = self.resource(&id)?;
        resource.invoke(command, args).await
    }

    /// Admit a scan-reported native id: reuse the UUID of a matching
    /// grace-window entry or allocate a fresh one, register the
    /// resource, and attempt an automatic driver match.
    pub(crate) async fn admit_resource(
        &self,
        adapter: &str,
        native_id: &str,
        identity: Identity,
    ) -> Result<ResourceId> {
        let id = match self.reclaim_retired(adapter, native_id, &identity)? {
            Some(id) => {
                debug!(resource = %id, adapter, native_id, "Reusing UUID from grace window");
                id
            }
            None => ResourceId::new(),
        };

        let resource = Resource::new(id, adapter, native_id, identity.clone());
        self.resources_write()?.insert(id, resource.clone());

        info!(adapter, native_id, resource = %id, "Resource created for {}", identity);
        self.inner.events.publish(
            RegistryEvent::new(EventKind::ResourceCreated, id).with_payload(identity.to_string()),
        );

        match self.inner.loader.auto_load(&resource).await {
            Ok(LoadOutcome::Loaded(descriptor_id)) => {
                self.inner.events.publish(
                    RegistryEvent::new(EventKind::DriverAttached, id).with_payload(descriptor_id),
                );
            }
            Ok(LoadOutcome::Ambiguous(candidates)) => {
                debug!(
                    resource = %id,
                    "No automatic driver attach, {} candidates",
                    candidates.len()
                );
            }
            Ok(LoadOutcome::AlreadyLoaded(_)) => {}
            Err(e) => {
                warn!(resource = %id, "Automatic driver load failed: {}", e);
            }
        }

        Ok(id)
    }

    /// Purge a resource: mark it removed, detach its driver, drop it
    /// from the global map, and reserve its UUID for the grace window.
    pub(crate) async fn purge_resource(&self, id: ResourceId) -> Result<()> {
        let resource = match self.resources_read()?.get(&id).cloned() {
            Some(resource) => resource,
            None => return Ok(()),
        };

        // Marked before the driver detach: a load racing this purge
        // takes the slot lock next, sees the terminal state, and
        // no-ops.
        resource.set_state(ResourceState::Removed).await;

        if self.inner.loader.unload(&resource).await {
            self.inner
                .events
                .publish(RegistryEvent::new(EventKind::DriverDetached, id));
        }

        self.resources_write()?.remove(&id);

        {
            let grace = self.inner.config.scan.grace_window();
            let mut retired = self
                .inner
                .retired
                .lock()
                .map_err(|_| Error::other("retired list lock poisoned"))?;
            retired.retain(|entry| entry.retired_at.elapsed() <= grace);
            retired.push(RetiredEntry {
                adapter: resource.adapter().to_string(),
                native_id: resource.native_id().to_string(),
                identity: resource.identity().clone(),
                id,
                retired_at: Instant::now(),
            });
        }

        info!(resource = %id, "Resource removed");
        self.inner
            .events
            .publish(RegistryEvent::new(EventKind::ResourceRemoved, id));
        Ok(())
    }

    /// Confirm a resource the latest scan still reports: first
    /// confirmation makes it ready, and a confirming scan recovers an
    /// errored resource.
    pub(crate) async fn confirm_resource(&self, id: ResourceId) -> Result<()> {
        let resource = match self.resources_read()?.get(&id).cloned() {
            Some(resource) => resource,
            None => return Ok(()),
        };
        match resource.state().await {
            ResourceState::Init | ResourceState::Error => {
                resource.set_state(ResourceState::Ready).await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Take a matching UUID reservation out of the grace window list,
    /// pruning expired entries on the way
    fn reclaim_retired(
        &self,
        adapter: &str,
        native_id: &str,
        identity: &Identity,
    ) -> Result<Option<ResourceId>> {
        let grace = self.inner.config.scan.grace_window();
        let mut retired = self
            .inner
            .retired
            .lock()
            .map_err(|_| Error::other("retired list lock poisoned"))?;
        retired.retain(|entry| entry.retired_at.elapsed() <= grace);
        let position = retired.iter().position(|entry| {
            entry.adapter == adapter
                && entry.native_id == native_id
                && entry.identity == *identity
        });
        Ok(position.map(|index| retired.remove(index).id))
    }

    fn resources_read(&self) -> Result<RwLockReadGuard<'_, HashMap<ResourceId, Arc<Resource>>>> {
        self.inner
            .resources
            .read()
            .map_err(|_| Error::other("resource map lock poisoned"))
    }

    fn resources_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ResourceId, Arc<Resource>>>> {
        self.inner
            .resources
            .write()
            .map_err(|_| Error::other("resource map lock poisoned"))
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.count().unwrap_or(0);
        f.debug_struct("ResourceRegistry")
            .field("resources", &count)
            .finish_non_exhaustive()
    }
}
