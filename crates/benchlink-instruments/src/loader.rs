/*!
 * Driver matching and loading.
 *
 * The loader holds the startup-time registration table of driver
 * descriptors and performs attach and detach against a resource's
 * driver slot. Attach and detach both run under the slot lock, which
 * is what upholds the at-most-one-driver invariant under concurrent
 * requests.
 */
use tracing::{debug, warn};

use benchlink_core::error::{Error, Result};
use benchlink_core::types::Identity;

use crate::driver::DriverDescriptor;
use crate::resource::{Resource, ResourceState};

/// Outcome of a driver load request.
///
/// Ambiguity is an expected result, not an error: automatic matching
/// refuses to guess when zero or several descriptors accept the
/// identifying tuple, and callers resolve it with an explicit load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A driver was instantiated and attached
    Loaded(String),
    /// Zero or more than one descriptor matched; nothing was attached.
    /// Carries the candidate descriptor ids.
    Ambiguous(Vec<String>),
    /// A driver was already attached; the request was a no-op
    AlreadyLoaded(String),
}

impl LoadOutcome {
    /// Whether the resource has an attached driver after the request
    pub fn is_attached(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_) | LoadOutcome::AlreadyLoaded(_))
    }
}

/// Startup-time driver registration table plus attach/detach logic
#[derive(Debug, Default)]
pub struct DriverLoader {
    descriptors: Vec<DriverDescriptor>,
}

impl DriverLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// Register a driver descriptor. Descriptor ids must be unique.
    pub fn register(&mut self, descriptor: DriverDescriptor) -> Result<()> {
        if self.descriptors.iter().any(|d| d.id() == descriptor.id()) {
            return Err(Error::other(format!(
                "Driver descriptor {} already registered",
                descriptor.id()
            )));
        }
        debug!("Registered driver descriptor {}", descriptor.id());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// All registered descriptors
    pub fn descriptors(&self) -> &[DriverDescriptor] {
        &self.descriptors
    }

    /// Look up a descriptor by id
    pub fn descriptor(&self, id: &str) -> Option<&DriverDescriptor> {
        self.descriptors.iter().find(|d| d.id() == id)
    }

    /// Every descriptor whose predicate accepts the identifying tuple
    pub fn matching(&self, identity: &Identity) -> Vec<&DriverDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.matches(identity))
            .collect()
    }

    /// Attempt an automatic driver attach.
    ///
    /// Attaches only when exactly one descriptor matches; with zero or
    /// several candidates nothing is attached and the candidates are
    /// reported.
    pub async fn auto_load(&self, resource: &Resource) -> Result<LoadOutcome> {
        let candidates = self.matching(resource.identity());
        if candidates.len() != 1 {
            let ids = candidates.iter().map(|d| d.id().to_string()).collect();
            return Ok(LoadOutcome::Ambiguous(ids));
        }
        self.attach(resource, candidates[0]).await
    }

    /// Attach a specific driver, bypassing compatibility checking.
    /// The caller asserts correctness.
    pub async fn load_explicit(&self, resource: &Resource, descriptor_id: &str) -> Result<LoadOutcome> {
        let descriptor = self.descriptor(descriptor_id).ok_or_else(|| {
            Error::not_found(format!("Driver descriptor {} not registered", descriptor_id))
        })?;
        self.attach(resource, descriptor).await
    }

    /// Detach the attached driver, if any, invoking its close hook
    /// best-effort. Idempotent: returns whether a driver was detached.
    pub async fn unload(&self, resource: &Resource) -> bool {
        let mut slot = resource.driver_slot().lock().await;
        match slot.take() {
            Some(driver) => {
                if let Err(e) = driver.close().await {
                    // bookkeeping removal proceeds regardless
                    warn!(
                        resource = %resource.id(),
                        "Driver {} close hook failed: {}",
                        driver.descriptor_id(),
                        e
                    );
                }
                debug!(
                    resource = %resource.id(),
                    "Detached driver {}",
                    driver.descriptor_id()
                );
                true
            }
            None => false,
        }
    }

    async fn attach(
        &self,
        resource: &Resource,
        descriptor: &DriverDescriptor,
    ) -> Result<LoadOutcome> {
        // The slot lock serializes this against concurrent loads,
        // unloads, and purges of the same resource.
        let mut slot = resource.driver_slot().lock().await;

        if resource.state().await == ResourceState::Removed {
            return Err(Error::resource_unavailable(format!(
                "resource {} was removed before the driver could attach",
                resource.id()
            )));
        }

        if let Some(existing) = slot.as_ref() {
            return Ok(LoadOutcome::AlreadyLoaded(
                existing.descriptor_id().to_string(),
            ));
        }

        let driver = descriptor.instantiate(resource.binding()).map_err(|e| {
            Error::driver_load(format!(
                "descriptor {} failed to instantiate: {}",
                descriptor.id(),
                e
            ))
        })?;

        if let Err(e) = driver.open().await {
            // The slot stays empty and the resource state unchanged
            return Err(Error::driver_load(format!(
                "driver {} open hook failed: {}",
                descriptor.id(),
                e
            )));
        }

        *slot = Some(driver);
        debug!(
            resource = %resource.id(),
            "Attached driver {}",
            descriptor.id()
        );
        Ok(LoadOutcome::Loaded(descriptor.id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use benchlink_core::types::{PropertyMap, ResourceId};

    use crate::driver::InstrumentDriver;

    #[derive(Debug)]
    struct CountingDriver {
        id: String,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InstrumentDriver for CountingDriver {
        fn descriptor_id(&self) -> &str {
            &self.id
        }

        async fn open(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn properties(&self) -> PropertyMap {
            PropertyMap::new()
        }
    }

    fn counting_descriptor(
        id: &str,
        vendor: &str,
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    ) -> DriverDescriptor {
        let id_owned = id.to_string();
        let vendor = vendor.to_string();
        DriverDescriptor::new(
            id,
            move |identity: &Identity| identity.vendor == vendor,
            move |_binding| {
                opens.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(CountingDriver {
                    id: id_owned.clone(),
                    closes: closes.clone(),
                }) as Box<dyn InstrumentDriver>)
            },
        )
    }

    fn test_resource(vendor: &str) -> Arc<Resource> {
        let resource = Resource::new(
            ResourceId::new(),
            "sim0",
            "COM3",
            Identity::new(vendor, "Model1"),
        );
        resource
    }

    #[tokio::test]
    async fn test_auto_load_single_match() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut loader = DriverLoader::new();
        loader
            .register(counting_descriptor("vx", "VendorX", opens.clone(), closes.clone()))
            .unwrap();

        let resource = test_resource("VendorX");
        let outcome = loader.auto_load(&resource).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded("vx".to_string()));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(resource.has_driver().await);
    }

    #[tokio::test]
    async fn test_auto_load_zero_matches_is_ambiguous() {
        let loader = DriverLoader::new();
        let resource = test_resource("VendorX");
        let outcome = loader.auto_load(&resource).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Ambiguous(Vec::new()));
        assert!(!resource.has_driver().await);
    }

    #[tokio::test]
    async fn test_auto_load_two_matches_is_ambiguous() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut loader = DriverLoader::new();
        loader
            .register(counting_descriptor("a", "VendorX", opens.clone(), closes.clone()))
            .unwrap();
        loader
            .register(counting_descriptor("b", "VendorX", opens.clone(), closes.clone()))
            .unwrap();

        let resource = test_resource("VendorX");
        let outcome = loader.auto_load(&resource).await.unwrap();
        assert_eq!(
            outcome,
            LoadOutcome::Ambiguous(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert!(!resource.has_driver().await);
    }

    #[tokio::test]
    async fn test_load_explicit_bypasses_predicate() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut loader = DriverLoader::new();
        loader
            .register(counting_descriptor("vx", "VendorX", opens.clone(), closes.clone()))
            .unwrap();

        // identity the predicate would reject
        let resource = test_resource("VendorY");
        let outcome = loader.load_explicit(&resource, "vx").await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded("vx".to_string()));
    }

    #[tokio::test]
    async fn test_load_explicit_unknown_descriptor() {
        let loader = DriverLoader::new();
        let resource = test_resource("VendorX");
        let err = loader.load_explicit(&resource, "missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_second_load_is_noop() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut loader = DriverLoader::new();
        loader
            .register(counting_descriptor("vx", "VendorX", opens.clone(), closes.clone()))
            .unwrap();

        let resource = test_resource("VendorX");
        loader.auto_load(&resource).await.unwrap();
        let outcome = loader.auto_load(&resource).await.unwrap();
        assert_eq!(outcome, LoadOutcome::AlreadyLoaded("vx".to_string()));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_leave_one_instance() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut loader = DriverLoader::new();
        loader
            .register(counting_descriptor("vx", "VendorX", opens.clone(), closes.clone()))
            .unwrap();
        let loader = Arc::new(loader);

        let resource = test_resource("VendorX");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let loader = loader.clone();
            let resource = resource.clone();
            handles.push(tokio::spawn(async move {
                loader.auto_load(&resource).await.unwrap()
            }));
        }

        let mut loaded = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), LoadOutcome::Loaded(_)) {
                loaded += 1;
            }
        }
        assert_eq!(loaded, 1);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unload_is_idempotent_and_closes_once() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut loader = DriverLoader::new();
        loader
            .register(counting_descriptor("vx", "VendorX", opens.clone(), closes.clone()))
            .unwrap();

        let resource = test_resource("VendorX");
        loader.auto_load(&resource).await.unwrap();

        assert!(loader.unload(&resource).await);
        assert!(!loader.unload(&resource).await);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!resource.has_driver().await);
    }

    #[tokio::test]
    async fn test_load_on_removed_resource_is_refused() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut loader = DriverLoader::new();
        loader
            .register(counting_descriptor("vx", "VendorX", opens.clone(), closes.clone()))
            .unwrap();

        let resource = test_resource("VendorX");
        resource.set_state(ResourceState::Ready).await;
        resource.set_state(ResourceState::Removed).await;

        let err = loader.auto_load(&resource).await.unwrap_err();
        assert!(matches!(err, Error::ResourceUnavailable(_)));
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_open_hook_leaves_slot_empty() {
        let mut loader = DriverLoader::new();
        loader
            .register(DriverDescriptor::new(
                "broken",
                |_identity: &Identity| true,
                |_binding| Err(Error::other("no such port")),
            ))
            .unwrap();

        let resource = test_resource("VendorX");
        let err = loader.auto_load(&resource).await.unwrap_err();
        assert!(matches!(err, Error::DriverLoadFailure(_)));
        assert!(!resource.has_driver().await);
        assert_eq!(resource.state().await, ResourceState::Init);
    }

    #[tokio::test]
    async fn test_duplicate_descriptor_id_rejected() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut loader = DriverLoader::new();
        loader
            .register(counting_descriptor("vx", "VendorX", opens.clone(), closes.clone()))
            .unwrap();
        let err = loader
            .register(counting_descriptor("vx", "VendorY", opens, closes))
            .unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }
}
