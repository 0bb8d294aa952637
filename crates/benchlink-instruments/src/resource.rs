/*!
 * Resource lifecycle wrapper.
 *
 * A resource is the per-device handle the registry hands out: a stable
 * UUID, the native id the owning adapter reported, the identifying
 * tuple, a lifecycle state, and an optional attached driver. The
 * driver slot's lock is what serializes load, unload, and purge for
 * one resource.
 */
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use benchlink_core::error::{Error, Result};
use benchlink_core::types::{Identity, PropertyMap, ResourceId, Value};

use crate::driver::InstrumentDriver;

/// Resource lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    /// Just created, not yet confirmed by a completed scan; transient
    Init,
    /// Confirmed present and usable
    Ready,
    /// A prior operation found the device unresponsive; still tracked
    /// but operations fail fast
    Error,
    /// Terminal; every holder should discard the handle
    Removed,
}

impl ResourceState {
    /// String form used in property snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Init => "init",
            ResourceState::Ready => "ready",
            ResourceState::Error => "error",
            ResourceState::Removed => "removed",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The identity a driver factory binds to.
///
/// A plain value, not a handle: drivers hold no reference back into
/// the registry, so resource teardown never races driver ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    /// The resource UUID
    pub id: ResourceId,
    /// Name of the owning adapter
    pub adapter: String,
    /// Transport-level identifier within the owning adapter
    pub native_id: String,
    /// The identifying tuple the adapter reported
    pub identity: Identity,
}

/// A discovered instrument tracked by the registry
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    adapter: String,
    native_id: String,
    identity: Identity,
    state: RwLock<ResourceState>,
    driver: Mutex<Option<Box<dyn InstrumentDriver>>>,
}

impl Resource {
    /// Create a new resource in the `Init` state
    pub(crate) fn new(
        id: ResourceId,
        adapter: impl Into<String>,
        native_id: impl Into<String>,
        identity: Identity,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            adapter: adapter.into(),
            native_id: native_id.into(),
            identity,
            state: RwLock::new(ResourceState::Init),
            driver: Mutex::new(None),
        })
    }

    /// The resource UUID
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Name of the owning adapter (back-reference only)
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    /// The native id the owning adapter reported
    pub fn native_id(&self) -> &str {
        &self.native_id
    }

    /// The identifying tuple
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ResourceState {
        *self.state.read().await
    }

    /// Apply a state transition.
    ///
    /// `Removed` is terminal: once set, every further transition is
    /// refused. Returns whether the state changed.
    pub(crate) async fn set_state(&self, new_state: ResourceState) -> bool {
        let mut state = self.state.write().await;
        let old_state = *state;
        if old_state == new_state {
            return false;
        }
        if old_state == ResourceState::Removed {
            warn!(
                resource = %self.id,
                "Refusing state transition {} -> {} on removed resource",
                old_state, new_state
            );
            return false;
        }
        *state = new_state;
        debug!(resource = %self.id, "State {} -> {}", old_state, new_state);
        true
    }

    /// Signal an I/O failure observed on this resource; moves
    /// `Ready` to `Error`. A later scan that still reports the native
    /// id recovers the resource to `Ready`.
    pub async fn mark_error(&self) {
        let state = self.state().await;
        if state == ResourceState::Ready {
            self.set_state(ResourceState::Error).await;
        }
    }

    /// The binding value handed to driver factories
    pub fn binding(&self) -> ResourceBinding {
        ResourceBinding {
            id: self.id,
            adapter: self.adapter.clone(),
            native_id: self.native_id.clone(),
            identity: self.identity.clone(),
        }
    }

    /// Access to the driver slot; locking it serializes load, unload,
    /// and purge for this resource.
    pub(crate) fn driver_slot(&self) -> &Mutex<Option<Box<dyn InstrumentDriver>>> {
        &self.driver
    }

    /// Identifier of the attached driver's descriptor, if any
    pub async fn driver_id(&self) -> Option<String> {
        self.driver
            .lock()
            .await
            .as_ref()
            .map(|driver| driver.descriptor_id().to_string())
    }

    /// Whether a driver is currently attached
    pub async fn has_driver(&self) -> bool {
        self.driver.lock().await.is_some()
    }

    /// Flattened property snapshot: bookkeeping fields merged with the
    /// attached driver's property map. The `driver` key is present
    /// only while a driver is attached.
    pub async fn snapshot(&self) -> PropertyMap {
        let mut properties = PropertyMap::new();

        if let Some(driver) = self.driver.lock().await.as_ref() {
            properties.extend(driver.properties().await);
            properties.insert(
                "driver".to_string(),
                Value::String(driver.descriptor_id().to_string()),
            );
        }

        // Bookkeeping fields win over driver-reported keys
        properties.insert("uuid".to_string(), Value::String(self.id.to_string()));
        properties.insert("adapter".to_string(), Value::String(self.adapter.clone()));
        properties.insert(
            "native_id".to_string(),
            Value::String(self.native_id.clone()),
        );
        properties.insert(
            "vendor".to_string(),
            Value::String(self.identity.vendor.clone()),
        );
        properties.insert(
            "model".to_string(),
            Value::String(self.identity.model.clone()),
        );
        if let Some(serial) = &self.identity.serial {
            properties.insert("serial".to_string(), Value::String(serial.clone()));
        }
        if let Some(firmware) = &self.identity.firmware {
            properties.insert("firmware".to_string(), Value::String(firmware.clone()));
        }
        properties.insert(
            "state".to_string(),
            Value::String(self.state().await.as_str().to_string()),
        );

        properties
    }

    /// Invoke a declared driver command on this resource.
    ///
    /// Fails fast with `ResourceUnavailable` when the resource is in
    /// `Error` or `Removed` state and with `NoDriverAttached` when the
    /// slot is empty. A communication or timeout failure reported by
    /// the driver moves the resource to `Error`.
    pub async fn invoke(&self, command: &str, args: Vec<Value>) -> Result<Value> {
        match self.state().await {
            ResourceState::Removed => {
                return Err(Error::resource_unavailable(format!(
                    "resource {} has been removed",
                    self.id
                )));
            }
            ResourceState::Error => {
                return Err(Error::resource_unavailable(format!(
                    "resource {} is in error state",
                    self.id
                )));
            }
            _ => {}
        }

        let slot = self.driver.lock().await;
        let driver = slot
            .as_ref()
            .ok_or_else(|| Error::NoDriverAttached(self.id.to_string()))?;

        if !driver.commands().iter().any(|c| c == command) {
            return Err(Error::UnknownCommand(
                command.to_string(),
                driver.descriptor_id().to_string(),
            ));
        }

        match driver.invoke(command, args).await {
            Ok(value) => Ok(value),
            Err(err @ (Error::Communication(_) | Error::Timeout(_))) => {
                drop(slot);
                self.mark_error().await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct EchoDriver;

    #[async_trait]
    impl InstrumentDriver for EchoDriver {
        fn descriptor_id(&self) -> &str {
            "echo"
        }

        async fn open(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        async fn properties(&self) -> PropertyMap {
            let mut properties = PropertyMap::new();
            properties.insert("range".to_string(), Value::Integer(10));
            properties
        }

        fn commands(&self) -> Vec<String> {
            vec!["echo".to_string(), "fault".to_string()]
        }

        async fn invoke(&self, command: &str, args: Vec<Value>) -> Result<Value> {
            match command {
                "echo" => Ok(args.into_iter().next().unwrap_or(Value::Null)),
                "fault" => Err(Error::communication("simulated fault")),
                other => Err(Error::UnknownCommand(
                    other.to_string(),
                    "echo".to_string(),
                )),
            }
        }
    }

    fn test_resource() -> Arc<Resource> {
        Resource::new(
            ResourceId::new(),
            "sim0",
            "COM3",
            Identity::new("VendorX", "Model1"),
        )
    }

    #[tokio::test]
    async fn test_new_resource_starts_in_init() {
        let resource = test_resource();
        assert_eq!(resource.state().await, ResourceState::Init);
        assert!(!resource.has_driver().await);
    }

    #[tokio::test]
    async fn test_removed_is_terminal() {
        let resource = test_resource();
        assert!(resource.set_state(ResourceState::Ready).await);
        assert!(resource.set_state(ResourceState::Removed).await);
        assert!(!resource.set_state(ResourceState::Ready).await);
        assert_eq!(resource.state().await, ResourceState::Removed);
    }

    #[tokio::test]
    async fn test_error_recovers_to_ready() {
        let resource = test_resource();
        resource.set_state(ResourceState::Ready).await;
        resource.mark_error().await;
        assert_eq!(resource.state().await, ResourceState::Error);
        assert!(resource.set_state(ResourceState::Ready).await);
    }

    #[tokio::test]
    async fn test_snapshot_without_driver_has_no_driver_key() {
        let resource = test_resource();
        resource.set_state(ResourceState::Ready).await;
        let snapshot = resource.snapshot().await;
        assert!(!snapshot.contains_key("driver"));
        assert_eq!(snapshot["vendor"], Value::String("VendorX".into()));
        assert_eq!(snapshot["state"], Value::String("ready".into()));
        assert_eq!(snapshot["native_id"], Value::String("COM3".into()));
    }

    #[tokio::test]
    async fn test_snapshot_merges_driver_properties() {
        let resource = test_resource();
        resource.set_state(ResourceState::Ready).await;
        *resource.driver_slot().lock().await = Some(Box::new(EchoDriver));

        let snapshot = resource.snapshot().await;
        assert_eq!(snapshot["driver"], Value::String("echo".into()));
        assert_eq!(snapshot["range"], Value::Integer(10));
        // bookkeeping keys always win
        assert_eq!(snapshot["uuid"], Value::String(resource.id().to_string()));
    }

    #[tokio::test]
    async fn test_invoke_without_driver_is_distinct_error() {
        let resource = test_resource();
        resource.set_state(ResourceState::Ready).await;
        let err = resource.invoke("echo", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::NoDriverAttached(_)));
    }

    #[tokio::test]
    async fn test_invoke_undeclared_command_is_rejected() {
        let resource = test_resource();
        resource.set_state(ResourceState::Ready).await;
        *resource.driver_slot().lock().await = Some(Box::new(EchoDriver));
        let err = resource.invoke("reboot", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(_, _)));
    }

    #[tokio::test]
    async fn test_communication_failure_moves_to_error_and_fails_fast() {
        let resource = test_resource();
        resource.set_state(ResourceState::Ready).await;
        *resource.driver_slot().lock().await = Some(Box::new(EchoDriver));

        let err = resource.invoke("fault", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::Communication(_)));
        assert_eq!(resource.state().await, ResourceState::Error);

        // subsequent operations fail fast without reaching the driver
        let err = resource.invoke("echo", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invoke_echoes_value() {
        let resource = test_resource();
        resource.set_state(ResourceState::Ready).await;
        *resource.driver_slot().lock().await = Some(Box::new(EchoDriver));
        let value = resource
            .invoke("echo", vec![Value::Integer(5)])
            .await
            .unwrap();
        assert_eq!(value, Value::Integer(5));
    }
}
