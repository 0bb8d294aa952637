/*!
 * Instrument driver contract and descriptors.
 *
 * A driver is a per-device plugin instance bound to exactly one
 * resource. Drivers are registered at startup as descriptors: a
 * compatibility predicate over the identifying tuple plus a factory.
 * There is no runtime plugin discovery and no hot reload; explicit
 * load and unload give the same operational flexibility.
 */
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use benchlink_core::error::{Error, Result};
use benchlink_core::types::{Identity, PropertyMap, Value};

use crate::resource::ResourceBinding;

/// The per-device plugin contract.
///
/// A driver owns no resources of its own beyond what its binding
/// exposes. Command dispatch is explicit: only commands the driver
/// declares through [`InstrumentDriver::commands`] can be invoked;
/// there is no catch-all forwarding.
#[async_trait]
pub trait InstrumentDriver: Send + Sync + fmt::Debug {
    /// Identifier of the descriptor this driver was produced from
    fn descriptor_id(&self) -> &str;

    /// Open hook, called once after instantiation, before the driver
    /// becomes visible on its resource
    async fn open(&self) -> Result<()>;

    /// Close hook, called once on detach; failures are logged by the
    /// loader, never propagated
    async fn close(&self) -> Result<()>;

    /// The driver's current property map, merged into the resource's
    /// property snapshot while attached
    async fn properties(&self) -> PropertyMap;

    /// Commands this driver declares for explicit dispatch
    fn commands(&self) -> Vec<String> {
        Vec::new()
    }

    /// Invoke a declared command
    async fn invoke(&self, command: &str, _args: Vec<Value>) -> Result<Value> {
        Err(Error::UnknownCommand(
            command.to_string(),
            self.descriptor_id().to_string(),
        ))
    }
}

type MatchFn = dyn Fn(&Identity) -> bool + Send + Sync;
type FactoryFn = dyn Fn(ResourceBinding) -> Result<Box<dyn InstrumentDriver>> + Send + Sync;

/// A registered driver: compatibility predicate plus factory.
///
/// Descriptors are registered with the [`crate::loader::DriverLoader`]
/// at startup and matched against each discovered resource's
/// identifying tuple.
#[derive(Clone)]
pub struct DriverDescriptor {
    id: String,
    matcher: Arc<MatchFn>,
    factory: Arc<FactoryFn>,
}

impl DriverDescriptor {
    /// Create a new descriptor
    pub fn new<I, M, F>(id: I, matcher: M, factory: F) -> Self
    where
        I: Into<String>,
        M: Fn(&Identity) -> bool + Send + Sync + 'static,
        F: Fn(ResourceBinding) -> Result<Box<dyn InstrumentDriver>> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            matcher: Arc::new(matcher),
            factory: Arc::new(factory),
        }
    }

    /// The descriptor identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check whether this driver is compatible with an identifying
    /// tuple
    pub fn matches(&self, identity: &Identity) -> bool {
        (self.matcher)(identity)
    }

    /// Produce a driver instance bound to a resource
    pub fn instantiate(&self, binding: ResourceBinding) -> Result<Box<dyn InstrumentDriver>> {
        (self.factory)(binding)
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
