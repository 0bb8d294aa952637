/*!
 * Peer-side RPC surface over a local registry.
 *
 * Dispatches named methods with positional arguments onto a
 * [`ResourceRegistry`]. This is the surface a remote mirror polls; the
 * wire framing that carries the calls is an external collaborator.
 */
use std::collections::HashMap;

use tracing::debug;

use benchlink_core::error::{Error, Result};
use benchlink_core::types::{ResourceId, Value};
use benchlink_instruments::registry::ResourceRegistry;

/// Method-name dispatcher over a local resource registry
#[derive(Debug, Clone)]
pub struct RegistryService {
    registry: ResourceRegistry,
}

impl RegistryService {
    /// Expose a registry over the RPC surface
    pub fn new(registry: ResourceRegistry) -> Self {
        Self { registry }
    }

    /// The wrapped registry
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Dispatch one call.
    ///
    /// Methods: `get_resources`, `get_resource(uuid)`,
    /// `load_driver(uuid[, descriptor])`, `unload_driver(uuid)`,
    /// `refresh([adapter])`, `invoke(uuid, command, args...)`.
    pub async fn handle(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        debug!(method, "RPC dispatch");
        match method {
            "get_resources" => {
                let snapshots = self.registry.resources().await?;
                let mut map = HashMap::with_capacity(snapshots.len());
                for (id, snapshot) in snapshots {
                    map.insert(id.to_string(), Value::Object(snapshot));
                }
                Ok(Value::Object(map))
            }
            "get_resource" => {
                let id = parse_id(params.first())?;
                let resource = self.registry.resource(&id)?;
                Ok(Value::Object(resource.snapshot().await))
            }
            "load_driver" => {
                let id = parse_id(params.first())?;
                let descriptor = parse_optional_name(params.get(1))?;
                Ok(Value::Bool(
                    self.registry.load_driver(id, descriptor.as_deref()).await,
                ))
            }
            "unload_driver" => {
                let id = parse_id(params.first())?;
                Ok(Value::Bool(self.registry.unload_driver(id).await))
            }
            "refresh" => {
                let adapter = parse_optional_name(params.first())?;
                self.registry.refresh(adapter.as_deref()).await?;
                Ok(Value::Null)
            }
            "invoke" => {
                let id = parse_id(params.first())?;
                let command = match params.get(1) {
                    Some(Value::String(command)) => command.clone(),
                    _ => return Err(Error::other("invoke requires a command name")),
                };
                let args: Vec<Value> = params.into_iter().skip(2).collect();
                self.registry.invoke(id, &command, args).await
            }
            other => Err(Error::not_found(format!("Unknown RPC method {}", other))),
        }
    }
}

fn parse_id(value: Option<&Value>) -> Result<ResourceId> {
    match value {
        Some(Value::String(raw)) => raw
            .parse()
            .map_err(|_| Error::Serialization(format!("invalid resource id {}", raw))),
        _ => Err(Error::other("expected a resource id as the first parameter")),
    }
}

fn parse_optional_name(value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.clone())),
        Some(other) => Err(Error::Serialization(format!(
            "expected a name or null, got {:?}",
            other
        ))),
    }
}
