/*!
 * Interface adapter contract.
 *
 * An interface adapter is the transport-specific capability provider
 * that enumerates native device identifiers (port names, bus
 * addresses) and an identifying tuple for each. Concrete transports
 * (VISA, serial, ...) live outside this crate and plug in through the
 * trait below; the in-tree [`crate::adapters::SimAdapter`] is the
 * transport-free stand-in used by tests and demos.
 */
use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use benchlink_core::error::Result;
use benchlink_core::types::Identity;

/// Capability descriptor for an interface adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// Adapter name, unique within one registry
    pub name: String,
    /// Transport kind (e.g. "visa", "serial", "sim")
    pub transport: String,
    /// Human-readable description
    pub description: String,
}

impl AdapterInfo {
    /// Create a new adapter descriptor
    pub fn new<N, T, D>(name: N, transport: T, description: D) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        D: Into<String>,
    {
        Self {
            name: name.into(),
            transport: transport.into(),
            description: description.into(),
        }
    }
}

/// The transport adapter contract.
///
/// Implementations own whatever system handles the transport needs;
/// the registry owns when they are opened, scanned, and closed.
#[async_trait]
pub trait InterfaceAdapter: Send + Sync + Debug {
    /// Get the adapter descriptor
    fn info(&self) -> &AdapterInfo;

    /// Get the adapter name
    fn name(&self) -> &str {
        &self.info().name
    }

    /// System-level initialization.
    ///
    /// Returns `Ok(false)` or an error when the underlying transport
    /// is unusable; the registry then never scans this adapter.
    async fn open(&self) -> Result<bool>;

    /// Free all system handles. Must be idempotent; called after the
    /// scan worker has fully stopped.
    async fn close(&self);

    /// One-shot enumeration of every native resource id currently
    /// visible on this transport, with its identifying tuple.
    ///
    /// May block on underlying I/O; the scan worker bounds each call
    /// with the configured enumerate timeout.
    async fn enumerate(&self) -> Result<HashMap<String, Identity>>;
}
