/*!
 * Prelude module for BenchLink Core.
 *
 * This module re-exports commonly used types and functions from the
 * BenchLink Core crate to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{Identity, PropertyMap, ResourceId, Value};

// Re-export event types
pub use crate::event::{
    EventBus, EventFilter, EventKind, EventSubscription, RegistryEvent, SharedEventBus,
};

// Re-export config types
pub use crate::config::{BenchlinkConfig, RemoteConfig, ScanConfig, SharedConfig};

// Re-export utility functions
pub use crate::utils::with_timeout;

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
