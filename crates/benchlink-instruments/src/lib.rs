/*!
 * BenchLink Instruments
 *
 * This crate provides the instrument resource registry for BenchLink:
 * transport adapter contracts and their background scan workers, the
 * per-resource lifecycle state machine, and driver matching and
 * loading.
 */

#![warn(missing_docs)]

// Re-export core types
pub use benchlink_core::prelude;

pub mod adapter;
pub mod adapters;
pub mod driver;
pub mod loader;
pub mod registry;
pub mod resource;

mod scan;

// Re-export the main surface
pub use adapter::{AdapterInfo, InterfaceAdapter};
pub use driver::{DriverDescriptor, InstrumentDriver};
pub use loader::{DriverLoader, LoadOutcome};
pub use registry::ResourceRegistry;
pub use resource::{Resource, ResourceBinding, ResourceState};

/// BenchLink instruments crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the instrument subsystem
pub fn init() -> Result<(), benchlink_core::error::Error> {
    tracing::info!("BenchLink Instruments {} initialized", VERSION);
    Ok(())
}
