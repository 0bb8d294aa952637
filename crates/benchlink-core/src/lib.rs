/*!
 * BenchLink Core
 *
 * This crate provides the shared vocabulary for the BenchLink system:
 * resource identifiers, identifying tuples, property values, the
 * registry event bus, configuration, and logging.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use anyhow;
    pub use chrono;
    pub use futures;
    pub use serde;
    pub use tokio;
    pub use tracing;
    pub use uuid;
}

/// BenchLink core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("BenchLink Core {} initialized", VERSION);
    Ok(())
}
