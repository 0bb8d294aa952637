/*!
 * Logging functionality for BenchLink.
 *
 * This module provides tracing setup for consistent logging across the
 * BenchLink crates.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Initialize the logging system with the default filter
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter.
///
/// The `RUST_LOG` environment variable takes precedence over the
/// supplied filter string.
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "benchlink=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
