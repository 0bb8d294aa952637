/*!
 * BenchLink Remote
 *
 * This crate mirrors a peer's resource registry over a plain
 * request/response RPC substrate: a method name and positional
 * arguments go out, a result value or an error comes back. The mirror
 * is reconciled by polling; push notifications are only ever a hint to
 * poll early.
 */

#![warn(missing_docs)]

// Re-export core types
pub use benchlink_core::prelude;

pub mod proxy;
pub mod rpc;
pub mod service;

pub use proxy::{RemoteRegistry, RemoteResource};
pub use rpc::RpcClient;
pub use service::RegistryService;

/// BenchLink remote crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
