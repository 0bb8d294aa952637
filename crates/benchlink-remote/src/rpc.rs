/*!
 * RPC substrate contract.
 *
 * The wire framing lives outside this crate; all the mirror needs is
 * the ability to call a named method with positional arguments and get
 * a result value or an error back. Transport implementations should
 * surface link-level failures as `Error::RemoteUnreachable` (or
 * `Error::Timeout`, which the proxy folds into it); any other error is
 * passed through to the caller as a peer-side result.
 */
use std::fmt::Debug;

use async_trait::async_trait;

use benchlink_core::error::Result;
use benchlink_core::types::Value;

/// A request/response channel to one peer
#[async_trait]
pub trait RpcClient: Send + Sync + Debug {
    /// Call a named method on the peer with positional arguments
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;
}
