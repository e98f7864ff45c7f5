//! FetchIssuer trait: the non-blocking interface for requesting nodes.
//!
//! The cache never performs I/O itself. When a node is missing it asks an
//! issuer to start a fetch and returns immediately; the outcome is reported
//! later through [`NodeCache::on_fetch_complete`](crate::NodeCache::on_fetch_complete).

use ndnsync_core::NodeHash;

use crate::error::Result;

/// Starts a fetch for a node without waiting for it.
///
/// Implementations must not block and must not call back into the cache
/// synchronously from `issue_fetch`.
pub trait FetchIssuer: Send + Sync {
    /// Start fetching the node with the given hash.
    ///
    /// An error means the request could not even be sent; nothing will be
    /// reported through `on_fetch_complete` for it.
    fn issue_fetch(&self, hash: &NodeHash) -> Result<()>;
}

impl<F> FetchIssuer for F
where
    F: Fn(&NodeHash) -> Result<()> + Send + Sync,
{
    fn issue_fetch(&self, hash: &NodeHash) -> Result<()> {
        self(hash)
    }
}
