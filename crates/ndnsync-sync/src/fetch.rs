//! Fetch bridge: turns async node fetches into non-blocking cache requests.
//!
//! The comparator only knows [`FetchIssuer`], which must return at once.
//! [`TaskIssuer`] implements it by spawning a tokio task per request that
//! awaits a [`NodeFetcher`] under a timeout, reports the result to the
//! cache, and kicks the slice's scheduler.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ndnsync_cache::{FetchError, FetchIssuer, NodeCache};
use ndnsync_core::{NodeHash, Slice};
use tokio::runtime::Handle;
use tracing::trace;

use crate::scheduler::KickHandle;

/// Async source of node bytes, e.g. a network face or a repository.
#[async_trait]
pub trait NodeFetcher: Send + Sync {
    /// Fetch the encoded node with the given hash for `slice`.
    async fn fetch_node(&self, slice: &Slice, hash: &NodeHash) -> Result<Bytes, FetchError>;
}

/// [`FetchIssuer`] that runs each fetch as a tokio task.
pub struct TaskIssuer {
    runtime: Handle,
    fetcher: Arc<dyn NodeFetcher>,
    slice: Slice,
    cache: Weak<NodeCache>,
    kick: KickHandle,
    timeout: Duration,
}

impl TaskIssuer {
    pub fn new(
        runtime: Handle,
        fetcher: Arc<dyn NodeFetcher>,
        slice: Slice,
        cache: Weak<NodeCache>,
        kick: KickHandle,
        timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            fetcher,
            slice,
            cache,
            kick,
            timeout,
        }
    }
}

impl FetchIssuer for TaskIssuer {
    fn issue_fetch(&self, hash: &NodeHash) -> ndnsync_cache::Result<()> {
        if self.cache.strong_count() == 0 {
            return Err(FetchError::Shutdown);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let slice = self.slice.clone();
        let cache = self.cache.clone();
        let kick = self.kick.clone();
        let timeout = self.timeout;
        let hash = hash.clone();

        self.runtime.spawn(async move {
            let fetch = fetcher.fetch_node(&slice, &hash);
            let result = match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            };

            let Some(cache) = cache.upgrade() else {
                trace!(hash = %hash, "session gone, dropping fetch result");
                return;
            };
            cache.on_fetch_complete(&hash, result);
            kick.kick();
        });
        Ok(())
    }
}

/// A simple in-memory node source for testing.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Serves published nodes by hash, optionally after a delay.
    #[derive(Default)]
    pub struct MemoryNodeStore {
        nodes: RwLock<HashMap<NodeHash, Bytes>>,
        requests: RwLock<Vec<NodeHash>>,
        latency: Duration,
    }

    impl MemoryNodeStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every reply by `latency`.
        pub fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }

        /// Serve `bytes` under their digest.
        pub fn publish(&self, bytes: Bytes) -> NodeHash {
            let hash = NodeHash::digest(&bytes);
            self.insert(hash.clone(), bytes);
            hash
        }

        /// Serve `bytes` under an arbitrary hash.
        pub fn insert(&self, hash: NodeHash, bytes: Bytes) {
            self.nodes
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(hash, bytes);
        }

        /// Every hash requested so far, in order.
        pub fn requests(&self) -> Vec<NodeHash> {
            self.requests
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl NodeFetcher for MemoryNodeStore {
        async fn fetch_node(&self, _slice: &Slice, hash: &NodeHash) -> Result<Bytes, FetchError> {
            self.requests
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(hash.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let nodes = self
                .nodes
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            nodes
                .get(hash)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(hash.clone()))
        }
    }
}
