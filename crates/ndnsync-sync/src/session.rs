//! Slice sessions: one comparator wired to its cache, fetcher and scheduler.

use std::sync::Arc;

use bytes::Bytes;
use ndnsync_cache::{FetchCompletion, FetchIssuer, NodeCache};
use ndnsync_core::{CborCodec, NodeCodec, NodeHash, Slice, SliceId};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::comparator::{CompareState, CompareStats, Comparator};
use crate::config::{CompareOptions, SyncConfig};
use crate::fetch::{NodeFetcher, TaskIssuer};
use crate::scheduler::{KickHandle, Scheduler};
use crate::sink::NameSink;

/// A running sync session for one slice.
///
/// Dropping the session stops its scheduler. Fetches still in flight finish
/// on their own and find the cache gone.
pub struct SliceSync {
    comparator: Arc<Comparator>,
    cache: Arc<NodeCache>,
    kick: KickHandle,
    _scheduler: Scheduler,
}

impl SliceSync {
    /// Start a session on `runtime` using the reference codec.
    pub fn spawn(
        runtime: &Handle,
        slice: Slice,
        fetcher: Arc<dyn NodeFetcher>,
        sink: Arc<dyn NameSink>,
        options: CompareOptions,
        config: &SyncConfig,
    ) -> Self {
        Self::spawn_with_codec(
            runtime,
            Arc::new(CborCodec),
            slice,
            fetcher,
            sink,
            options,
            config,
        )
    }

    /// Start a session with a custom node codec.
    pub fn spawn_with_codec(
        runtime: &Handle,
        codec: Arc<dyn NodeCodec>,
        slice: Slice,
        fetcher: Arc<dyn NodeFetcher>,
        sink: Arc<dyn NameSink>,
        options: CompareOptions,
        config: &SyncConfig,
    ) -> Self {
        let cache = Arc::new(NodeCache::new(codec, config.max_fetch_attempts));
        let kick = KickHandle::new();
        let issuer: Arc<dyn FetchIssuer> = Arc::new(TaskIssuer::new(
            runtime.clone(),
            fetcher,
            slice.clone(),
            Arc::downgrade(&cache),
            kick.clone(),
            config.fetch_timeout,
        ));

        let id = slice.id();
        let comparator = Arc::new(Comparator::new(
            slice,
            Arc::clone(&cache),
            issuer,
            sink,
            options,
        ));
        let scheduler = Scheduler::spawn(
            runtime,
            Arc::downgrade(&comparator),
            kick.clone(),
            config.debounce,
        );
        info!(slice = %id, "sync session started");

        Self {
            comparator,
            cache,
            kick,
            _scheduler: scheduler,
        }
    }

    pub fn slice(&self) -> &Slice {
        self.comparator.slice()
    }

    pub fn id(&self) -> SliceId {
        self.comparator.slice_id()
    }

    pub fn cache(&self) -> &Arc<NodeCache> {
        &self.cache
    }

    /// A new root hash was announced.
    pub fn add_root(&self, hash: NodeHash) {
        if self.comparator.add_pending_root(hash) {
            self.kick();
        }
    }

    /// A root body was delivered inline.
    pub fn add_root_body(&self, bytes: Bytes) {
        self.comparator.add_pending_body(bytes);
        self.kick();
    }

    /// Node bytes arrived outside the session's own fetches.
    pub fn deliver_node(&self, hash: &NodeHash, bytes: Bytes) -> FetchCompletion {
        let completion = self.cache.on_fetch_complete(hash, Ok(bytes));
        debug!(slice = %self.id(), hash = %hash, completion = ?completion, "node delivered");
        if completion == FetchCompletion::Attached {
            self.kick();
        }
        completion
    }

    /// Ask the scheduler for a run.
    pub fn kick(&self) {
        self.kick.kick();
    }

    pub fn state(&self) -> CompareState {
        self.comparator.state()
    }

    pub fn stats(&self) -> CompareStats {
        self.comparator.stats()
    }

    pub fn baseline(&self) -> Option<NodeHash> {
        self.comparator.baseline()
    }
}

impl Drop for SliceSync {
    fn drop(&mut self) {
        debug!(slice = %self.id(), "sync session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::memory::MemoryNodeStore;
    use ndnsync_core::Name;
    use std::time::Duration;

    fn session(debounce: Duration) -> SliceSync {
        let slice = Slice::new(
            Name::from_uri("/topo").unwrap(),
            Name::from_uri("/app").unwrap(),
        );
        let config = SyncConfig {
            debounce,
            ..SyncConfig::default()
        };
        SliceSync::spawn(
            &Handle::current(),
            slice,
            Arc::new(MemoryNodeStore::new()),
            Arc::new(|_: &Slice, _: &Name| {}),
            CompareOptions::default(),
            &config,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_kick_burst_collapses_into_one_run() {
        let session = session(Duration::from_millis(100));
        for _ in 0..10 {
            session.kick();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(session.stats().runs, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_kick_after_run_runs_again() {
        let session = session(Duration::from_millis(20));
        session.kick();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.stats().runs, 1);

        session.kick();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.stats().runs, 2);
    }
}
