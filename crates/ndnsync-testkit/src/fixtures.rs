//! Test fixtures and helpers.
//!
//! [`Harness`] drives a [`Comparator`] synchronously: fetches are recorded
//! instead of sent, and the test decides when (and in what order) replies
//! arrive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use ndnsync_cache::{FetchCompletion, FetchError, FetchIssuer, NodeCache};
use ndnsync_core::{CborCodec, Name, NodeHash, Slice};
use ndnsync_sync::{CompareOptions, CompareStats, Comparator, NameSink, RunOutcome};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::builder::BuiltTree;

/// Prefix of every name built by [`content_name`].
pub const TEST_PREFIX: &str = "/app";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A leaf name `/app/<label>/<digest>`, as a publisher would produce it.
pub fn content_name(label: &str) -> Name {
    let mut name = Name::from_uri(TEST_PREFIX).unwrap_or_default();
    name.push(label);
    name.push(NodeHash::digest(label.as_bytes()).as_bytes());
    name
}

/// The name a sink receives for [`content_name`]`(label)`.
pub fn delivered_name(label: &str) -> Name {
    content_name(label).parent()
}

/// The slice used by [`Harness`].
pub fn test_slice() -> Slice {
    Slice::new(
        Name::from_uri("/topo").unwrap_or_default(),
        Name::from_uri(TEST_PREFIX).unwrap_or_default(),
    )
}

/// Records fetch requests instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingIssuer {
    requests: Mutex<Vec<NodeHash>>,
    outstanding: Mutex<Vec<NodeHash>>,
}

impl RecordingIssuer {
    /// Every request so far, in order.
    pub fn requests(&self) -> Vec<NodeHash> {
        lock(&self.requests).clone()
    }

    /// How many times `hash` was requested.
    pub fn request_count(&self, hash: &NodeHash) -> usize {
        lock(&self.requests).iter().filter(|h| *h == hash).count()
    }

    /// Requests not yet answered.
    pub fn outstanding(&self) -> Vec<NodeHash> {
        lock(&self.outstanding).clone()
    }

    fn take_outstanding(&self) -> Vec<NodeHash> {
        std::mem::take(&mut *lock(&self.outstanding))
    }
}

impl FetchIssuer for RecordingIssuer {
    fn issue_fetch(&self, hash: &NodeHash) -> ndnsync_cache::Result<()> {
        lock(&self.requests).push(hash.clone());
        lock(&self.outstanding).push(hash.clone());
        Ok(())
    }
}

/// Collects delivered names.
#[derive(Debug, Default)]
pub struct CollectingSink {
    names: Mutex<Vec<Name>>,
}

impl CollectingSink {
    pub fn names(&self) -> Vec<Name> {
        lock(&self.names).clone()
    }

    /// Remove and return everything collected so far.
    pub fn take(&self) -> Vec<Name> {
        std::mem::take(&mut *lock(&self.names))
    }
}

impl NameSink for CollectingSink {
    fn handle_name(&self, _slice: &Slice, name: &Name) {
        lock(&self.names).push(name.clone());
    }
}

/// A comparator wired to a recording issuer, a collecting sink and a map of
/// published node bytes.
pub struct Harness {
    pub comparator: Comparator,
    pub cache: Arc<NodeCache>,
    pub issuer: Arc<RecordingIssuer>,
    pub sink: Arc<CollectingSink>,
    published: Mutex<HashMap<NodeHash, Bytes>>,
    shuffle: Option<Mutex<StdRng>>,
}

impl Harness {
    pub fn new(options: CompareOptions) -> Self {
        Self::with_attempts(options, ndnsync_cache::DEFAULT_MAX_FETCH_ATTEMPTS)
    }

    /// A harness whose cache gives up on a node after `attempts` failures.
    pub fn with_attempts(options: CompareOptions, attempts: u32) -> Self {
        let cache = Arc::new(NodeCache::new(Arc::new(CborCodec), attempts));
        let issuer = Arc::new(RecordingIssuer::default());
        let sink = Arc::new(CollectingSink::default());
        let comparator = Comparator::new(
            test_slice(),
            Arc::clone(&cache),
            issuer.clone(),
            sink.clone(),
            options,
        );
        Self {
            comparator,
            cache,
            issuer,
            sink,
            published: Mutex::new(HashMap::new()),
            shuffle: None,
        }
    }

    /// Answer outstanding fetches in an order drawn from `seed`.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = Some(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    /// Serve every node of `tree`. Returns the root hash.
    pub fn publish(&self, tree: &BuiltTree) -> NodeHash {
        let mut published = lock(&self.published);
        for (hash, bytes) in &tree.nodes {
            published.insert(hash.clone(), bytes.clone());
        }
        tree.root.clone()
    }

    /// Serve arbitrary bytes under `hash`.
    pub fn publish_raw(&self, hash: NodeHash, bytes: Bytes) {
        lock(&self.published).insert(hash, bytes);
    }

    /// Stop serving `hash`; later fetches for it fail.
    pub fn withdraw(&self, hash: &NodeHash) {
        lock(&self.published).remove(hash);
    }

    pub fn announce(&self, root: &NodeHash) -> bool {
        self.comparator.add_pending_root(root.clone())
    }

    pub fn announce_body(&self, bytes: Bytes) {
        self.comparator.add_pending_body(bytes);
    }

    /// Answer every outstanding fetch. Returns how many were answered.
    pub fn deliver_outstanding(&self) -> usize {
        let mut requests = self.issuer.take_outstanding();
        if let Some(rng) = &self.shuffle {
            requests.shuffle(&mut *lock(rng));
        }
        for hash in &requests {
            self.deliver(hash);
        }
        requests.len()
    }

    /// Answer one fetch for `hash` from the published nodes.
    pub fn deliver(&self, hash: &NodeHash) -> FetchCompletion {
        let result = lock(&self.published)
            .get(hash)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(hash.clone()));
        self.cache.on_fetch_complete(hash, result)
    }

    pub fn run(&self) -> RunOutcome {
        self.comparator.run()
    }

    /// Run and answer fetches until the comparator stops waiting.
    pub fn run_to_idle(&self) -> RunOutcome {
        loop {
            let outcome = self.comparator.run();
            if outcome != RunOutcome::Waiting || self.deliver_outstanding() == 0 {
                return outcome;
            }
        }
    }

    /// Names delivered so far.
    pub fn emitted(&self) -> Vec<Name> {
        self.sink.names()
    }

    /// Names delivered so far, sorted.
    pub fn emitted_sorted(&self) -> Vec<Name> {
        let mut names = self.sink.names();
        names.sort();
        names
    }

    pub fn stats(&self) -> CompareStats {
        self.comparator.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use ndnsync_sync::CompareState;

    #[test]
    fn test_content_name_shape() {
        let name = content_name("alpha");
        assert_eq!(name.len(), 3);
        assert_eq!(delivered_name("alpha").to_uri(), "/app/alpha");
        assert!(test_slice().includes(&name));
    }

    #[test]
    fn test_recording_issuer() {
        let issuer = RecordingIssuer::default();
        let hash = NodeHash::digest(b"n");
        issuer.issue_fetch(&hash).unwrap();
        issuer.issue_fetch(&hash).unwrap();
        assert_eq!(issuer.request_count(&hash), 2);
        assert_eq!(issuer.take_outstanding().len(), 2);
        assert!(issuer.outstanding().is_empty());
        assert_eq!(issuer.requests().len(), 2);
    }

    #[test]
    fn test_harness_round_trip() {
        let harness = Harness::new(CompareOptions::default());
        let tree = TreeBuilder::new(2).build(["a", "b", "c"].map(content_name));
        let root = harness.publish(&tree);

        assert!(harness.announce(&root));
        assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
        assert_eq!(harness.comparator.state(), CompareState::Done);
        assert_eq!(
            harness.emitted(),
            vec![delivered_name("a"), delivered_name("b"), delivered_name("c")]
        );
    }

    #[test]
    fn test_unpublished_root_stalls() {
        let harness = Harness::with_attempts(CompareOptions::default(), 2);
        let root = NodeHash::digest(b"missing");
        harness.announce(&root);

        assert_eq!(harness.run_to_idle(), RunOutcome::Stalled);
        assert_eq!(harness.issuer.request_count(&root), 2);
        assert!(harness.emitted().is_empty());
    }
}
