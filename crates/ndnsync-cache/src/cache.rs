//! Node cache: hash-indexed table of tree entries.
//!
//! The cache is the single owner of every [`TreeEntry`]. Comparator stacks
//! hold hashes and look entries up here. The table lock is held only long
//! enough to find or insert an entry; each entry has its own mutex, and the
//! fetch issuer is always invoked with no lock held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use bytes::Bytes;
use ndnsync_core::{CborCodec, CodecError, NodeCodec, NodeHash, SyncNode};
use tracing::{debug, warn};

use crate::entry::TreeEntry;
use crate::error::{FetchError, Result};
use crate::traits::FetchIssuer;

/// Failed fetches or decodes after which a node is no longer requested.
pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 3;

/// Shared handle to one cached entry.
pub type EntryHandle = Arc<Mutex<TreeEntry>>;

/// Result of looking a node up.
#[derive(Debug, Clone)]
pub enum NodeLookup {
    /// Decoded body available.
    Ready(Arc<SyncNode>),
    /// No body yet.
    Absent,
    /// Last fetch or decode failed. `exhausted` means no further fetch will
    /// be issued for it.
    Unusable { exhausted: bool },
}

/// Outcome of [`NodeCache::request_fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRequest {
    /// A new fetch was handed to the issuer.
    Issued,
    /// A fetch for this hash is already outstanding.
    AlreadyPending,
    /// The body is already present.
    Resident,
    /// Attempts for this hash are used up.
    Exhausted,
}

impl FetchRequest {
    /// Whether a request was actually sent.
    pub fn issued(self) -> bool {
        matches!(self, FetchRequest::Issued)
    }

    /// Whether the caller should wait for a completion.
    pub fn awaiting(self) -> bool {
        matches!(self, FetchRequest::Issued | FetchRequest::AlreadyPending)
    }
}

/// Outcome of [`NodeCache::on_fetch_complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCompletion {
    /// Bytes attached; they are decoded on first use.
    Attached,
    /// A body was already present; the completion changed nothing.
    Duplicate,
    /// The fetch failed.
    Failed { attempts: u32, exhausted: bool },
}

/// Hash-indexed table of tree entries with fetch deduplication.
///
/// Entries are never evicted while the cache lives.
pub struct NodeCache {
    codec: Arc<dyn NodeCodec>,
    entries: RwLock<HashMap<NodeHash, EntryHandle>>,
    max_fetch_attempts: u32,
}

fn lock(entry: &EntryHandle) -> MutexGuard<'_, TreeEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NodeCache {
    /// Create an empty cache.
    pub fn new(codec: Arc<dyn NodeCodec>, max_fetch_attempts: u32) -> Self {
        Self {
            codec,
            entries: RwLock::new(HashMap::new()),
            max_fetch_attempts: max_fetch_attempts.max(1),
        }
    }

    pub fn codec(&self) -> &dyn NodeCodec {
        self.codec.as_ref()
    }

    pub fn max_fetch_attempts(&self) -> u32 {
        self.max_fetch_attempts
    }

    /// The entry for `hash`, creating an empty placeholder if needed.
    pub fn get_or_create(&self, hash: &NodeHash) -> EntryHandle {
        if let Some(entry) = self.get(hash) {
            return entry;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(hash.clone())
                .or_insert_with(|| Arc::new(Mutex::new(TreeEntry::new(hash.clone())))),
        )
    }

    /// The entry for `hash`, if one exists.
    pub fn get(&self, hash: &NodeHash) -> Option<EntryHandle> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(hash).cloned()
    }

    /// Look up a node, decoding raw bytes on first access.
    pub fn lookup(&self, hash: &NodeHash) -> NodeLookup {
        let Some(entry) = self.get(hash) else {
            return NodeLookup::Absent;
        };
        let mut entry = lock(&entry);
        if let Some(node) = entry.node(self.codec.as_ref()) {
            return NodeLookup::Ready(node);
        }
        if entry.is_unusable() {
            NodeLookup::Unusable {
                exhausted: entry.failures() >= self.max_fetch_attempts,
            }
        } else {
            NodeLookup::Absent
        }
    }

    /// Ask `issuer` to fetch `hash` unless that would be redundant.
    ///
    /// At most one fetch per hash is outstanding. If the issuer fails, the
    /// pending mark is cleared and the error returned.
    pub fn request_fetch(&self, hash: &NodeHash, issuer: &dyn FetchIssuer) -> Result<FetchRequest> {
        let entry = self.get_or_create(hash);
        {
            let mut guard = lock(&entry);
            if guard.is_resident() {
                return Ok(FetchRequest::Resident);
            }
            if guard.is_fetch_pending() {
                return Ok(FetchRequest::AlreadyPending);
            }
            if guard.is_unusable() && guard.failures() >= self.max_fetch_attempts {
                return Ok(FetchRequest::Exhausted);
            }
            guard.mark_pending(true);
        }

        debug!(hash = %hash, "requesting node fetch");
        if let Err(e) = issuer.issue_fetch(hash) {
            lock(&entry).mark_pending(false);
            return Err(e);
        }
        Ok(FetchRequest::Issued)
    }

    /// Record the outcome of a fetch.
    ///
    /// Unsolicited bytes are accepted too; they are verified against the
    /// hash when first decoded.
    pub fn on_fetch_complete(
        &self,
        hash: &NodeHash,
        result: std::result::Result<Bytes, FetchError>,
    ) -> FetchCompletion {
        let entry = self.get_or_create(hash);
        let mut entry = lock(&entry);
        entry.mark_pending(false);

        if entry.is_resident() {
            return FetchCompletion::Duplicate;
        }

        match result {
            Ok(bytes) => {
                debug!(hash = %hash, len = bytes.len(), "node fetched");
                entry.attach_raw(bytes);
                FetchCompletion::Attached
            }
            Err(e) => {
                entry.record_failure(e.to_string());
                let attempts = entry.failures();
                let exhausted = attempts >= self.max_fetch_attempts;
                warn!(hash = %hash, error = %e, attempts, exhausted, "node fetch failed");
                FetchCompletion::Failed {
                    attempts,
                    exhausted,
                }
            }
        }
    }

    /// Insert an inline node body and return its hash.
    ///
    /// The body is decoded immediately; a malformed body leaves an unusable
    /// entry behind and returns the decode error.
    pub fn insert_raw(&self, bytes: Bytes) -> std::result::Result<NodeHash, CodecError> {
        let hash = self.codec.hash(&bytes);
        let entry = self.get_or_create(&hash);
        let mut entry = lock(&entry);
        if !entry.is_resident() {
            entry.attach_raw(bytes.clone());
        }
        if entry.node(self.codec.as_ref()).is_some() {
            return Ok(hash);
        }
        // Decode once more to surface the reason.
        match self.codec.decode(&bytes) {
            Err(e) => Err(e),
            Ok(_) => Err(CodecError::MalformedNode(format!(
                "node {} could not be attached",
                hash
            ))),
        }
    }

    /// Encode a locally built node, attach it decoded, and return its hash.
    pub fn insert_node(&self, node: SyncNode) -> NodeHash {
        let (hash, _) = self.codec.encode_with_hash(&node);
        let entry = self.get_or_create(&hash);
        let mut entry = lock(&entry);
        if entry.node(self.codec.as_ref()).is_none() {
            entry.attach_body(Arc::new(node));
        }
        hash
    }

    /// Record that every leaf under `hash` is known.
    pub fn mark_covered(&self, hash: &NodeHash) {
        lock(&self.get_or_create(hash)).mark_covered();
    }

    pub fn is_covered(&self, hash: &NodeHash) -> bool {
        self.get(hash)
            .map(|e| lock(&e).is_covered())
            .unwrap_or(false)
    }

    pub fn is_fetch_pending(&self, hash: &NodeHash) -> bool {
        self.get(hash)
            .map(|e| lock(&e).is_fetch_pending())
            .unwrap_or(false)
    }

    /// Number of cached entries, placeholders included.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new(Arc::new(CborCodec), DEFAULT_MAX_FETCH_ATTEMPTS)
    }
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache")
            .field("entries", &self.len())
            .field("max_fetch_attempts", &self.max_fetch_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndnsync_core::Name;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingIssuer {
        calls: AtomicUsize,
    }

    impl FetchIssuer for CountingIssuer {
        fn issue_fetch(&self, _hash: &NodeHash) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn leaf_node(uri: &str) -> SyncNode {
        SyncNode::from_leaves(vec![Name::from_uri(uri).unwrap()])
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let cache = NodeCache::default();
        let hash = NodeHash::digest(b"x");
        let a = cache.get_or_create(&hash);
        let b = cache.get_or_create(&hash);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_one_fetch_per_missing_hash() {
        let cache = NodeCache::default();
        let issuer = CountingIssuer::default();
        let hash = NodeHash::digest(b"missing");

        assert_eq!(cache.request_fetch(&hash, &issuer).unwrap(), FetchRequest::Issued);
        assert_eq!(
            cache.request_fetch(&hash, &issuer).unwrap(),
            FetchRequest::AlreadyPending
        );
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_fetch_pending(&hash));
    }

    #[test]
    fn test_fetch_completion_attaches_bytes() {
        let cache = NodeCache::default();
        let issuer = CountingIssuer::default();
        let node = leaf_node("/a");
        let (hash, bytes) = CborCodec.encode_with_hash(&node);

        cache.request_fetch(&hash, &issuer).unwrap();
        assert!(matches!(cache.lookup(&hash), NodeLookup::Absent));

        assert_eq!(cache.on_fetch_complete(&hash, Ok(bytes.clone())), FetchCompletion::Attached);
        assert!(!cache.is_fetch_pending(&hash));
        match cache.lookup(&hash) {
            NodeLookup::Ready(decoded) => assert_eq!(*decoded, node),
            other => panic!("expected ready, got {:?}", other),
        }

        assert_eq!(cache.request_fetch(&hash, &issuer).unwrap(), FetchRequest::Resident);
        assert_eq!(cache.on_fetch_complete(&hash, Ok(bytes)), FetchCompletion::Duplicate);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_issue_error_clears_pending() {
        let cache = NodeCache::default();
        let hash = NodeHash::digest(b"x");
        let failing = |_: &NodeHash| -> Result<()> { Err(FetchError::Transport("down".into())) };

        assert!(cache.request_fetch(&hash, &failing).is_err());
        assert!(!cache.is_fetch_pending(&hash));

        let issuer = CountingIssuer::default();
        assert!(cache.request_fetch(&hash, &issuer).unwrap().issued());
    }

    #[test]
    fn test_failures_exhaust_attempts() {
        let cache = NodeCache::new(Arc::new(CborCodec), 2);
        let issuer = CountingIssuer::default();
        let hash = NodeHash::digest(b"flaky");

        cache.request_fetch(&hash, &issuer).unwrap();
        let first = cache.on_fetch_complete(&hash, Err(FetchError::NotFound(hash.clone())));
        assert_eq!(first, FetchCompletion::Failed { attempts: 1, exhausted: false });
        assert!(matches!(cache.lookup(&hash), NodeLookup::Unusable { exhausted: false }));

        assert!(cache.request_fetch(&hash, &issuer).unwrap().issued());
        // Corrupted bytes count as a failure too.
        cache.on_fetch_complete(&hash, Ok(Bytes::from_static(&[0xff])));
        assert!(matches!(cache.lookup(&hash), NodeLookup::Unusable { exhausted: true }));

        assert_eq!(cache.request_fetch(&hash, &issuer).unwrap(), FetchRequest::Exhausted);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_insert_raw() {
        let cache = NodeCache::default();
        let (hash, bytes) = CborCodec.encode_with_hash(&leaf_node("/a"));
        assert_eq!(cache.insert_raw(bytes).unwrap(), hash);
        assert!(matches!(cache.lookup(&hash), NodeLookup::Ready(_)));

        let err = cache
            .insert_raw(Bytes::from_static(&[0x85, 0x01]))
            .unwrap_err();
        assert!(matches!(err, CodecError::Decoding(_)));
    }

    #[test]
    fn test_insert_node_matches_codec_hash() {
        let cache = NodeCache::default();
        let node = leaf_node("/b");
        let (expected, _) = CborCodec.encode_with_hash(&node);
        assert_eq!(cache.insert_node(node), expected);
        assert!(matches!(cache.lookup(&expected), NodeLookup::Ready(_)));
    }

    #[test]
    fn test_coverage_is_sticky() {
        let cache = NodeCache::default();
        let hash = NodeHash::digest(b"x");
        assert!(!cache.is_covered(&hash));
        cache.mark_covered(&hash);
        assert!(cache.is_covered(&hash));
        cache.on_fetch_complete(&hash, Err(FetchError::Shutdown));
        assert!(cache.is_covered(&hash));
    }
}
