//! Tree entries: the cached state of one node, keyed by hash.

use std::sync::Arc;

use bytes::Bytes;
use ndnsync_core::{NodeCodec, NodeHash, SyncNode};
use tracing::warn;

/// What the cache holds for a node.
#[derive(Debug, Clone)]
pub enum Body {
    /// Nothing yet; a fetch may be pending.
    Absent,
    /// Bytes received but not yet decoded.
    Raw(Bytes),
    /// Decoded body, shared with any cursors walking it.
    Decoded(Arc<SyncNode>),
    /// The last bytes received were malformed or the fetch failed.
    Unusable,
}

/// Cached state of one sync tree node.
///
/// Created as a placeholder the first time a hash is referenced. `covered`
/// only ever goes from false to true.
#[derive(Debug)]
pub struct TreeEntry {
    hash: NodeHash,
    body: Body,
    covered: bool,
    fetch_pending: bool,
    failures: u32,
    last_error: Option<String>,
}

impl TreeEntry {
    pub fn new(hash: NodeHash) -> Self {
        Self {
            hash,
            body: Body::Absent,
            covered: false,
            fetch_pending: false,
            failures: 0,
            last_error: None,
        }
    }

    pub fn hash(&self) -> &NodeHash {
        &self.hash
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Attach an already decoded body.
    pub fn attach_body(&mut self, node: Arc<SyncNode>) {
        self.body = Body::Decoded(node);
        self.fetch_pending = false;
    }

    /// Attach raw bytes; decoding happens on first access.
    ///
    /// Ignored when a decoded body is already present.
    pub fn attach_raw(&mut self, bytes: Bytes) {
        if matches!(self.body, Body::Decoded(_)) {
            return;
        }
        self.body = Body::Raw(bytes);
        self.fetch_pending = false;
    }

    /// The decoded body, decoding raw bytes on first access.
    ///
    /// A decode failure, or bytes that do not hash to this entry's hash, makes
    /// the entry unusable and drops the bytes, so only a fresh fetch can
    /// recover it.
    pub fn node(&mut self, codec: &dyn NodeCodec) -> Option<Arc<SyncNode>> {
        let bytes = match &self.body {
            Body::Decoded(node) => return Some(Arc::clone(node)),
            Body::Absent | Body::Unusable => return None,
            Body::Raw(bytes) => bytes.clone(),
        };

        match codec.decode_verified(&self.hash, &bytes) {
            Ok(node) => {
                let node = Arc::new(node);
                self.body = Body::Decoded(Arc::clone(&node));
                Some(node)
            }
            Err(e) => {
                warn!(hash = %self.hash, error = %e, "discarding malformed node");
                self.record_failure(e.to_string());
                None
            }
        }
    }

    /// Whether bytes or a decoded body are present.
    pub fn is_resident(&self) -> bool {
        matches!(self.body, Body::Raw(_) | Body::Decoded(_))
    }

    pub fn is_unusable(&self) -> bool {
        matches!(self.body, Body::Unusable)
    }

    pub fn is_covered(&self) -> bool {
        self.covered
    }

    /// Record that every leaf under this node is known.
    pub fn mark_covered(&mut self) {
        self.covered = true;
    }

    pub fn is_fetch_pending(&self) -> bool {
        self.fetch_pending
    }

    pub fn mark_pending(&mut self, pending: bool) {
        self.fetch_pending = pending;
    }

    /// Number of failed fetches or decodes so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a failed fetch or decode. A decoded body is never discarded.
    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.failures += 1;
        self.last_error = Some(reason.into());
        self.fetch_pending = false;
        if !matches!(self.body, Body::Decoded(_)) {
            self.body = Body::Unusable;
        }
    }
}
