//! The sync monitor: one entry point for every slice an application follows.
//!
//! The monitor owns one [`SliceSync`] session per slice, routes root
//! announcements and fetched node content to the right session, and tears
//! a session down when the application stops following its slice.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use ndnsync_cache::FetchCompletion;
use ndnsync_core::{parse_node_fetch_name, CborCodec, Name, NodeCodec, NodeHash, Slice, SliceId};
use ndnsync_sync::{
    CompareOptions, CompareState, CompareStats, NameSink, NodeFetcher, SliceSync, SyncConfig,
};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{MonitorError, Result};

/// Configuration for the monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Settings applied to every slice session.
    pub sync: SyncConfig,
}

impl MonitorConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Follows a set of slices and reports new names in each.
pub struct SyncMonitor {
    runtime: Handle,
    fetcher: Arc<dyn NodeFetcher>,
    codec: Arc<dyn NodeCodec>,
    config: MonitorConfig,
    sessions: RwLock<HashMap<SliceId, SliceSync>>,
}

impl SyncMonitor {
    /// Create a monitor that runs its sessions on `runtime`.
    pub fn new(runtime: Handle, fetcher: Arc<dyn NodeFetcher>, config: MonitorConfig) -> Self {
        Self::with_codec(runtime, fetcher, Arc::new(CborCodec), config)
    }

    /// Create a monitor with a custom node codec.
    pub fn with_codec(
        runtime: Handle,
        fetcher: Arc<dyn NodeFetcher>,
        codec: Arc<dyn NodeCodec>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            runtime,
            fetcher,
            codec,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start following `slice`. New names are handed to `sink`.
    pub fn start_sync(
        &self,
        slice: Slice,
        sink: Arc<dyn NameSink>,
        options: CompareOptions,
    ) -> Result<SliceId> {
        let id = slice.id();
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            return Err(MonitorError::AlreadySyncing(id));
        }

        info!(slice = %id, prefix = %slice.prefix, start = ?options.start, "starting sync");
        let session = SliceSync::spawn_with_codec(
            &self.runtime,
            Arc::clone(&self.codec),
            slice,
            Arc::clone(&self.fetcher),
            sink,
            options,
            &self.config.sync,
        );
        sessions.insert(id, session);
        Ok(id)
    }

    /// Stop following a slice. Returns false if it was not followed.
    pub fn stop_sync(&self, id: &SliceId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(_) => {
                info!(slice = %id, "stopped sync");
                true
            }
            None => false,
        }
    }

    pub fn is_syncing(&self, id: &SliceId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Every slice currently followed.
    pub fn active_slices(&self) -> Vec<SliceId> {
        let mut ids: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inputs
    // ─────────────────────────────────────────────────────────────────────────

    /// A new root hash was announced for a slice.
    pub fn announce_root(&self, id: &SliceId, root: NodeHash) -> Result<()> {
        self.with_session(id, |session| {
            debug!(slice = %id, root = %root, "root announced");
            session.add_root(root);
        })
    }

    /// A root body was delivered inline for a slice.
    pub fn deliver_root_body(&self, id: &SliceId, bytes: Bytes) -> Result<()> {
        self.with_session(id, |session| {
            debug!(slice = %id, len = bytes.len(), "root body delivered");
            session.add_root_body(bytes);
        })
    }

    /// Route a named node content object to the slice it was fetched for.
    ///
    /// The name must be a node fetch name built by
    /// [`Slice::node_fetch_name`].
    pub fn handle_node_content(&self, name: &Name, bytes: Bytes) -> Result<FetchCompletion> {
        let (id, hash) =
            parse_node_fetch_name(name).ok_or_else(|| MonitorError::NotNodeContent(name.clone()))?;
        self.with_session(&id, |session| session.deliver_node(&hash, bytes))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn stats(&self, id: &SliceId) -> Option<CompareStats> {
        self.with_session(id, SliceSync::stats).ok()
    }

    pub fn state(&self, id: &SliceId) -> Option<CompareState> {
        self.with_session(id, SliceSync::state).ok()
    }

    /// The last fully reconciled root of a slice.
    pub fn baseline(&self, id: &SliceId) -> Option<NodeHash> {
        self.with_session(id, SliceSync::baseline).ok().flatten()
    }

    fn with_session<T>(&self, id: &SliceId, f: impl FnOnce(&SliceSync) -> T) -> Result<T> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get(id).ok_or(MonitorError::UnknownSlice(*id))?;
        Ok(f(session))
    }
}

impl Drop for SyncMonitor {
    fn drop(&mut self) {
        let count = self
            .sessions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        debug!(sessions = count, "sync monitor stopped");
    }
}
