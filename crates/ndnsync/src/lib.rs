//! # ndnsync
//!
//! Sync client for named-data namespaces: learns which content names a
//! peer holds that this node does not, by reconciling successive snapshots
//! of a namespace slice encoded as hash trees.
//!
//! ## Overview
//!
//! - **Slices**: a routing prefix plus the namespace prefix being synced
//! - **Roots**: peers announce the root hash of their current tree
//! - **Nodes**: fetched on demand by hash and decoded lazily
//! - **Names**: every name new since the last reconciled root is reported once
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ndnsync::{CompareOptions, MonitorConfig, SyncMonitor};
//! use ndnsync::core::{Name, Slice};
//! use ndnsync::sync::memory::MemoryNodeStore;
//!
//! async fn example() {
//!     let fetcher = Arc::new(MemoryNodeStore::new());
//!     let monitor = SyncMonitor::new(
//!         tokio::runtime::Handle::current(),
//!         fetcher,
//!         MonitorConfig::default(),
//!     );
//!
//!     let slice = Slice::new(
//!         Name::from_uri("/topo").unwrap(),
//!         Name::from_uri("/app").unwrap(),
//!     );
//!     let sink = Arc::new(|_: &Slice, name: &Name| println!("new: {}", name));
//!     let id = monitor
//!         .start_sync(slice, sink, CompareOptions::default())
//!         .unwrap();
//!
//!     // monitor.announce_root(&id, root_hash).unwrap();
//!     monitor.stop_sync(&id);
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `ndnsync::core` - Names, nodes, the node codec and slices
//! - `ndnsync::cache` - The node cache and tree cursors
//! - `ndnsync::sync` - The comparator, scheduler and sessions

pub mod error;
pub mod monitor;

// Re-export component crates
pub use ndnsync_cache as cache;
pub use ndnsync_core as core;
pub use ndnsync_sync as sync;

// Re-export main types for convenience
pub use error::{MonitorError, Result};
pub use monitor::{MonitorConfig, SyncMonitor};

// Re-export commonly used types
pub use ndnsync_core::{Name, NodeHash, Slice, SliceId, SyncNode};
pub use ndnsync_sync::{
    CompareOptions, CompareState, CompareStats, NameSink, NodeFetcher, StartPoint, SyncConfig,
};
