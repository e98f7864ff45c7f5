//! # ndnsync Sync
//!
//! Incremental set reconciliation between two snapshots of a namespace
//! slice, each encoded as a sorted hash tree of content names.
//!
//! ## Overview
//!
//! A [`Comparator`] walks the newest announced root (the "next" view)
//! against the last reconciled root (the "current" view) and reports every
//! name the current view lacks. Nodes are fetched on demand and the walk
//! pauses instead of blocking when one is missing. A per-slice
//! [`Scheduler`] debounces kicks and guarantees one run at a time.
//!
//! ## Key Properties
//!
//! - **Exactly once**: each new name is reported once across rounds
//! - **Lazy**: identical or covered subtrees are never fetched or entered
//! - **Resumable**: a paused walk continues where it stopped on the next kick
//! - **Fault-local**: a corrupted node stalls only its own branch
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ndnsync_core::{Name, Slice};
//! use ndnsync_sync::{memory::MemoryNodeStore, CompareOptions, SliceSync, SyncConfig};
//!
//! async fn example() {
//!     let slice = Slice::new(Name::from_uri("/topo").unwrap(), Name::from_uri("/app").unwrap());
//!     let fetcher = Arc::new(MemoryNodeStore::new());
//!     let sink = Arc::new(|_: &Slice, name: &Name| println!("new: {}", name));
//!
//!     let session = SliceSync::spawn(
//!         &tokio::runtime::Handle::current(),
//!         slice,
//!         fetcher,
//!         sink,
//!         CompareOptions::default(),
//!         &SyncConfig::default(),
//!     );
//!     // session.add_root(hash);
//! }
//! ```

pub mod comparator;
pub mod config;
pub mod error;
pub mod fetch;
mod fold;
pub mod gate;
pub mod scheduler;
pub mod session;
pub mod sink;
mod walk;

pub use comparator::{CompareState, CompareStats, Comparator, RunOutcome};
pub use config::{CompareOptions, StartPoint, SyncConfig};
pub use error::{Result, SyncError};
pub use fetch::{memory, NodeFetcher, TaskIssuer};
pub use gate::RunGate;
pub use scheduler::{KickHandle, Scheduler};
pub use session::SliceSync;
pub use sink::NameSink;
