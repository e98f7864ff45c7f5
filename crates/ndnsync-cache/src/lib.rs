//! # ndnsync Cache
//!
//! The node cache for the ndnsync comparator. Every sync tree node ever
//! referenced gets one [`TreeEntry`], keyed by its hash, holding the node's
//! body (raw, decoded, or unusable) and its fetch and coverage status.
//!
//! ## Key Types
//!
//! - [`NodeCache`] - Hash-indexed entry table with fetch deduplication
//! - [`TreeEntry`] - Cached state of one node
//! - [`TreeCursor`] - One view's position inside one node
//! - [`FetchIssuer`] - Non-blocking capability that starts node fetches
//!
//! ## Design Notes
//!
//! - **One fetch per hash**: a second request while one is outstanding is a no-op
//! - **Lazy decode**: raw bytes are decoded and hash-verified on first use
//! - **Sticky coverage**: once a subtree is known to be covered it stays covered
//! - **No eviction**: entries live as long as the cache

pub mod cache;
pub mod cursor;
pub mod entry;
pub mod error;
pub mod traits;

pub use cache::{
    EntryHandle, FetchCompletion, FetchRequest, NodeCache, NodeLookup, DEFAULT_MAX_FETCH_ATTEMPTS,
};
pub use cursor::TreeCursor;
pub use entry::{Body, TreeEntry};
pub use error::{FetchError, Result};
pub use traits::FetchIssuer;
