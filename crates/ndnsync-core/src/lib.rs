//! # ndnsync Core
//!
//! Pure primitives for the ndnsync set-reconciliation engine: content names,
//! node hashes, sync tree nodes and their canonical encoding.
//!
//! This crate contains no I/O, no caching, no scheduling. It is pure
//! computation over the data structures both peers agree on.
//!
//! ## Key Types
//!
//! - [`Name`] - Hierarchical content name, totally ordered component-wise
//! - [`NodeHash`] - Content-addressed identifier of a sync tree node
//! - [`SyncNode`] - Decoded body of one tree node: leaves, references, name range
//! - [`Slice`] - The namespace slice a sync session covers
//!
//! ## Encoding
//!
//! Nodes are encoded as deterministic CBOR arrays. See [`codec`] module.

pub mod codec;
pub mod error;
pub mod hash;
pub mod name;
pub mod node;
pub mod slice;

pub use codec::{CborCodec, NodeCodec, NODE_FORMAT_VERSION};
pub use error::{CodecError, NameError};
pub use hash::NodeHash;
pub use name::{Component, Name};
pub use node::{Element, SyncNode};
pub use slice::{parse_node_fetch_name, Slice, SliceId, NODE_FETCH_MARKER};
