//! Namespace slices.
//!
//! A slice is the part of the namespace a sync session reconciles: every
//! name under `prefix`, minus names under any of the `filters`, advertised
//! within the routing space `topo`. Both peers identify a slice by its
//! [`SliceId`], a hash of the slice's canonical encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{encode_name, encode_uint};
use crate::hash::NodeHash;
use crate::name::{Component, Name};

/// Marker component separating the topo prefix from a node fetch request.
pub const NODE_FETCH_MARKER: &[u8] = b"\xC1.S.nf";

/// A 32-byte slice identifier.
///
/// Derived from Blake3 over the slice's canonical CBOR encoding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SliceId(pub [u8; 32]);

impl SliceId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for SliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SliceId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for SliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for SliceId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for SliceId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A namespace slice.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slice {
    /// Routing prefix under which sync traffic for this slice flows.
    pub topo: Name,
    /// Common prefix of every name in the slice.
    pub prefix: Name,
    /// Names under any of these prefixes are excluded.
    #[serde(default)]
    pub filters: Vec<Name>,
}

impl Slice {
    pub fn new(topo: Name, prefix: Name) -> Self {
        Self {
            topo,
            prefix,
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Name>) -> Self {
        self.filters = filters;
        self
    }

    /// Stable identifier of this slice.
    pub fn id(&self) -> SliceId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"ndnsync-slice-v1:");
        hasher.update(&self.canonical_bytes());
        SliceId(*hasher.finalize().as_bytes())
    }

    /// Canonical CBOR encoding: `[topo, prefix, [filter, ...]]`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 4, 3);
        encode_name(&mut buf, &self.topo);
        encode_name(&mut buf, &self.prefix);
        encode_uint(&mut buf, 4, self.filters.len() as u64);
        for filter in &self.filters {
            encode_name(&mut buf, filter);
        }
        buf
    }

    /// Whether `name` belongs to this slice.
    pub fn includes(&self, name: &Name) -> bool {
        self.prefix.is_prefix_of(name) && !self.filters.iter().any(|f| f.is_prefix_of(name))
    }

    /// Name under which a peer serves the node with the given hash.
    ///
    /// Layout: `<topo>/<NODE_FETCH_MARKER>/<slice id>/<node hash>`.
    pub fn node_fetch_name(&self, hash: &NodeHash) -> Name {
        let mut name = self.topo.clone();
        name.push(Component::from_slice(NODE_FETCH_MARKER));
        name.push(Component::from_slice(self.id().as_bytes()));
        name.push(Component::from_slice(hash.as_bytes()));
        name
    }
}

/// Recover the slice id and node hash from a node fetch name.
///
/// The marker may appear at any depth, since the topo prefix has arbitrary
/// length. Components after the hash (versions, segments) are ignored.
pub fn parse_node_fetch_name(name: &Name) -> Option<(SliceId, NodeHash)> {
    let marker = name.position_of(NODE_FETCH_MARKER)?;
    let slice = SliceId::from_slice(name.component(marker + 1)?.as_bytes())?;
    let hash = name.component(marker + 2)?;
    if hash.is_empty() {
        return None;
    }
    Some((slice, NodeHash::from_slice(hash.as_bytes())))
}
