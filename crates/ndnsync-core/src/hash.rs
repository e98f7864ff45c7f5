//! Node hashes.
//!
//! A sync tree node is identified by a hash over its encoded bytes. The
//! comparator only needs hashes to be comparable byte strings, so the type
//! does not fix a length.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the Blake3 digests produced by [`NodeHash::digest`].
pub const DIGEST_LEN: usize = 32;

/// Opaque identifier of a sync tree node, ordered byte-wise.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHash(Bytes);

impl NodeHash {
    /// Compute the Blake3 hash of encoded node bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(blake3::hash(data).as_bytes()))
    }

    /// Wrap raw hash bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Copy raw hash bytes from a slice.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(s)?.into()))
    }

    fn short_hex(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(16);
        hex
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({})", self.short_hex())
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_hex())
    }
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for NodeHash {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self::from_slice(&bytes)
    }
}

impl From<Vec<u8>> for NodeHash {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for NodeHash {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}
