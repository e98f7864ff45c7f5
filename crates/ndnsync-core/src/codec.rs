//! Deterministic node encoding.
//!
//! Nodes are encoded as a definite-length CBOR array:
//!
//! ```text
//! [ version, leaf_count, min_name, max_name, [ element, ... ] ]
//!
//! name    = [ bstr, ... ]          ; one byte string per component
//! element = [ 0, name ]            ; leaf
//!         / [ 1, bstr ]            ; child reference (hash)
//! ```
//!
//! Integers use their smallest encoding and all lengths are definite, so a
//! node always encodes to the same bytes and thus the same hash on every
//! platform. Decoding goes through `ciborium` and rejects trailing bytes.

use bytes::Bytes;
use ciborium::value::Value;

use crate::error::CodecError;
use crate::hash::NodeHash;
use crate::name::{Component, Name};
use crate::node::{Element, SyncNode};

/// Current node format version.
pub const NODE_FORMAT_VERSION: u64 = 1;

mod tags {
    pub const LEAF: u64 = 0;
    pub const REF: u64 = 1;
}

/// Encoding and hashing of sync tree nodes.
///
/// Implementations must be deterministic: equal nodes encode to equal bytes.
pub trait NodeCodec: Send + Sync {
    /// Decode node bytes. Malformed input is an error, never a panic.
    fn decode(&self, bytes: &[u8]) -> Result<SyncNode, CodecError>;

    /// Encode a node.
    fn encode(&self, node: &SyncNode) -> Bytes;

    /// Hash of encoded node bytes.
    fn hash(&self, bytes: &[u8]) -> NodeHash {
        NodeHash::digest(bytes)
    }

    /// Encode a node and compute its hash.
    fn encode_with_hash(&self, node: &SyncNode) -> (NodeHash, Bytes) {
        let bytes = self.encode(node);
        (self.hash(&bytes), bytes)
    }

    /// Decode bytes that are expected to hash to `expected`.
    fn decode_verified(&self, expected: &NodeHash, bytes: &[u8]) -> Result<SyncNode, CodecError> {
        let actual = self.hash(bytes);
        if &actual != expected {
            return Err(CodecError::HashMismatch {
                expected: expected.clone(),
                actual,
            });
        }
        self.decode(bytes)
    }
}

/// Reference codec: canonical CBOR with BLAKE3 hashes.
#[derive(Clone, Copy, Debug, Default)]
pub struct CborCodec;

impl NodeCodec for CborCodec {
    fn decode(&self, bytes: &[u8]) -> Result<SyncNode, CodecError> {
        let mut cursor = std::io::Cursor::new(bytes);
        let value: Value = ciborium::from_reader(&mut cursor)
            .map_err(|e| CodecError::Decoding(e.to_string()))?;

        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(CodecError::TrailingBytes(bytes.len() - consumed));
        }

        value_to_node(&value)
    }

    fn encode(&self, node: &SyncNode) -> Bytes {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 4, 5);
        encode_uint(&mut buf, 0, NODE_FORMAT_VERSION);
        encode_uint(&mut buf, 0, node.leaf_count());
        encode_name(&mut buf, node.min_name());
        encode_name(&mut buf, node.max_name());

        encode_uint(&mut buf, 4, node.len() as u64);
        for element in node.elements() {
            encode_uint(&mut buf, 4, 2);
            match element {
                Element::Leaf(name) => {
                    encode_uint(&mut buf, 0, tags::LEAF);
                    encode_name(&mut buf, name);
                }
                Element::Ref(hash) => {
                    encode_uint(&mut buf, 0, tags::REF);
                    encode_bytes(&mut buf, hash.as_bytes());
                }
            }
        }
        buf.into()
    }
}

/// Encode an unsigned integer with the given major type.
pub(crate) fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a name as an array of byte strings.
pub(crate) fn encode_name(buf: &mut Vec<u8>, name: &Name) {
    encode_uint(buf, 4, name.len() as u64);
    for component in name.components() {
        encode_bytes(buf, component.as_bytes());
    }
}

fn value_to_node(value: &Value) -> Result<SyncNode, CodecError> {
    let fields = match value {
        Value::Array(fields) if fields.len() == 5 => fields,
        Value::Array(fields) => {
            return Err(CodecError::MalformedNode(format!(
                "expected 5 fields, got {}",
                fields.len()
            )))
        }
        _ => return Err(CodecError::MalformedNode("expected array".into())),
    };

    let version = value_to_uint(&fields[0], "version")?;
    if version != NODE_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let leaf_count = value_to_uint(&fields[1], "leaf_count")?;
    let min_name = value_to_name(&fields[2])?;
    let max_name = value_to_name(&fields[3])?;

    let items = match &fields[4] {
        Value::Array(items) => items,
        _ => return Err(CodecError::MalformedNode("invalid elements".into())),
    };

    let mut elements = Vec::with_capacity(items.len());
    for item in items {
        elements.push(value_to_element(item)?);
    }

    Ok(SyncNode::new(elements, min_name, max_name, leaf_count))
}

fn value_to_uint(value: &Value, field: &str) -> Result<u64, CodecError> {
    match value {
        Value::Integer(i) => u64::try_from(i128::from(*i))
            .map_err(|_| CodecError::MalformedNode(format!("negative {}", field))),
        _ => Err(CodecError::MalformedNode(format!("missing {}", field))),
    }
}

fn value_to_name(value: &Value) -> Result<Name, CodecError> {
    let parts = match value {
        Value::Array(parts) => parts,
        _ => return Err(CodecError::MalformedNode("invalid name".into())),
    };

    let mut components = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            Value::Bytes(b) => components.push(Component::from_slice(b)),
            _ => return Err(CodecError::MalformedNode("invalid name component".into())),
        }
    }
    Ok(Name::from_components(components))
}

fn value_to_element(value: &Value) -> Result<Element, CodecError> {
    let pair = match value {
        Value::Array(pair) if pair.len() == 2 => pair,
        _ => return Err(CodecError::MalformedNode("invalid element".into())),
    };

    match value_to_uint(&pair[0], "element tag")? {
        tags::LEAF => Ok(Element::Leaf(value_to_name(&pair[1])?)),
        tags::REF => match &pair[1] {
            Value::Bytes(b) if !b.is_empty() => Ok(Element::Ref(NodeHash::from_slice(b))),
            _ => Err(CodecError::MalformedNode("invalid child hash".into())),
        },
        tag => Err(CodecError::MalformedNode(format!(
            "unknown element tag: {}",
            tag
        ))),
    }
}
