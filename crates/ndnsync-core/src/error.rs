//! Error types for ndnsync core.

use thiserror::Error;

use crate::hash::NodeHash;

/// Errors raised while decoding or verifying a sync tree node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("unsupported node format version: {0}")]
    UnsupportedVersion(u64),

    #[error("malformed node: {0}")]
    MalformedNode(String),

    #[error("{0} trailing bytes after node")]
    TrailingBytes(usize),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: NodeHash, actual: NodeHash },
}

/// Errors raised while parsing a name URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name URI must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("invalid percent escape in name URI: {0:?}")]
    InvalidEscape(String),
}
