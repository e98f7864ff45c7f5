//! Error types for node fetching.

use std::time::Duration;

use ndnsync_core::{CodecError, NodeHash};
use thiserror::Error;

/// Errors that can occur while fetching a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The transport failed to deliver the request or the reply.
    #[error("transport error: {0}")]
    Transport(String),

    /// No peer could supply the node.
    #[error("node not found: {0}")]
    NotFound(NodeHash),

    /// No reply within the fetch timeout.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The reply did not decode as a node.
    #[error("invalid node content: {0}")]
    Invalid(#[from] CodecError),

    /// The fetcher is shutting down.
    #[error("fetcher shut down")]
    Shutdown,
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
