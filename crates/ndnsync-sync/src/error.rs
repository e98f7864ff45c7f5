//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Node fetch failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] ndnsync_cache::FetchError),

    /// Node bytes did not decode.
    #[error("codec error: {0}")]
    Codec(#[from] ndnsync_core::CodecError),

    /// A peer's tree violates the ordering rules.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// No async runtime available, or the scheduler task failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
