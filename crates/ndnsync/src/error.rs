//! Error types for the sync monitor.

use ndnsync_core::{Name, SliceId};
use thiserror::Error;

/// Errors that can occur during monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No session for this slice.
    #[error("not syncing slice {0}")]
    UnknownSlice(SliceId),

    /// A session for this slice is already running.
    #[error("already syncing slice {0}")]
    AlreadySyncing(SliceId),

    /// A content name that is not a node fetch reply.
    #[error("not a node fetch name: {0}")]
    NotNodeContent(Name),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
