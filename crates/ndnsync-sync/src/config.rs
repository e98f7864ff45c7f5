//! Configuration for sync sessions and comparators.

use std::time::Duration;

use ndnsync_cache::DEFAULT_MAX_FETCH_ATTEMPTS;
use ndnsync_core::{Name, NodeHash};
use serde::{Deserialize, Serialize};

/// Configuration for sync behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after a kick before the comparator runs, so bursts of
    /// fetch completions collapse into one run.
    #[serde(with = "millis", rename = "debounce_ms")]
    pub debounce: Duration,
    /// Timeout for a single node fetch.
    #[serde(with = "millis", rename = "fetch_timeout_ms")]
    pub fetch_timeout: Duration,
    /// Failed fetches or decodes after which a node is given up on.
    pub max_fetch_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            fetch_timeout: Duration::from_secs(30),
            max_fetch_attempts: DEFAULT_MAX_FETCH_ATTEMPTS,
        }
    }
}

/// Where a comparator's baseline starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StartPoint {
    /// No baseline: every name in the first root is new.
    #[default]
    Empty,
    /// Resume from a known root: only names not under it are new.
    Root(NodeHash),
    /// Adopt the first root body delivered as the baseline, emitting nothing
    /// for it.
    CurrentRoot,
}

/// Per-comparator options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareOptions {
    pub start: StartPoint,
    /// Suppress callbacks until this (digest-stripped) name is emitted.
    pub start_name: Option<Name>,
}

impl CompareOptions {
    pub fn starting_at(start: StartPoint) -> Self {
        Self {
            start,
            start_name: None,
        }
    }

    pub fn with_start_name(mut self, name: Name) -> Self {
        self.start_name = Some(name);
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
