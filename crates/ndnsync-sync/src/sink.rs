//! Delivery of newly discovered names.

use ndnsync_core::{Name, Slice};

/// Receives each new name once, with the digest component stripped.
///
/// Called from the comparator's blocking thread after its locks are
/// released; implementations should hand work off rather than block.
pub trait NameSink: Send + Sync {
    fn handle_name(&self, slice: &Slice, name: &Name);
}

impl<F> NameSink for F
where
    F: Fn(&Slice, &Name) + Send + Sync,
{
    fn handle_name(&self, slice: &Slice, name: &Name) {
        self(slice, name)
    }
}
