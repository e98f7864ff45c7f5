//! Per-slice run scheduler.
//!
//! One tokio task per slice owns the right to run its comparator. Kicks
//! store a single permit on a [`Notify`]. Kicks that land during the
//! debounce sleep are absorbed into the run that follows it; kicks that land
//! during a run collapse into exactly one follow-up run. The comparator runs
//! on the blocking pool.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::comparator::Comparator;

/// Cheap, cloneable handle that asks a slice's scheduler to run.
#[derive(Debug, Clone, Default)]
pub struct KickHandle {
    notify: Arc<Notify>,
}

impl KickHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a comparator run. Never blocks.
    pub fn kick(&self) {
        self.notify.notify_one();
    }

    async fn kicked(&self) {
        self.notify.notified().await;
    }

    /// Consume a permit stored while debouncing, if any.
    async fn absorb(&self) {
        let _ = tokio::time::timeout(Duration::ZERO, self.kicked()).await;
    }
}

/// Owns the scheduler task; dropping it stops the task.
#[derive(Debug)]
pub struct Scheduler {
    task: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the scheduler task for `comparator`.
    ///
    /// The task holds only a weak reference and exits once the comparator
    /// is gone.
    pub fn spawn(
        runtime: &Handle,
        comparator: Weak<Comparator>,
        kick: KickHandle,
        debounce: Duration,
    ) -> Self {
        let task = runtime.spawn(async move {
            loop {
                kick.kicked().await;
                if !debounce.is_zero() {
                    tokio::time::sleep(debounce).await;
                    kick.absorb().await;
                }

                let Some(comparator) = comparator.upgrade() else {
                    break;
                };
                let slice = comparator.slice_id();
                match tokio::task::spawn_blocking(move || comparator.run()).await {
                    Ok(outcome) => trace!(slice = %slice, outcome = ?outcome, "comparator run"),
                    Err(e) => {
                        warn!(slice = %slice, error = %e, "comparator run failed");
                        break;
                    }
                }
            }
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}
