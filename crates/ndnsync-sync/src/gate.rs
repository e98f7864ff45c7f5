//! Single-slot run gate.
//!
//! At most one comparator run is in flight. A run requested while another
//! is active is not queued; it sets a flag, and the active run goes around
//! once more before releasing the gate.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct GateState {
    running: bool,
    rerun: bool,
}

/// Exclusive token for comparator runs with a deferred-retry flag.
#[derive(Debug, Default)]
pub struct RunGate {
    state: Mutex<GateState>,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate. If it is held, record a rerun request and return false.
    pub fn try_begin(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.running {
            state.rerun = true;
            return false;
        }
        state.running = true;
        true
    }

    /// End a run. Returns true, keeping the gate, if a rerun was requested
    /// meanwhile; the caller must then run again and call `finish` again.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.rerun {
            state.rerun = false;
            return true;
        }
        state.running = false;
        false
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive() {
        let gate = RunGate::new();
        assert!(gate.try_begin());
        assert!(gate.is_running());
        assert!(!gate.try_begin());
    }

    #[test]
    fn test_rerun_is_bounded() {
        let gate = RunGate::new();
        assert!(gate.try_begin());
        // Several requests while busy collapse into one rerun.
        assert!(!gate.try_begin());
        assert!(!gate.try_begin());
        assert!(gate.finish());
        assert!(gate.is_running());
        assert!(!gate.finish());
        assert!(!gate.is_running());
        assert!(gate.try_begin());
    }
}
