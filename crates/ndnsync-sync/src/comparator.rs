//! Comparator: the per-slice reconciliation state machine.
//!
//! A comparator repeatedly takes the best pending root, walks it against
//! the baseline, and reports names the baseline does not have. Each call to
//! [`Comparator::run`] advances the machine as far as it can without
//! waiting:
//!
//! ```text
//!   Init ──> Preload ──> Compare ──> Done
//!    ^  \                             |
//!    |   `-- (nothing selectable) --> |
//!    `-------- (new candidate) -------'
//! ```
//!
//! A run that needs a missing node requests it and returns; the next kick
//! resumes exactly where it stopped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use ndnsync_cache::{FetchIssuer, NodeCache, NodeLookup};
use ndnsync_core::{Name, NodeHash, Slice, SliceId};
use tracing::{debug, info, warn};

use crate::config::{CompareOptions, StartPoint};
use crate::fold::fold;
use crate::gate::RunGate;
use crate::sink::NameSink;
use crate::walk::{request_node, MergeWalk, WalkProgress, WalkState};

/// Comparator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareState {
    /// Selecting the next root to reconcile.
    Init,
    /// Fetching the root and its immediate children.
    Preload,
    /// Walking the trees.
    Compare,
    /// Nothing to do until a new root arrives.
    Done,
}

/// What a call to [`Comparator::run`] ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No round in progress and nothing pending.
    Idle,
    /// Waiting for node fetches.
    Waiting,
    /// The round cannot progress: the nodes it needs are unobtainable.
    Stalled,
    /// The round was aborted on a malformed tree.
    Faulted,
    /// Another run was in progress; it will go around again.
    Busy,
}

/// Counters for one comparator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareStats {
    /// Passes through the state machine, including gate re-runs.
    pub runs: u64,
    pub rounds_completed: u64,
    pub rounds_aborted: u64,
    pub names_emitted: u64,
    pub faults: u64,
    pub fetches_issued: u64,
}

/// Roots waiting for the next round.
#[derive(Debug, Default)]
struct PendingQueue {
    roots: Vec<NodeHash>,
    bodies: Vec<Bytes>,
    /// Root of the round in progress, mirrored here for deduplication.
    active: Option<NodeHash>,
}

/// Walk state plus the round-level bookkeeping around it.
#[derive(Debug)]
struct Machine {
    state: CompareState,
    round_root: Option<NodeHash>,
    awaiting_current_root: bool,
    walk: WalkState,
}

/// Reconciles successive roots of one slice against a moving baseline.
pub struct Comparator {
    slice: Slice,
    slice_id: SliceId,
    cache: Arc<NodeCache>,
    issuer: Arc<dyn FetchIssuer>,
    sink: Arc<dyn NameSink>,
    gate: RunGate,
    pending: Mutex<PendingQueue>,
    machine: Mutex<Machine>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Comparator {
    pub fn new(
        slice: Slice,
        cache: Arc<NodeCache>,
        issuer: Arc<dyn FetchIssuer>,
        sink: Arc<dyn NameSink>,
        options: CompareOptions,
    ) -> Self {
        let (baseline, awaiting_current_root) = match options.start {
            StartPoint::Empty => (None, false),
            StartPoint::Root(hash) => (Some(hash), false),
            StartPoint::CurrentRoot => (None, true),
        };
        let walk = WalkState {
            baseline,
            start_name: options.start_name,
            ..WalkState::default()
        };

        Self {
            slice_id: slice.id(),
            slice,
            cache,
            issuer,
            sink,
            gate: RunGate::new(),
            pending: Mutex::new(PendingQueue::default()),
            machine: Mutex::new(Machine {
                state: CompareState::Init,
                round_root: None,
                awaiting_current_root,
                walk,
            }),
        }
    }

    pub fn slice(&self) -> &Slice {
        &self.slice
    }

    pub fn slice_id(&self) -> SliceId {
        self.slice_id
    }

    pub fn cache(&self) -> &Arc<NodeCache> {
        &self.cache
    }

    /// Queue a root hash. Returns false if it is already queued or being
    /// compared.
    pub fn add_pending_root(&self, hash: NodeHash) -> bool {
        let mut pending = locked(&self.pending);
        if pending.roots.contains(&hash) || pending.active.as_ref() == Some(&hash) {
            return false;
        }
        debug!(slice = %self.slice_id, root = %hash, "root queued");
        pending.roots.push(hash);
        true
    }

    /// Queue an inline root body; it is decoded at the next round start.
    pub fn add_pending_body(&self, bytes: Bytes) {
        locked(&self.pending).bodies.push(bytes);
    }

    pub fn state(&self) -> CompareState {
        locked(&self.machine).state
    }

    pub fn stats(&self) -> CompareStats {
        locked(&self.machine).walk.stats
    }

    /// Root of the baseline view, if any.
    pub fn baseline(&self) -> Option<NodeHash> {
        locked(&self.machine).walk.baseline.clone()
    }

    /// Root of the round in progress, if any.
    pub fn round_root(&self) -> Option<NodeHash> {
        locked(&self.machine).round_root.clone()
    }

    /// Advance the state machine as far as possible without waiting.
    ///
    /// New names are delivered to the sink after the comparator's locks are
    /// released.
    pub fn run(&self) -> RunOutcome {
        if !self.gate.try_begin() {
            return RunOutcome::Busy;
        }
        loop {
            let mut outbox = Vec::new();
            let outcome = {
                let mut machine = locked(&self.machine);
                machine.walk.stats.runs += 1;
                self.drive(&mut machine, &mut outbox)
            };
            for name in &outbox {
                self.sink.handle_name(&self.slice, name);
            }
            if !self.gate.finish() {
                return outcome;
            }
        }
    }

    fn drive(&self, m: &mut Machine, outbox: &mut Vec<Name>) -> RunOutcome {
        loop {
            match m.state {
                CompareState::Init => {
                    m.state = if self.start_round(m) {
                        CompareState::Preload
                    } else {
                        CompareState::Done
                    };
                    debug!(slice = %self.slice_id, state = ?m.state, "init finished");
                }
                CompareState::Preload => match self.preload(m) {
                    WalkProgress::Complete => m.state = CompareState::Compare,
                    WalkProgress::Paused => return RunOutcome::Waiting,
                    WalkProgress::Stalled => {
                        if let Some(outcome) = self.stalled(m) {
                            return outcome;
                        }
                    }
                },
                CompareState::Compare => {
                    let progress = MergeWalk {
                        cache: &self.cache,
                        issuer: self.issuer.as_ref(),
                        state: &mut m.walk,
                        outbox: &mut *outbox,
                        slice: self.slice_id,
                    }
                    .run();
                    match progress {
                        Ok(WalkProgress::Complete) => self.finish_round(m),
                        Ok(WalkProgress::Paused) => return RunOutcome::Waiting,
                        Ok(WalkProgress::Stalled) => {
                            if let Some(outcome) = self.stalled(m) {
                                return outcome;
                            }
                        }
                        Err(e) => {
                            warn!(slice = %self.slice_id, error = %e, "aborting round");
                            m.walk.stats.faults += 1;
                            self.abort_round(m);
                            return RunOutcome::Faulted;
                        }
                    }
                }
                CompareState::Done => {
                    if self.has_candidate(m) {
                        m.state = CompareState::Init;
                    } else {
                        return RunOutcome::Idle;
                    }
                }
            }
        }
    }

    fn has_candidate(&self, m: &Machine) -> bool {
        let pending = locked(&self.pending);
        !pending.bodies.is_empty() || (!m.awaiting_current_root && !pending.roots.is_empty())
    }

    /// Pick the next round's root. Returns false if nothing is selectable.
    fn start_round(&self, m: &mut Machine) -> bool {
        let mut pending = locked(&self.pending);
        let mut candidates = Vec::new();

        for body in std::mem::take(&mut pending.bodies) {
            match self.cache.insert_raw(body) {
                Ok(hash) if m.awaiting_current_root => {
                    info!(
                        slice = %self.slice_id,
                        root = %hash,
                        "adopting current root as baseline"
                    );
                    m.awaiting_current_root = false;
                    m.walk.baseline = Some(hash);
                }
                Ok(hash) => candidates.push(hash),
                Err(e) => {
                    warn!(slice = %self.slice_id, error = %e, "discarding malformed root body");
                }
            }
        }
        if !m.awaiting_current_root {
            candidates.append(&mut pending.roots);
        }

        let baseline = m.walk.baseline.clone();
        candidates.retain(|hash| Some(hash) != baseline.as_ref() && !self.cache.is_covered(hash));
        candidates.sort();
        candidates.dedup();

        let Some(best) = candidates.pop() else {
            pending.active = None;
            return false;
        };
        for rest in candidates {
            if !pending.roots.contains(&rest) {
                pending.roots.push(rest);
            }
        }
        pending.active = Some(best.clone());
        drop(pending);

        info!(slice = %self.slice_id, root = %best, baseline = ?baseline, "starting round");
        m.round_root = Some(best.clone());
        m.walk.begin_round(best);
        true
    }

    /// Make sure the round root and its immediate children are requested.
    fn preload(&self, m: &mut Machine) -> WalkProgress {
        let Some(root) = m.round_root.clone() else {
            return WalkProgress::Complete;
        };

        let node = match self.cache.lookup(&root) {
            NodeLookup::Ready(node) => node,
            NodeLookup::Unusable { exhausted: true } => return WalkProgress::Stalled,
            NodeLookup::Absent | NodeLookup::Unusable { exhausted: false } => {
                request_node(&self.cache, self.issuer.as_ref(), &mut m.walk.stats, &root);
                return WalkProgress::Paused;
            }
        };

        let mut waiting = false;
        for child in node.refs() {
            if self.cache.is_covered(child) {
                continue;
            }
            if let Some(request) =
                request_node(&self.cache, self.issuer.as_ref(), &mut m.walk.stats, child)
            {
                waiting |= request.awaiting();
            }
        }

        if waiting {
            WalkProgress::Paused
        } else {
            WalkProgress::Complete
        }
    }

    /// The round cannot progress. Abandon it if there is something newer to
    /// work on, otherwise report the stall.
    fn stalled(&self, m: &mut Machine) -> Option<RunOutcome> {
        if self.has_candidate(m) {
            warn!(slice = %self.slice_id, root = ?m.round_root, "abandoning stalled round");
            self.abort_round(m);
            None
        } else {
            Some(RunOutcome::Stalled)
        }
    }

    /// Round complete: the round root becomes the baseline.
    fn finish_round(&self, m: &mut Machine) {
        let Some(root) = m.round_root.take() else {
            m.state = CompareState::Done;
            return;
        };

        let mut names = std::mem::take(&mut m.walk.emitted);
        let emitted = names.len();
        if let Some(overlay) = m.walk.overlay.take() {
            names.extend(overlay.leaves().cloned());
        }
        let folded = fold(&self.cache, Some(&root), names);
        let known = folded.dropped;
        m.walk.overlay = folded.stand_in.map(|(_, node)| node);

        self.cache.mark_covered(&root);
        m.walk.baseline = Some(root.clone());
        m.walk.clear_stacks();
        m.walk.stats.rounds_completed += 1;
        locked(&self.pending).active = None;
        m.state = CompareState::Done;

        info!(
            slice = %self.slice_id,
            baseline = %root,
            names_emitted = emitted,
            names_in_baseline = known,
            "round complete"
        );
    }

    /// Drop the round in progress, keeping what it emitted out of future
    /// emissions.
    fn abort_round(&self, m: &mut Machine) {
        let mut names = std::mem::take(&mut m.walk.emitted);
        if let Some(overlay) = m.walk.overlay.take() {
            names.extend(overlay.leaves().cloned());
        }
        let folded = fold(&self.cache, m.walk.baseline.as_ref(), names);
        debug!(slice = %self.slice_id, names_in_baseline = folded.dropped, "round aborted");
        match (folded.stand_in, m.walk.baseline.is_some()) {
            (Some((hash, _)), false) => {
                debug!(slice = %self.slice_id, stand_in = %hash, "stand-in becomes baseline");
                m.walk.baseline = Some(hash);
            }
            (stand_in, _) => m.walk.overlay = stand_in.map(|(_, node)| node),
        }

        m.walk.clear_stacks();
        m.walk.stats.rounds_aborted += 1;
        m.round_root = None;
        locked(&self.pending).active = None;
        m.state = CompareState::Init;
    }
}

impl std::fmt::Debug for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparator")
            .field("slice", &self.slice_id)
            .field("state", &self.state())
            .finish()
    }
}
