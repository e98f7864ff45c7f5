//! The merge-walk over two sync trees.
//!
//! Both views are walked as ascending streams of leaves. `current` (X) is
//! the baseline tree, `next` (Y) the tree being reconciled. References are
//! expanded lazily: a subtree is only entered when its name range overlaps
//! the other view's position, and a missing node pauses the walk after
//! requesting a fetch instead of blocking.
//!
//! A Y leaf is emitted when X's stream has moved past it without a match.

use std::sync::Arc;

use ndnsync_cache::{FetchIssuer, FetchRequest, NodeCache, NodeLookup, TreeCursor};
use ndnsync_core::{Element, Name, NodeHash, SliceId, SyncNode};
use tracing::{debug, trace, warn};

use crate::comparator::CompareStats;
use crate::error::{Result, SyncError};

/// Walk state owned by one comparator, guarded by its walk lock.
#[derive(Debug, Default)]
pub(crate) struct WalkState {
    /// Baseline (X) traversal stack.
    pub current: Vec<TreeCursor>,
    /// Next (Y) traversal stack.
    pub next: Vec<TreeCursor>,
    /// Y subtrees set aside because their bodies were unusable.
    pub deferred: Vec<NodeHash>,
    /// Full names emitted this round, in emission order.
    pub emitted: Vec<Name>,
    /// Last consumed leaf of each view.
    pub last_x: Option<Name>,
    pub last_y: Option<Name>,
    /// Baseline root the walk restarts X from for deferred sub-walks.
    pub baseline: Option<NodeHash>,
    /// Names known locally but not reachable from the baseline root.
    pub overlay: Option<Arc<SyncNode>>,
    /// Callbacks are suppressed until this stripped name is seen.
    pub start_name: Option<Name>,
    pub stats: CompareStats,
}

impl WalkState {
    /// Prepare the stacks for a round reconciling `root` against the baseline.
    pub fn begin_round(&mut self, root: NodeHash) {
        self.next = vec![TreeCursor::new(root)];
        self.reset_x();
        self.deferred.clear();
        self.emitted.clear();
        self.last_y = None;
    }

    /// Drop all traversal state.
    pub fn clear_stacks(&mut self) {
        self.current.clear();
        self.next.clear();
        self.deferred.clear();
        self.last_x = None;
        self.last_y = None;
    }

    fn reset_x(&mut self) {
        self.current = self.baseline.iter().cloned().map(TreeCursor::new).collect();
        self.last_x = None;
    }

    /// Record a new name and queue it for delivery unless it is suppressed.
    fn emit(&mut self, name: Name, outbox: &mut Vec<Name>) {
        if self
            .overlay
            .as_ref()
            .map(|o| o.contains_leaf(&name))
            .unwrap_or(false)
        {
            trace!(name = %name, "already known, not emitting");
            return;
        }

        let stripped = name.parent();
        self.emitted.push(name);
        self.stats.names_emitted += 1;

        if let Some(start) = &self.start_name {
            if *start != stripped {
                trace!(name = %stripped, "before start name, suppressed");
                return;
            }
            self.start_name = None;
        }
        outbox.push(stripped);
    }
}

/// How far a walk got before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkProgress {
    /// Y is exhausted and no deferred branch remains.
    Complete,
    /// Waiting for a fetch; the next kick resumes where this left off.
    Paused,
    /// Only branches whose fetch attempts are used up remain.
    Stalled,
}

/// One decision of the merge-walk.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    EmitY,
    AdvanceY,
    AdvanceX,
    AdvanceBoth,
    DescendY(NodeHash),
    DescendX(NodeHash),
    DescendBoth { x: NodeHash, y: NodeHash },
    PopX,
    Identical(NodeHash),
}

enum Step {
    Act,
    YEmpty,
    Pause,
    Stall,
}

/// Request a node fetch, logging and counting the outcome.
///
/// Returns `None` if the issuer failed; a later kick retries.
pub(crate) fn request_node(
    cache: &NodeCache,
    issuer: &dyn FetchIssuer,
    stats: &mut CompareStats,
    hash: &NodeHash,
) -> Option<FetchRequest> {
    match cache.request_fetch(hash, issuer) {
        Ok(request) => {
            if request.issued() {
                stats.fetches_issued += 1;
            }
            Some(request)
        }
        Err(e) => {
            warn!(hash = %hash, error = %e, "failed to issue node fetch");
            None
        }
    }
}

/// A single pass of the merge-walk over borrowed comparator state.
pub(crate) struct MergeWalk<'a> {
    pub cache: &'a NodeCache,
    pub issuer: &'a dyn FetchIssuer,
    pub state: &'a mut WalkState,
    pub outbox: &'a mut Vec<Name>,
    pub slice: SliceId,
}

impl<'a> MergeWalk<'a> {
    /// Walk until the round completes or must wait.
    pub fn run(&mut self) -> Result<WalkProgress> {
        loop {
            match self.settle()? {
                Step::Act => {
                    let action = self.decide()?;
                    trace!(slice = %self.slice, action = ?action, "walk step");
                    self.apply(action);
                }
                Step::Pause => return Ok(WalkProgress::Paused),
                Step::Stall => return Ok(WalkProgress::Stalled),
                Step::YEmpty => {
                    if let Some(progress) = self.resume_deferred() {
                        return Ok(progress);
                    }
                }
            }
        }
    }

    /// Pop exhausted cursors and resolve bodies until both tops are usable.
    fn settle(&mut self) -> Result<Step> {
        loop {
            let Some(top) = self.state.next.last() else {
                return Ok(Step::YEmpty);
            };
            let hash = top.hash().clone();

            if !top.is_resolved() {
                if self.cache.is_covered(&hash) {
                    self.state.next.pop();
                    continue;
                }
                match self.cache.lookup(&hash) {
                    NodeLookup::Ready(node) => self.attach_y(node),
                    NodeLookup::Absent => {
                        request_node(self.cache, self.issuer, &mut self.state.stats, &hash);
                        return Ok(Step::Pause);
                    }
                    NodeLookup::Unusable { exhausted } => {
                        if self.state.next.len() > 1 {
                            self.defer_top_y(exhausted);
                            continue;
                        }
                        if exhausted {
                            return Ok(Step::Stall);
                        }
                        request_node(self.cache, self.issuer, &mut self.state.stats, &hash);
                        return Ok(Step::Pause);
                    }
                }
                continue;
            }

            if top.at_end() {
                let done = self.state.next.pop();
                if let Some(done) = done.filter(|c| !c.has_deferred()) {
                    trace!(hash = %done.hash(), "subtree covered");
                    self.cache.mark_covered(done.hash());
                }
                continue;
            }
            break;
        }

        loop {
            let Some(top) = self.state.current.last() else {
                break;
            };
            let hash = top.hash().clone();

            if !top.is_resolved() {
                match self.cache.lookup(&hash) {
                    NodeLookup::Ready(node) => {
                        if let Some(top) = self.state.current.last_mut() {
                            top.attach(node);
                        }
                    }
                    NodeLookup::Absent | NodeLookup::Unusable { exhausted: false } => {
                        request_node(self.cache, self.issuer, &mut self.state.stats, &hash);
                        return Ok(Step::Pause);
                    }
                    NodeLookup::Unusable { exhausted: true } => {
                        warn!(hash = %hash, "baseline node unavailable, cannot compare");
                        return Ok(Step::Stall);
                    }
                }
                continue;
            }

            if top.at_end() {
                self.state.current.pop();
                continue;
            }
            break;
        }

        Ok(Step::Act)
    }

    fn attach_y(&mut self, node: Arc<SyncNode>) {
        if let Some(top) = self.state.next.last_mut() {
            top.attach(node);
        }
    }

    /// Set the unusable top Y subtree aside and keep its ancestors uncovered.
    fn defer_top_y(&mut self, exhausted: bool) {
        let Some(cursor) = self.state.next.pop() else {
            return;
        };
        let hash = cursor.hash().clone();
        debug!(slice = %self.slice, hash = %hash, exhausted, "deferring unusable branch");
        if !exhausted {
            request_node(self.cache, self.issuer, &mut self.state.stats, &hash);
        }
        for ancestor in self.state.next.iter_mut() {
            ancestor.mark_deferred();
        }
        if !self.state.deferred.contains(&hash) {
            self.state.deferred.push(hash);
        }
    }

    /// Start a sub-walk for the first resident deferred branch.
    ///
    /// Returns `None` when a sub-walk was started, otherwise how the round
    /// stands.
    fn resume_deferred(&mut self) -> Option<WalkProgress> {
        if self.state.deferred.is_empty() {
            return Some(WalkProgress::Complete);
        }

        let mut waiting = false;
        let mut i = 0;
        while i < self.state.deferred.len() {
            let hash = self.state.deferred[i].clone();
            match self.cache.lookup(&hash) {
                NodeLookup::Ready(_) => {
                    self.state.deferred.remove(i);
                    debug!(slice = %self.slice, hash = %hash, "resuming deferred branch");
                    self.state.next = vec![TreeCursor::new(hash)];
                    self.state.reset_x();
                    self.state.last_y = None;
                    return None;
                }
                NodeLookup::Absent | NodeLookup::Unusable { exhausted: false } => {
                    let request =
                        request_node(self.cache, self.issuer, &mut self.state.stats, &hash);
                    // An issue error leaves the branch for a later kick.
                    waiting |= request.map_or(true, |r| r != FetchRequest::Exhausted);
                }
                NodeLookup::Unusable { exhausted: true } => {}
            }
            i += 1;
        }

        if waiting {
            Some(WalkProgress::Paused)
        } else {
            Some(WalkProgress::Stalled)
        }
    }

    /// Check a leaf against its node's range and the view's last leaf.
    fn check_leaf(view: &str, leaf: &Name, node: &SyncNode, last: Option<&Name>) -> Result<()> {
        if !node.in_range(leaf) {
            return Err(SyncError::Protocol(format!(
                "{} leaf {} outside node range [{}, {}]",
                view,
                leaf,
                node.min_name(),
                node.max_name()
            )));
        }
        if let Some(last) = last {
            if leaf <= last {
                return Err(SyncError::Protocol(format!(
                    "{} leaf {} not after {}",
                    view, leaf, last
                )));
            }
        }
        Ok(())
    }

    fn resident(&self, hash: &NodeHash) -> Option<Arc<SyncNode>> {
        match self.cache.lookup(hash) {
            NodeLookup::Ready(node) => Some(node),
            _ => None,
        }
    }

    /// Choose the next action. Both tops are resolved and not exhausted.
    fn decide(&mut self) -> Result<Action> {
        let y_cursor = self
            .state
            .next
            .last()
            .ok_or_else(|| SyncError::Protocol("empty next stack".into()))?;
        let y_node = Arc::clone(
            y_cursor
                .node()
                .ok_or_else(|| SyncError::Protocol("unresolved next cursor".into()))?,
        );
        let y_el = y_cursor
            .current_element()
            .cloned()
            .ok_or_else(|| SyncError::Protocol("exhausted next cursor".into()))?;

        if let Element::Ref(hash) = &y_el {
            if self.cache.is_covered(hash) {
                return Ok(Action::AdvanceY);
            }
        }
        if let Element::Leaf(y) = &y_el {
            Self::check_leaf("next", y, &y_node, self.state.last_y.as_ref())?;
        }

        let Some(x_cursor) = self.state.current.last() else {
            return Ok(match y_el {
                Element::Leaf(_) => Action::EmitY,
                Element::Ref(hash) => Action::DescendY(hash),
            });
        };
        let x_node = Arc::clone(
            x_cursor
                .node()
                .ok_or_else(|| SyncError::Protocol("unresolved current cursor".into()))?,
        );
        let x_pos = x_cursor.position();
        let x_el = x_cursor
            .current_element()
            .cloned()
            .ok_or_else(|| SyncError::Protocol("exhausted current cursor".into()))?;

        if let Element::Leaf(x) = &x_el {
            Self::check_leaf("current", x, &x_node, self.state.last_x.as_ref())?;
        }

        let action = match (x_el, y_el) {
            (Element::Ref(x), Element::Ref(y)) => {
                if x == y {
                    Action::Identical(y)
                } else {
                    Action::DescendBoth { x, y }
                }
            }
            (Element::Leaf(x), Element::Ref(y)) => match self.resident(&y) {
                Some(child) if x < *child.min_name() => Action::AdvanceX,
                _ => Action::DescendY(y),
            },
            (Element::Ref(x), Element::Leaf(y)) => match self.resident(&x) {
                Some(child) => {
                    if y < *child.min_name() {
                        Action::EmitY
                    } else if y == *child.min_name() {
                        Action::AdvanceY
                    } else if y > *child.max_name() {
                        Action::AdvanceX
                    } else if y == *child.max_name() {
                        Action::AdvanceBoth
                    } else {
                        Action::DescendX(x)
                    }
                }
                None => Action::DescendX(x),
            },
            (Element::Leaf(x), Element::Leaf(y)) => {
                if x_pos == 0 && *x_node.max_name() < y {
                    Action::PopX
                } else if x == y {
                    Action::AdvanceBoth
                } else if y < x {
                    Action::EmitY
                } else {
                    Action::AdvanceX
                }
            }
        };
        Ok(action)
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::EmitY => {
                if let Some(name) = self.advance_y() {
                    self.state.emit(name, self.outbox);
                }
            }
            Action::AdvanceY => {
                self.advance_y();
            }
            Action::AdvanceX => self.advance_x(),
            Action::AdvanceBoth => {
                self.advance_x();
                self.advance_y();
            }
            Action::DescendY(hash) => {
                self.advance_y();
                self.state.next.push(TreeCursor::new(hash));
            }
            Action::DescendX(hash) => {
                self.advance_x();
                self.state.current.push(TreeCursor::new(hash));
            }
            Action::DescendBoth { x, y } => {
                self.advance_x();
                self.advance_y();
                self.state.current.push(TreeCursor::new(x));
                self.state.next.push(TreeCursor::new(y));
            }
            Action::PopX => {
                self.state.current.pop();
            }
            Action::Identical(hash) => {
                self.advance_x();
                self.advance_y();
                self.cache.mark_covered(&hash);
            }
        }
    }

    /// Advance Y past its current element, returning it if it was a leaf.
    fn advance_y(&mut self) -> Option<Name> {
        let top = self.state.next.last_mut()?;
        let leaf = top.current_element().and_then(Element::as_leaf).cloned();
        top.advance();
        if let Some(leaf) = &leaf {
            self.state.last_y = Some(leaf.clone());
        }
        leaf
    }

    fn advance_x(&mut self) {
        if let Some(top) = self.state.current.last_mut() {
            if let Some(leaf) = top.current_element().and_then(Element::as_leaf) {
                self.state.last_x = Some(leaf.clone());
            }
            top.advance();
        }
    }
}
