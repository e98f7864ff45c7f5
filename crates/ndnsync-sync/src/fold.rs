//! Folding emitted names back into the baseline view.
//!
//! After a round, names that were emitted must not be emitted again by the
//! next round. Names reachable from the new baseline tree are dropped; the
//! rest are gathered into a locally synthesized leaf node that stands in for
//! them until a baseline containing them arrives.

use std::collections::BTreeSet;
use std::sync::Arc;

use ndnsync_cache::{NodeCache, NodeLookup};
use ndnsync_core::{Element, Name, NodeHash, SyncNode};
use tracing::debug;

/// Whether the tree rooted at `root` contains `name` as a leaf.
///
/// Only resident nodes are searched. Returns `None` when the answer depends
/// on a node that is not resident.
pub(crate) fn tree_contains(cache: &NodeCache, root: &NodeHash, name: &Name) -> Option<bool> {
    match cache.lookup(root) {
        NodeLookup::Ready(node) => node_contains(cache, &node, name),
        _ => None,
    }
}

fn node_contains(cache: &NodeCache, node: &SyncNode, name: &Name) -> Option<bool> {
    if !node.in_range(name) {
        return Some(false);
    }

    let mut unknown = false;
    for element in node.elements() {
        match element {
            Element::Leaf(leaf) if leaf == name => return Some(true),
            Element::Leaf(_) => {}
            Element::Ref(hash) => match cache.lookup(hash) {
                NodeLookup::Ready(child) => match node_contains(cache, &child, name) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => unknown = true,
                },
                _ => unknown = true,
            },
        }
    }

    if unknown {
        None
    } else {
        Some(false)
    }
}

/// Result of folding names into a baseline.
#[derive(Debug, Default)]
pub(crate) struct Folded {
    /// Stand-in node for names not found in the baseline.
    pub stand_in: Option<(NodeHash, Arc<SyncNode>)>,
    /// Names confirmed present in the baseline.
    pub dropped: usize,
}

/// Fold `names` into the view rooted at `baseline`.
///
/// Names the baseline provably contains are dropped; everything else,
/// including names whose presence cannot be decided locally, goes into a
/// stand-in node inserted into the cache.
pub(crate) fn fold(
    cache: &NodeCache,
    baseline: Option<&NodeHash>,
    names: impl IntoIterator<Item = Name>,
) -> Folded {
    let names: BTreeSet<Name> = names.into_iter().collect();
    let total = names.len();

    let kept: Vec<Name> = match baseline {
        Some(root) => names
            .into_iter()
            .filter(|name| tree_contains(cache, root, name) != Some(true))
            .collect(),
        None => names.into_iter().collect(),
    };
    let dropped = total - kept.len();

    if kept.is_empty() {
        return Folded {
            stand_in: None,
            dropped,
        };
    }

    let node = SyncNode::from_leaves(kept);
    let kept_count = node.len();
    let hash = cache.insert_node(node.clone());
    debug!(hash = %hash, kept = kept_count, dropped, "synthesized stand-in node");
    Folded {
        stand_in: Some((hash, Arc::new(node))),
        dropped,
    }
}
