//! Sync tree nodes.
//!
//! A node body is an ordered sequence of elements. Each element is either a
//! leaf (a full content name) or a reference to a child node by hash. The
//! node also records the name range `[min_name, max_name]` covered by its
//! whole subtree.

use std::sync::Arc;

use crate::hash::NodeHash;
use crate::name::Name;

/// One element of a sync tree node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Element {
    /// A content name present in the tree.
    Leaf(Name),
    /// A child node, identified by its hash.
    Ref(NodeHash),
}

impl Element {
    pub fn as_leaf(&self) -> Option<&Name> {
        match self {
            Element::Leaf(name) => Some(name),
            Element::Ref(_) => None,
        }
    }

    pub fn as_ref_hash(&self) -> Option<&NodeHash> {
        match self {
            Element::Leaf(_) => None,
            Element::Ref(hash) => Some(hash),
        }
    }
}

/// Decoded body of one sync tree node.
///
/// Invariant (for nodes produced by a cooperating encoder): elements are in
/// ascending name order and every leaf of the subtree lies in
/// `[min_name, max_name]`. Decoding does not enforce ordering; the
/// comparator checks it as it walks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncNode {
    elements: Vec<Element>,
    min_name: Name,
    max_name: Name,
    leaf_count: u64,
}

impl SyncNode {
    pub fn new(elements: Vec<Element>, min_name: Name, max_name: Name, leaf_count: u64) -> Self {
        Self {
            elements,
            min_name,
            max_name,
            leaf_count,
        }
    }

    /// Build a flat leaf node from arbitrary names.
    ///
    /// Names are sorted and deduplicated. An empty input yields an empty node
    /// whose range is the root name.
    pub fn from_leaves(names: impl IntoIterator<Item = Name>) -> Self {
        let mut names: Vec<Name> = names.into_iter().collect();
        names.sort();
        names.dedup();

        let min_name = names.first().cloned().unwrap_or_default();
        let max_name = names.last().cloned().unwrap_or_default();
        let leaf_count = names.len() as u64;
        Self {
            elements: names.into_iter().map(Element::Leaf).collect(),
            min_name,
            max_name,
            leaf_count,
        }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn min_name(&self) -> &Name {
        &self.min_name
    }

    pub fn max_name(&self) -> &Name {
        &self.max_name
    }

    /// Number of leaves in the whole subtree, as claimed by the encoder.
    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// Leaf names held directly by this node.
    pub fn leaves(&self) -> impl Iterator<Item = &Name> {
        self.elements.iter().filter_map(Element::as_leaf)
    }

    /// Child references held directly by this node.
    pub fn refs(&self) -> impl Iterator<Item = &NodeHash> {
        self.elements.iter().filter_map(Element::as_ref_hash)
    }

    /// Whether `name` falls inside this subtree's range.
    pub fn in_range(&self, name: &Name) -> bool {
        &self.min_name <= name && name <= &self.max_name
    }

    /// Whether this node directly holds `name` as a leaf.
    pub fn contains_leaf(&self, name: &Name) -> bool {
        self.leaves().any(|leaf| leaf == name)
    }

    pub fn into_shared(self) -> Arc<SyncNode> {
        Arc::new(self)
    }
}
