//! Reference tree encoder.
//!
//! Builds a sync tree over a set of names the way a cooperating publisher
//! would: leaves sorted into leaf nodes, leaf nodes grouped under reference
//! nodes, level by level, until one root remains.

use std::collections::BTreeMap;

use bytes::Bytes;
use ndnsync_core::{CborCodec, Element, Name, NodeCodec, NodeHash, SyncNode};

/// A built tree: the root hash plus every encoded node by hash.
#[derive(Debug, Clone)]
pub struct BuiltTree {
    pub root: NodeHash,
    pub nodes: BTreeMap<NodeHash, Bytes>,
}

impl BuiltTree {
    pub fn root_bytes(&self) -> Bytes {
        self.nodes[&self.root].clone()
    }

    pub fn get(&self, hash: &NodeHash) -> Option<&Bytes> {
        self.nodes.get(hash)
    }

    /// Number of distinct nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hashes of the nodes directly referenced by the root.
    pub fn root_children(&self) -> Vec<NodeHash> {
        CborCodec
            .decode(&self.root_bytes())
            .map(|node| node.refs().cloned().collect())
            .unwrap_or_default()
    }
}

/// A child as its parent sees it: a loose leaf or a built node.
enum Item {
    Leaf(Name),
    Node {
        hash: NodeHash,
        min: Name,
        max: Name,
        leaves: u64,
    },
}

impl Item {
    fn element(&self) -> Element {
        match self {
            Item::Leaf(name) => Element::Leaf(name.clone()),
            Item::Node { hash, .. } => Element::Ref(hash.clone()),
        }
    }

    fn min(&self) -> &Name {
        match self {
            Item::Leaf(name) => name,
            Item::Node { min, .. } => min,
        }
    }

    fn max(&self) -> &Name {
        match self {
            Item::Leaf(name) => name,
            Item::Node { max, .. } => max,
        }
    }

    fn leaves(&self) -> u64 {
        match self {
            Item::Leaf(_) => 1,
            Item::Node { leaves, .. } => *leaves,
        }
    }
}

/// Builds sync trees with a fixed fanout.
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder {
    fanout: usize,
    mixed: bool,
}

impl TreeBuilder {
    /// A builder putting at most `fanout` elements in a node (minimum 2).
    pub fn new(fanout: usize) -> Self {
        Self {
            fanout: fanout.max(2),
            mixed: false,
        }
    }

    /// Inline single-name leaf chunks into their parent, so reference nodes
    /// carry leaves and refs side by side.
    pub fn mixed(mut self, mixed: bool) -> Self {
        self.mixed = mixed;
        self
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Build a tree over `names`. Duplicates are dropped.
    pub fn build(&self, names: impl IntoIterator<Item = Name>) -> BuiltTree {
        self.build_chunked(names, &[self.fanout])
    }

    /// Build a tree whose leaf nodes take their sizes from `leaf_chunks` in
    /// turn. Upper levels use the builder's fanout.
    pub fn build_chunked(
        &self,
        names: impl IntoIterator<Item = Name>,
        leaf_chunks: &[usize],
    ) -> BuiltTree {
        let mut names: Vec<Name> = names.into_iter().collect();
        names.sort();
        names.dedup();

        let mut nodes = BTreeMap::new();
        if names.len() <= self.fanout {
            let root = store(&mut nodes, &SyncNode::from_leaves(names));
            return BuiltTree { root, nodes };
        }

        let mut level = Vec::new();
        let mut sizes = leaf_chunks.iter().copied().filter(|&n| n > 0).cycle();
        let mut rest = names.as_slice();
        while !rest.is_empty() {
            let size = sizes.next().unwrap_or(self.fanout).min(rest.len());
            let (chunk, tail) = rest.split_at(size);
            level.push(match chunk {
                [single] if self.mixed => Item::Leaf(single.clone()),
                _ => node_item(&mut nodes, SyncNode::from_leaves(chunk.to_vec())),
            });
            rest = tail;
        }

        while level.len() > 1 {
            level = level
                .chunks(self.fanout)
                .map(|group| node_item(&mut nodes, parent_node(group)))
                .collect();
        }

        let root = match level.pop() {
            Some(Item::Node { hash, .. }) => hash,
            Some(Item::Leaf(name)) => store(&mut nodes, &SyncNode::from_leaves(vec![name])),
            None => store(&mut nodes, &SyncNode::from_leaves(Vec::new())),
        };
        BuiltTree { root, nodes }
    }
}

fn parent_node(children: &[Item]) -> SyncNode {
    SyncNode::new(
        children.iter().map(Item::element).collect(),
        children[0].min().clone(),
        children[children.len() - 1].max().clone(),
        children.iter().map(Item::leaves).sum(),
    )
}

fn node_item(nodes: &mut BTreeMap<NodeHash, Bytes>, node: SyncNode) -> Item {
    Item::Node {
        hash: store(nodes, &node),
        min: node.min_name().clone(),
        max: node.max_name().clone(),
        leaves: node.leaf_count(),
    }
}

fn store(nodes: &mut BTreeMap<NodeHash, Bytes>, node: &SyncNode) -> NodeHash {
    let (hash, bytes) = CborCodec.encode_with_hash(node);
    nodes.insert(hash.clone(), bytes);
    hash
}
