//! Proptest generators for property-based testing.

use std::collections::BTreeSet;

use proptest::prelude::*;

use ndnsync_core::{Name, NodeHash};

use crate::builder::{BuiltTree, TreeBuilder};
use crate::fixtures::content_name;

/// A short lowercase label.
pub fn label() -> impl Strategy<Value = String> {
    "[a-z]{1,6}".prop_map(String::from)
}

/// A set of up to `max` distinct content names.
pub fn name_set(max: usize) -> impl Strategy<Value = BTreeSet<Name>> {
    prop::collection::btree_set(label(), 0..=max)
        .prop_map(|labels| {
            labels
                .iter()
                .map(|l| content_name(l))
                .collect::<BTreeSet<Name>>()
        })
}

/// A node fanout.
pub fn fanout() -> impl Strategy<Value = usize> {
    2usize..=6
}

/// Leaf node sizes for [`TreeBuilder::build_chunked`](crate::TreeBuilder::build_chunked).
pub fn leaf_chunks() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=5, 1..=4)
}

/// A random node hash.
pub fn node_hash() -> impl Strategy<Value = NodeHash> {
    any::<[u8; 32]>().prop_map(NodeHash::from)
}

/// Two nested name sets: `base` and a superset `full`.
#[derive(Debug, Clone)]
pub struct NestedSets {
    pub base: BTreeSet<Name>,
    pub full: BTreeSet<Name>,
}

impl NestedSets {
    /// Names in `full` but not in `base`.
    pub fn added(&self) -> BTreeSet<Name> {
        self.full.difference(&self.base).cloned().collect()
    }
}

impl Arbitrary for NestedSets {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop::collection::btree_set(label(), 0..=40)
            .prop_flat_map(|labels| {
                let len = labels.len();
                (Just(labels), prop::collection::vec(any::<bool>(), len))
            })
            .prop_map(|(labels, keep)| {
                let full: BTreeSet<Name> = labels.iter().map(|l| content_name(l)).collect();
                let base = labels
                    .iter()
                    .zip(keep)
                    .filter(|(_, keep)| *keep)
                    .map(|(l, _)| content_name(l))
                    .collect();
                NestedSets { base, full }
            })
            .boxed()
    }
}

/// Parameters for a tree shape: fanout, leaf chunk sizes, and whether
/// single-name chunks are inlined into mixed nodes.
#[derive(Debug, Clone)]
pub struct Shape {
    pub fanout: usize,
    pub leaf_chunks: Vec<usize>,
    pub mixed: bool,
}

impl Shape {
    pub fn builder(&self) -> TreeBuilder {
        TreeBuilder::new(self.fanout).mixed(self.mixed)
    }

    /// Build a tree of this shape over `names`.
    pub fn build(&self, names: impl IntoIterator<Item = Name>) -> BuiltTree {
        self.builder().build_chunked(names, &self.leaf_chunks)
    }
}

impl Arbitrary for Shape {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (fanout(), leaf_chunks(), any::<bool>())
            .prop_map(|(fanout, leaf_chunks, mixed)| Shape {
                fanout,
                leaf_chunks,
                mixed,
            })
            .boxed()
    }
}
