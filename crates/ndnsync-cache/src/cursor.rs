//! Traversal cursors.
//!
//! A cursor is one view's position inside one node. Positions live here and
//! not on the cached entry, so the two views of a comparison can walk the
//! same node at different offsets.

use std::sync::Arc;

use ndnsync_core::{Element, NodeHash, SyncNode};

/// Position of one view inside one tree node.
///
/// Invariant: `position <= element count` once the node is attached.
#[derive(Debug, Clone)]
pub struct TreeCursor {
    hash: NodeHash,
    node: Option<Arc<SyncNode>>,
    position: usize,
    has_deferred: bool,
}

impl TreeCursor {
    /// A cursor at position 0 whose body is not yet attached.
    pub fn new(hash: NodeHash) -> Self {
        Self {
            hash,
            node: None,
            position: 0,
            has_deferred: false,
        }
    }

    pub fn hash(&self) -> &NodeHash {
        &self.hash
    }

    pub fn node(&self) -> Option<&Arc<SyncNode>> {
        self.node.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.node.is_some()
    }

    /// Attach the decoded body once it is available.
    pub fn attach(&mut self, node: Arc<SyncNode>) {
        debug_assert!(self.position <= node.len());
        self.node = Some(node);
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The element at the current position, if any.
    pub fn current_element(&self) -> Option<&Element> {
        self.node.as_ref()?.element(self.position)
    }

    /// Move past the current element.
    pub fn advance(&mut self) {
        debug_assert!(!self.at_end(), "advance past end of {}", self.hash);
        self.position += 1;
    }

    /// Whether every element has been consumed. An unresolved cursor is
    /// never at its end.
    pub fn at_end(&self) -> bool {
        match &self.node {
            Some(node) => self.position >= node.len(),
            None => false,
        }
    }

    /// Record that a branch below this node was set aside for later.
    pub fn mark_deferred(&mut self) {
        self.has_deferred = true;
    }

    pub fn has_deferred(&self) -> bool {
        self.has_deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndnsync_core::Name;

    #[test]
    fn test_walks_elements_in_order() {
        let names = vec![Name::from_uri("/a").unwrap(), Name::from_uri("/b").unwrap()];
        let node = Arc::new(SyncNode::from_leaves(names.clone()));
        let mut cursor = TreeCursor::new(NodeHash::digest(b"n"));

        assert!(!cursor.at_end());
        assert!(cursor.current_element().is_none());

        cursor.attach(node);
        assert_eq!(cursor.current_element(), Some(&Element::Leaf(names[0].clone())));
        cursor.advance();
        assert_eq!(cursor.current_element(), Some(&Element::Leaf(names[1].clone())));
        cursor.advance();
        assert!(cursor.at_end());
        assert!(cursor.current_element().is_none());
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_empty_node_is_at_end() {
        let mut cursor = TreeCursor::new(NodeHash::digest(b"empty"));
        cursor.attach(Arc::new(SyncNode::from_leaves(Vec::new())));
        assert!(cursor.at_end());
    }

    #[test]
    fn test_deferred_flag() {
        let mut cursor = TreeCursor::new(NodeHash::digest(b"n"));
        assert!(!cursor.has_deferred());
        cursor.mark_deferred();
        assert!(cursor.has_deferred());
    }
}
