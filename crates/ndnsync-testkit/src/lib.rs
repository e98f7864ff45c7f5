//! # ndnsync Testkit
//!
//! Testing utilities for ndnsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Tree builder**: a reference encoder that turns a name set into a sync tree
//! - **Fixtures**: a synchronous comparator harness with a recording issuer
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use ndnsync_sync::{CompareOptions, RunOutcome};
//! use ndnsync_testkit::{content_name, delivered_name, Harness, TreeBuilder};
//!
//! let harness = Harness::new(CompareOptions::default());
//! let tree = TreeBuilder::new(4).build(vec![content_name("a"), content_name("b")]);
//! let root = harness.publish(&tree);
//!
//! harness.announce(&root);
//! assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
//! assert_eq!(harness.emitted(), vec![delivered_name("a"), delivered_name("b")]);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use ndnsync_testkit::generators::{NestedSets, Shape};
//!
//! proptest! {
//!     #[test]
//!     fn emits_exactly_the_difference(sets: NestedSets, x: Shape, y: Shape) {
//!         // build both trees, reconcile, compare with sets.added()
//!     }
//! }
//! ```

pub mod builder;
pub mod fixtures;
pub mod generators;

pub use builder::{BuiltTree, TreeBuilder};
pub use fixtures::{
    content_name, delivered_name, test_slice, CollectingSink, Harness, RecordingIssuer,
};
pub use generators::{NestedSets, Shape};
