//! End-to-end comparator scenarios driven through the synchronous harness.

use std::collections::BTreeSet;

use bytes::Bytes;
use ndnsync_cache::{FetchCompletion, FetchRequest, NodeLookup};
use ndnsync_core::{CborCodec, Element, Name, NodeCodec, NodeHash, SyncNode};
use ndnsync_sync::{CompareOptions, CompareState, RunOutcome, StartPoint};
use ndnsync_testkit::{content_name, delivered_name, Harness, TreeBuilder};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn names(labels: &[&str]) -> Vec<Name> {
    labels.iter().map(|l| content_name(l)).collect()
}

fn delivered(labels: &[&str]) -> Vec<Name> {
    let mut names: Vec<Name> = labels.iter().map(|l| delivered_name(l)).collect();
    names.sort();
    names
}

fn labels(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("item{:03}", i)).collect()
}

fn resuming_from(root: &NodeHash) -> CompareOptions {
    CompareOptions::starting_at(StartPoint::Root(root.clone()))
}

#[test]
fn test_identical_sets_in_different_chunkings_emit_nothing() {
    init_tracing();
    let all = labels(25);
    let set: Vec<Name> = all.iter().map(|l| content_name(l)).collect();
    let x = TreeBuilder::new(2).build(set.clone());
    let y = TreeBuilder::new(5).build_chunked(set, &[1, 3]);
    assert_ne!(x.root, y.root);

    let harness = Harness::new(resuming_from(&x.root));
    harness.publish(&x);
    harness.publish(&y);
    harness.announce(&y.root);

    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
    assert!(harness.emitted().is_empty());
    assert_eq!(harness.comparator.baseline(), Some(y.root.clone()));
    assert_eq!(harness.stats().rounds_completed, 1);
}

#[test]
fn test_one_added_name_is_emitted() {
    let x = TreeBuilder::new(4).build(names(&["a", "b", "c"]));
    let y = TreeBuilder::new(4).build(names(&["a", "b", "c", "d"]));

    let harness = Harness::new(resuming_from(&x.root));
    harness.publish(&x);
    harness.publish(&y);
    harness.announce(&y.root);

    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
    assert_eq!(harness.emitted(), vec![delivered_name("d")]);
}

#[test]
fn test_superset_emits_exactly_the_difference() {
    let all = labels(40);
    let base: Vec<Name> = all.iter().step_by(3).map(|l| content_name(l)).collect();
    let full: Vec<Name> = all.iter().map(|l| content_name(l)).collect();
    let x = TreeBuilder::new(3).build_chunked(base.clone(), &[2, 4]);
    let y = TreeBuilder::new(4).build_chunked(full.clone(), &[5]);

    let harness = Harness::new(resuming_from(&x.root)).shuffled(7);
    harness.publish(&x);
    harness.publish(&y);
    harness.announce(&y.root);
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);

    let base: BTreeSet<Name> = base.into_iter().collect();
    let mut expected: Vec<Name> = full
        .iter()
        .filter(|n| !base.contains(*n))
        .map(Name::parent)
        .collect();
    expected.sort();
    assert_eq!(harness.emitted_sorted(), expected);
}

#[test]
fn test_unchanged_root_second_round_emits_nothing() {
    let y = TreeBuilder::new(3).build(names(&["a", "b", "c", "d", "e"]));
    let harness = Harness::new(CompareOptions::default());
    harness.publish(&y);

    harness.announce(&y.root);
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
    assert_eq!(harness.emitted().len(), 5);

    harness.announce(&y.root);
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
    assert_eq!(harness.emitted().len(), 5);
    assert_eq!(harness.stats().rounds_completed, 1);
}

#[test]
fn test_growing_roots_emit_each_name_once() {
    let harness = Harness::new(CompareOptions::default());
    let all = labels(30);

    for n in [5, 12, 12, 30] {
        let tree = TreeBuilder::new(3).build(all[..n].iter().map(|l| content_name(l)));
        harness.publish(&tree);
        harness.announce(&tree.root);
        assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
        assert_eq!(harness.emitted().len(), n);
    }

    let seen = harness.emitted();
    let unique: BTreeSet<_> = seen.iter().cloned().collect();
    assert_eq!(unique.len(), seen.len());
    assert_eq!(harness.stats().rounds_completed, 3);
}

#[test]
fn test_missing_node_is_fetched_once() {
    let harness = Harness::new(CompareOptions::default());
    let hash = NodeHash::digest(b"missing");

    assert_eq!(
        harness
            .cache
            .request_fetch(&hash, harness.issuer.as_ref())
            .unwrap(),
        FetchRequest::Issued
    );
    assert_eq!(
        harness
            .cache
            .request_fetch(&hash, harness.issuer.as_ref())
            .unwrap(),
        FetchRequest::AlreadyPending
    );
    assert_eq!(harness.issuer.request_count(&hash), 1);
}

#[test]
fn test_repeated_runs_do_not_refetch_pending_root() {
    let y = TreeBuilder::new(3).build(names(&["a", "b"]));
    let harness = Harness::new(CompareOptions::default());
    harness.publish(&y);
    harness.announce(&y.root);

    assert_eq!(harness.run(), RunOutcome::Waiting);
    assert_eq!(harness.run(), RunOutcome::Waiting);
    assert_eq!(harness.run(), RunOutcome::Waiting);
    assert_eq!(harness.issuer.request_count(&y.root), 1);
    assert_eq!(harness.stats().fetches_issued, 1);
}

#[test]
fn test_highest_candidate_is_selected() {
    let harness = Harness::new(CompareOptions::default());
    let low = NodeHash::from(vec![0x01, 0x02]);
    let high = NodeHash::from(vec![0x02, 0x00]);
    harness.announce(&low);
    harness.announce(&high);

    assert_eq!(harness.run(), RunOutcome::Waiting);
    assert_eq!(harness.comparator.round_root(), Some(high.clone()));
    assert_eq!(harness.issuer.requests(), vec![high]);
}

#[test]
fn test_no_premature_emission_against_unresolved_reference() {
    init_tracing();
    // Baseline: a root holding one reference to a node covering [a, z].
    let child = SyncNode::from_leaves(names(&["a", "k", "z"]));
    let (child_hash, child_bytes) = CborCodec.encode_with_hash(&child);
    let x_root = SyncNode::new(
        vec![Element::Ref(child_hash.clone())],
        content_name("a"),
        content_name("z"),
        3,
    );
    let (x_hash, x_bytes) = CborCodec.encode_with_hash(&x_root);

    let y = SyncNode::from_leaves(names(&["m"]));
    let (y_hash, y_bytes) = CborCodec.encode_with_hash(&y);

    let harness = Harness::new(resuming_from(&x_hash));
    harness.publish_raw(child_hash.clone(), child_bytes);
    harness.publish_raw(x_hash.clone(), x_bytes);
    harness.publish_raw(y_hash.clone(), y_bytes);
    harness.announce(&y_hash);

    // Y root, then X root, then the X child: one step at a time.
    assert_eq!(harness.run(), RunOutcome::Waiting);
    assert_eq!(harness.issuer.outstanding(), vec![y_hash]);
    harness.deliver_outstanding();

    assert_eq!(harness.run(), RunOutcome::Waiting);
    assert_eq!(harness.issuer.outstanding(), vec![x_hash]);
    harness.deliver_outstanding();

    assert_eq!(harness.run(), RunOutcome::Waiting);
    assert_eq!(harness.issuer.outstanding(), vec![child_hash]);
    assert!(harness.emitted().is_empty());
    assert_eq!(harness.stats().faults, 0);
    assert_eq!(harness.comparator.state(), CompareState::Compare);

    harness.deliver_outstanding();
    assert_eq!(harness.run(), RunOutcome::Idle);
    assert_eq!(harness.emitted(), vec![delivered_name("m")]);
}

#[test]
fn test_corrupted_node_stalls_only_its_branch() {
    init_tracing();
    let all = labels(9);
    let tree = TreeBuilder::new(3).build(all.iter().map(|l| content_name(l)));
    let children = tree.root_children();
    assert_eq!(children.len(), 3);

    let harness = Harness::new(CompareOptions::default());
    harness.publish(&tree);
    harness.publish_raw(children[1].clone(), Bytes::from_static(b"\xff\x00garbage"));
    harness.announce(&tree.root);

    assert_eq!(harness.run_to_idle(), RunOutcome::Stalled);
    let survivors: Vec<&str> = all[..3]
        .iter()
        .chain(&all[6..])
        .map(String::as_str)
        .collect();
    assert_eq!(harness.emitted_sorted(), delivered(&survivors));
    assert_eq!(harness.stats().rounds_completed, 0);
    assert_eq!(harness.stats().faults, 0);
    assert!(matches!(
        harness.cache.lookup(&children[1]),
        NodeLookup::Unusable { exhausted: true }
    ));
    assert!(!harness.cache.is_covered(&tree.root));
    assert!(harness.cache.is_covered(&children[0]));
}

#[test]
fn test_stalled_branch_resumes_after_corrected_fetch() {
    init_tracing();
    let all = labels(9);
    let tree = TreeBuilder::new(3).build(all.iter().map(|l| content_name(l)));
    let broken = tree.root_children()[1].clone();

    let harness = Harness::new(CompareOptions::default());
    harness.publish(&tree);
    harness.publish_raw(broken.clone(), Bytes::from_static(b"\xff\x00garbage"));
    harness.announce(&tree.root);

    assert_eq!(harness.run_to_idle(), RunOutcome::Stalled);
    assert_eq!(harness.emitted().len(), 6);
    assert_eq!(harness.stats().rounds_completed, 0);

    let good = tree.get(&broken).cloned().unwrap();
    assert_eq!(
        harness.cache.on_fetch_complete(&broken, Ok(good)),
        FetchCompletion::Attached
    );
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);

    let every: Vec<&str> = all.iter().map(String::as_str).collect();
    assert_eq!(harness.emitted_sorted(), delivered(&every));
    assert_eq!(harness.stats().rounds_completed, 1);
    assert_eq!(harness.comparator.baseline(), Some(tree.root.clone()));
    assert!(harness.cache.is_covered(&tree.root));
}

#[test]
fn test_withdrawn_node_recovers_when_served_again() {
    let all = labels(9);
    let tree = TreeBuilder::new(3).build(all.iter().map(|l| content_name(l)));
    let missing = tree.root_children()[2].clone();

    let harness = Harness::new(CompareOptions::default());
    harness.publish(&tree);
    harness.withdraw(&missing);
    harness.announce(&tree.root);

    assert_eq!(harness.run_to_idle(), RunOutcome::Stalled);
    assert_eq!(harness.emitted().len(), 6);

    harness.publish(&tree);
    assert_eq!(harness.deliver(&missing), FetchCompletion::Attached);
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);

    let unique: BTreeSet<Name> = harness.emitted().into_iter().collect();
    assert_eq!(unique.len(), 9);
    assert_eq!(harness.emitted().len(), 9);
    assert_eq!(harness.stats().rounds_completed, 1);
}

#[test]
fn test_stalled_round_abandoned_without_reemission() {
    let all = labels(9);
    let bad = TreeBuilder::new(3).build(all.iter().map(|l| content_name(l)));
    let broken = bad.root_children()[1].clone();

    let harness = Harness::new(CompareOptions::default());
    harness.publish(&bad);
    harness.publish_raw(broken, Bytes::from_static(b"\xff"));
    harness.announce(&bad.root);
    assert_eq!(harness.run_to_idle(), RunOutcome::Stalled);
    assert_eq!(harness.emitted().len(), 6);

    let good = TreeBuilder::new(4).build(all.iter().map(|l| content_name(l)));
    harness.publish(&good);
    harness.announce(&good.root);
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);

    let all: Vec<&str> = all.iter().map(String::as_str).collect();
    assert_eq!(harness.emitted_sorted(), delivered(&all));
    assert_eq!(harness.stats().rounds_aborted, 1);
    assert_eq!(harness.stats().rounds_completed, 1);
    assert_eq!(harness.comparator.baseline(), Some(good.root.clone()));
}

#[test]
fn test_unreachable_baseline_stalls() {
    let y = TreeBuilder::new(3).build(names(&["a", "b"]));
    let harness = Harness::new(resuming_from(&NodeHash::digest(b"gone")));
    harness.publish(&y);
    harness.announce(&y.root);

    assert_eq!(harness.run_to_idle(), RunOutcome::Stalled);
    assert!(harness.emitted().is_empty());
}

#[test]
fn test_current_root_start_then_new_names() {
    let first = TreeBuilder::new(3).build(names(&["a", "b", "c"]));
    let second = TreeBuilder::new(3).build(names(&["a", "b", "c", "d", "e"]));

    let harness = Harness::new(CompareOptions::starting_at(StartPoint::CurrentRoot));
    harness.publish(&first);
    harness.publish(&second);

    // A bare hash waits until a current root has been adopted.
    harness.announce(&second.root);
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
    assert!(harness.emitted().is_empty());
    assert!(harness.issuer.requests().is_empty());

    harness.announce_body(first.root_bytes());
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
    assert_eq!(harness.emitted(), vec![delivered_name("d"), delivered_name("e")]);
    assert_eq!(harness.comparator.baseline(), Some(second.root.clone()));
}

#[test]
fn test_start_name_suppresses_earlier_names() {
    let tree = TreeBuilder::new(2).build(names(&["a", "b", "c", "d", "e"]));
    let options = CompareOptions::default().with_start_name(delivered_name("c"));
    let harness = Harness::new(options);
    harness.publish(&tree);
    harness.announce(&tree.root);

    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
    assert_eq!(harness.emitted(), delivered(&["c", "d", "e"]));
    assert_eq!(harness.stats().names_emitted, 5);

    // Same names, different shape: nothing new.
    let reshaped = TreeBuilder::new(4).build(names(&["a", "b", "c", "d", "e"]));
    harness.publish(&reshaped);
    harness.announce(&reshaped.root);
    assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
    assert_eq!(harness.emitted().len(), 3);
}

#[test]
fn test_shuffled_delivery_gives_same_result() {
    let all = labels(50);
    let tree = TreeBuilder::new(3).build(all.iter().map(|l| content_name(l)));
    let expected: Vec<&str> = all.iter().map(String::as_str).collect();

    for seed in 0..5 {
        let harness = Harness::new(CompareOptions::default()).shuffled(seed);
        harness.publish(&tree);
        harness.announce(&tree.root);
        assert_eq!(harness.run_to_idle(), RunOutcome::Idle);
        assert_eq!(harness.emitted(), delivered(&expected));
    }
}
