//! End-to-end tests for the sync monitor on a live tokio runtime.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ndnsync::cache::{FetchCompletion, FetchError};
use ndnsync::sync::memory::MemoryNodeStore;
use ndnsync::{
    CompareOptions, CompareState, MonitorConfig, Name, NameSink, NodeFetcher, NodeHash, Slice,
    SliceId, StartPoint, SyncConfig, SyncMonitor,
};
use ndnsync_testkit::{content_name, delivered_name, test_slice, TreeBuilder};
use tokio::runtime::Handle;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(debounce_ms: u64) -> MonitorConfig {
    MonitorConfig {
        sync: SyncConfig {
            debounce: Duration::from_millis(debounce_ms),
            fetch_timeout: Duration::from_secs(5),
            max_fetch_attempts: 3,
        },
    }
}

#[derive(Default)]
struct Collected(Mutex<Vec<Name>>);

impl Collected {
    fn names(&self) -> Vec<Name> {
        self.0.lock().unwrap().clone()
    }
}

impl NameSink for Collected {
    fn handle_name(&self, _slice: &Slice, name: &Name) {
        self.0.lock().unwrap().push(name.clone());
    }
}

fn labels(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("doc{:02}", i)).collect()
}

fn delivered(labels: &[String]) -> Vec<Name> {
    labels.iter().map(|l| delivered_name(l)).collect()
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn rounds(monitor: &SyncMonitor, id: &SliceId) -> u64 {
    monitor.stats(id).map(|s| s.rounds_completed).unwrap_or(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_announced_root_emits_names() {
    init_tracing();
    let store = Arc::new(MemoryNodeStore::new());
    let all = labels(12);
    let tree = TreeBuilder::new(3).build(all.iter().map(|l| content_name(l)));
    for (hash, bytes) in &tree.nodes {
        store.insert(hash.clone(), bytes.clone());
    }

    let monitor = SyncMonitor::new(Handle::current(), store.clone(), config(5));
    let sink = Arc::new(Collected::default());
    let id = monitor
        .start_sync(test_slice(), sink.clone(), CompareOptions::default())
        .unwrap();

    monitor.announce_root(&id, tree.root.clone()).unwrap();
    assert!(wait_for(|| rounds(&monitor, &id) == 1 && sink.names().len() == all.len()).await);

    assert_eq!(sink.names(), delivered(&all));
    assert_eq!(monitor.baseline(&id), Some(tree.root.clone()));
    assert_eq!(monitor.state(&id), Some(CompareState::Done));
    assert!(store.requests().contains(&tree.root));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_of_roots_reaches_every_name() {
    init_tracing();
    let store = Arc::new(MemoryNodeStore::with_latency(Duration::from_millis(2)));
    let all = labels(20);
    let roots: Vec<NodeHash> = [6, 13, 20]
        .iter()
        .map(|&n| {
            let tree = TreeBuilder::new(4).build(all[..n].iter().map(|l| content_name(l)));
            for (hash, bytes) in &tree.nodes {
                store.insert(hash.clone(), bytes.clone());
            }
            tree.root
        })
        .collect();

    let monitor = SyncMonitor::new(Handle::current(), store, config(30));
    let sink = Arc::new(Collected::default());
    let id = monitor
        .start_sync(test_slice(), sink.clone(), CompareOptions::default())
        .unwrap();

    for root in &roots {
        monitor.announce_root(&id, root.clone()).unwrap();
    }
    let unique = || sink.names().into_iter().collect::<BTreeSet<_>>();
    assert!(wait_for(|| unique().len() == all.len()).await);
    assert!(wait_for(|| monitor.state(&id) == Some(CompareState::Done)).await);

    let expected: BTreeSet<Name> = delivered(&all).into_iter().collect();
    assert_eq!(unique(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_debounce_delays_first_run() {
    let store = Arc::new(MemoryNodeStore::new());
    let tree = TreeBuilder::new(4).build(["a"].map(content_name));
    for (hash, bytes) in &tree.nodes {
        store.insert(hash.clone(), bytes.clone());
    }

    let monitor = SyncMonitor::new(Handle::current(), store.clone(), config(200));
    let sink = Arc::new(Collected::default());
    let id = monitor
        .start_sync(test_slice(), sink.clone(), CompareOptions::default())
        .unwrap();

    // Repeated announcements of one root collapse into a single queue entry.
    monitor.announce_root(&id, tree.root.clone()).unwrap();
    monitor.announce_root(&id, tree.root.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.requests().is_empty());

    assert!(wait_for(|| rounds(&monitor, &id) == 1 && !sink.names().is_empty()).await);
    assert_eq!(sink.names(), vec![delivered_name("a")]);
    assert_eq!(store.requests(), vec![tree.root.clone()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_current_root_start_through_monitor() {
    let store = Arc::new(MemoryNodeStore::new());
    let old = TreeBuilder::new(4).build(["a", "b"].map(content_name));
    let new = TreeBuilder::new(4).build(["a", "b", "c"].map(content_name));
    for (hash, bytes) in old.nodes.iter().chain(&new.nodes) {
        store.insert(hash.clone(), bytes.clone());
    }

    let monitor = SyncMonitor::new(Handle::current(), store, config(1));
    let sink = Arc::new(Collected::default());
    let id = monitor
        .start_sync(
            test_slice(),
            sink.clone(),
            CompareOptions::starting_at(StartPoint::CurrentRoot),
        )
        .unwrap();

    monitor.deliver_root_body(&id, old.root_bytes()).unwrap();
    assert!(wait_for(|| monitor.baseline(&id) == Some(old.root.clone())).await);
    assert!(sink.names().is_empty());

    monitor.announce_root(&id, new.root.clone()).unwrap();
    assert!(wait_for(|| rounds(&monitor, &id) == 1 && !sink.names().is_empty()).await);
    assert_eq!(sink.names(), vec![delivered_name("c")]);
}

/// Never answers: node bytes only arrive as named content.
struct Silent;

#[async_trait]
impl NodeFetcher for Silent {
    async fn fetch_node(&self, _slice: &Slice, hash: &NodeHash) -> Result<Bytes, FetchError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(FetchError::NotFound(hash.clone()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_node_content_routed_by_name() {
    init_tracing();
    let tree = TreeBuilder::new(8).build(["x", "y"].map(content_name));
    let monitor = SyncMonitor::new(Handle::current(), Arc::new(Silent), config(1));
    let sink = Arc::new(Collected::default());
    let slice = test_slice();
    let id = monitor
        .start_sync(slice.clone(), sink.clone(), CompareOptions::default())
        .unwrap();

    monitor.announce_root(&id, tree.root.clone()).unwrap();
    let name = slice.node_fetch_name(&tree.root);
    let completion = monitor
        .handle_node_content(&name, tree.root_bytes())
        .unwrap();
    assert_eq!(completion, FetchCompletion::Attached);

    assert!(wait_for(|| rounds(&monitor, &id) == 1 && sink.names().len() == 2).await);
    assert_eq!(sink.names(), vec![delivered_name("x"), delivered_name("y")]);

    // The same content again is a duplicate.
    assert_eq!(
        monitor
            .handle_node_content(&name, tree.root_bytes())
            .unwrap(),
        FetchCompletion::Duplicate
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_completions_after_stop_are_ignored() {
    init_tracing();
    let store = Arc::new(MemoryNodeStore::with_latency(Duration::from_millis(100)));
    let tree = TreeBuilder::new(4).build(["a", "b"].map(content_name));
    for (hash, bytes) in &tree.nodes {
        store.insert(hash.clone(), bytes.clone());
    }

    let monitor = SyncMonitor::new(Handle::current(), store.clone(), config(0));
    let sink = Arc::new(Collected::default());
    let id = monitor
        .start_sync(test_slice(), sink.clone(), CompareOptions::default())
        .unwrap();
    monitor.announce_root(&id, tree.root.clone()).unwrap();

    assert!(wait_for(|| !store.requests().is_empty()).await);
    assert!(monitor.stop_sync(&id));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(sink.names().is_empty());
    assert!(monitor.active_slices().is_empty());
    assert!(monitor.announce_root(&id, tree.root.clone()).is_err());
}
