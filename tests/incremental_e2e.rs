// tests/incremental_e2e.rs

//! End-to-end incremental scenario: a real shell chain executed once,
//! then replayed entirely from cache.

use std::fs;
use std::sync::Arc;

use taskweave::cache::{Cache, FileCache, NoCache};
use taskweave::exec::{CacheRunner, Executor, NodeState};
use taskweave::hasher::{InputResolver, TaskHasher};
use taskweave::incremental::{plan_incremental, Decision, GraphSnapshot};
use taskweave::trace::TraceEventKind;
use taskweave::TaskGraph;
use taskweave_test_utils::{DocumentBuilder, NodeBuilder};

fn chain_doc() -> DocumentBuilder {
    DocumentBuilder::new()
        .node(
            NodeBuilder::new("a")
                .run("printf 'A1' > a.txt")
                .output("a.txt"),
        )
        .node(
            NodeBuilder::new("b")
                .input("a.txt")
                .run(r#"read x < a.txt; printf '%sB' "$x" > b.txt"#)
                .output("b.txt"),
        )
        .node(
            NodeBuilder::new("c")
                .input("b.txt")
                .run("cat b.txt > c.txt")
                .output("c.txt"),
        )
        .edge("a", "b")
        .edge("b", "c")
}

#[tokio::test]
async fn chain_runs_clean_then_replays_from_cache() {
    let work = tempfile::tempdir().unwrap();
    let cache_dir = work.path().join("cache");
    let graph = Arc::new(chain_doc().build_graph());

    // First run: clean semantics, cache written through but never read.
    let cache: Arc<dyn Cache> = Arc::new(FileCache::new(&cache_dir));
    let runner = Arc::new(CacheRunner::new(work.path(), Arc::clone(&cache)).without_probing());
    let first = Executor::new(Arc::clone(&graph), runner as _)
        .run_serial()
        .await
        .unwrap();

    assert!(first
        .final_state
        .values()
        .all(|&s| s == NodeState::Completed));
    assert_eq!(
        fs::read_to_string(work.path().join("c.txt")).unwrap(),
        "A1B"
    );
    assert!(first
        .trace
        .events
        .iter()
        .all(|e| e.kind == TraceEventKind::TaskExecuted));

    // Second run: incremental probing replays everything from cache.
    let runner = Arc::new(CacheRunner::new(work.path(), Arc::clone(&cache)));
    let second = Executor::new(Arc::clone(&graph), runner as _)
        .run_serial()
        .await
        .unwrap();

    assert!(second.final_state.values().all(|&s| s == NodeState::Cached));
    assert!(second.trace.events.iter().all(|e| matches!(
        e.kind,
        TraceEventKind::TaskCached | TraceEventKind::TaskArtifactsRestored
    )));
    assert_eq!(
        fs::read_to_string(work.path().join("c.txt")).unwrap(),
        "A1B"
    );
    assert_eq!(first.graph_hash, second.graph_hash);
}

#[tokio::test]
async fn no_cache_backend_never_replays() {
    let work = tempfile::tempdir().unwrap();
    let graph = Arc::new(chain_doc().build_graph());
    let cache: Arc<dyn Cache> = Arc::new(NoCache);

    for _ in 0..2 {
        let runner = Arc::new(CacheRunner::new(work.path(), Arc::clone(&cache)));
        let result = Executor::new(Arc::clone(&graph), runner as _)
            .run_serial()
            .await
            .unwrap();

        // Probes miss and puts are discarded, so every run is fresh work.
        assert!(result
            .final_state
            .values()
            .all(|&s| s == NodeState::Completed));
        assert!(result
            .trace
            .events
            .iter()
            .all(|e| e.kind == TraceEventKind::TaskExecuted));
    }
}

#[tokio::test]
async fn populated_cache_plans_full_reuse() {
    let work = tempfile::tempdir().unwrap();
    let cache_dir = work.path().join("cache");
    let graph = Arc::new(chain_doc().build_graph());

    let cache: Arc<dyn Cache> = Arc::new(FileCache::new(&cache_dir));
    let runner = Arc::new(CacheRunner::new(work.path(), Arc::clone(&cache)).without_probing());
    Executor::new(Arc::clone(&graph), runner as _)
        .run_serial()
        .await
        .unwrap();

    let resolver = InputResolver::new(work.path());
    let hasher = TaskHasher::new(work.path());
    let snapshot = GraphSnapshot::capture(&graph, &resolver, &hasher).unwrap();

    let planning =
        plan_incremental(Some(&snapshot.clone()), &snapshot, &cache).unwrap();
    assert!(planning.invalidation.values().all(|e| !e.invalidated));
    assert!(planning
        .plan
        .decisions
        .values()
        .all(|d| *d == Decision::ReuseCache));
}

#[tokio::test]
async fn changed_input_invalidates_downstream_chain() {
    let work = tempfile::tempdir().unwrap();
    let cache_dir = work.path().join("cache");

    // Seed an undeclared source file that a's command copies; declaring
    // it as an input makes its content part of a's identity.
    fs::write(work.path().join("src.txt"), "v1").unwrap();
    let doc = DocumentBuilder::new()
        .node(
            NodeBuilder::new("a")
                .input("src.txt")
                .run("cat src.txt > a.txt")
                .output("a.txt"),
        )
        .node(
            NodeBuilder::new("b")
                .input("a.txt")
                .run("cat a.txt > b.txt")
                .output("b.txt"),
        )
        .edge("a", "b");
    let graph = Arc::new(doc.build_graph());

    let cache: Arc<dyn Cache> = Arc::new(FileCache::new(&cache_dir));
    let runner = Arc::new(CacheRunner::new(work.path(), Arc::clone(&cache)).without_probing());
    Executor::new(Arc::clone(&graph), runner as _)
        .run_serial()
        .await
        .unwrap();

    let resolver = InputResolver::new(work.path());
    let hasher = TaskHasher::new(work.path());
    let before = GraphSnapshot::capture(&graph, &resolver, &hasher).unwrap();

    fs::write(work.path().join("src.txt"), "v2").unwrap();
    let after = GraphSnapshot::capture(&graph, &resolver, &hasher).unwrap();

    let planning = plan_incremental(Some(&before), &after, &cache).unwrap();
    assert!(planning.invalidation["a"].invalidated);
    assert!(planning.invalidation["b"].invalidated);
    assert!(planning
        .plan
        .decisions
        .values()
        .all(|d| *d == Decision::Execute));
}

#[test]
fn missing_declared_input_is_workspace_error() {
    let work = tempfile::tempdir().unwrap();
    let doc = DocumentBuilder::new().node(
        NodeBuilder::new("a")
            .input("nowhere.txt")
            .run("true"),
    );
    let graph: TaskGraph = doc.build_graph();

    let resolver = InputResolver::new(work.path());
    let hasher = TaskHasher::new(work.path());
    let err = GraphSnapshot::capture(&graph, &resolver, &hasher).unwrap_err();
    assert_eq!(err.kind(), "workspace");
    assert!(err.to_string().contains("nowhere.txt"), "{err}");
}
