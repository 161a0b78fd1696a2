// tests/trace_canonical.rs

//! Canonical trace bytes from real executor runs.

use std::sync::Arc;

use taskweave::exec::Executor;
use taskweave::trace::{ExecutionTrace, TraceEvent, TraceEventKind};
use taskweave_test_utils::builders::chain_graph;
use taskweave_test_utils::{FakeBehavior, FakeRunner};

#[tokio::test]
async fn mixed_run_produces_locked_canonical_json() {
    let graph = Arc::new(chain_graph());
    let runner = Arc::new(FakeRunner::new());
    runner.mark_cached("a");
    runner.script("b", FakeBehavior::failing(1));

    let result = Executor::new(Arc::clone(&graph), runner as _)
        .run_serial()
        .await
        .unwrap();

    let json = String::from_utf8(result.trace_bytes.clone()).unwrap();
    let expected = format!(
        concat!(
            r#"{{"graphHash":"{}","events":["#,
            r#"{{"kind":"TaskArtifactsRestored","taskId":"a","reason":"CacheReplay"}},"#,
            r#"{{"kind":"TaskCached","taskId":"a","reason":"CacheHit"}},"#,
            r#"{{"kind":"TaskFailed","taskId":"b","reason":"ExitNonZero"}},"#,
            r#"{{"kind":"TaskSkipped","taskId":"c","causeTaskId":"b"}}"#,
            r#"]}}"#
        ),
        graph.hash()
    );
    assert_eq!(json, expected);
}

#[tokio::test]
async fn trace_hash_matches_canonical_bytes() {
    let graph = Arc::new(chain_graph());
    let runner = Arc::new(FakeRunner::new());
    let result = Executor::new(graph, runner as _).run_serial().await.unwrap();

    let reparsed: ExecutionTrace = serde_json::from_slice(&result.trace_bytes).unwrap();
    assert_eq!(reparsed.hash().unwrap(), result.trace_hash);
    assert_eq!(reparsed.canonical_json().unwrap(), result.trace_bytes);
}

#[test]
fn canonicalization_is_idempotent() {
    let mut trace = ExecutionTrace::new("gh");
    trace.events.push(
        TraceEvent::new(TraceEventKind::TaskArtifactsRestored, "b")
            .with_reason("CacheRestore")
            .with_artifacts(vec!["z.txt".into(), "a.txt".into(), "a.txt".into()]),
    );
    trace
        .events
        .push(TraceEvent::new(TraceEventKind::TaskCached, "a").with_reason("CacheHit"));

    trace.canonicalize();
    let once = trace.canonical_json().unwrap();
    trace.canonicalize();
    let twice = trace.canonical_json().unwrap();
    assert_eq!(once, twice);

    assert_eq!(trace.events[0].task_id, "a");
    assert_eq!(
        trace.events[1].artifacts.as_deref(),
        Some(["a.txt".to_string(), "z.txt".to_string()].as_slice())
    );
}
