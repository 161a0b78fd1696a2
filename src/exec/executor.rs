// src/exec/executor.rs

//! Deterministic DAG executor, serial and parallel.
//!
//! One coordinator owns all shared state. Workers only execute tasks
//! (cache probe, restore, or run) and publish results over a completion
//! channel; every state transition, trace event, result write and
//! order append happens on the coordinator under a single mutex. Task
//! execution itself always happens outside that lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::errors::{EngineError, Result};
use crate::exec::observer::{notify_terminal, observe, RunObserver, TerminalSink};
use crate::exec::runner::TaskRunner;
use crate::exec::state::{ExecutionState, NodeState};
use crate::graph::{GraphHash, TaskGraph};
use crate::incremental::{Decision, ExecutionPlan, InvalidationMap};
use crate::task::{NodeResult, Task, TaskHash};
use crate::trace::{reason, ExecutionTrace, TraceEvent, TraceEventKind, TraceRecorder};

/// Final outcome of one graph run.
#[derive(Debug, Clone)]
pub struct GraphResult {
    pub graph_hash: GraphHash,
    pub final_state: BTreeMap<String, NodeState>,
    /// Dispatch order: deterministic for a fixed graph, plan and mode.
    pub execution_order: Vec<String>,
    pub results: BTreeMap<String, NodeResult>,
    pub trace: ExecutionTrace,
    /// Canonical trace bytes; empty if serialization failed.
    pub trace_bytes: Vec<u8>,
    /// SHA-256 hex of the canonical trace bytes; empty if unavailable.
    pub trace_hash: String,
}

impl GraphResult {
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.final_state
            .iter()
            .filter(|(_, &s)| s == NodeState::Failed)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.final_state.values().any(|&s| s == NodeState::Failed)
    }
}

/// Coordinator-owned mutable run data. Everything in here is committed
/// under the executor's single mutex.
struct RunData {
    state: ExecutionState,
    order: Vec<String>,
    results: BTreeMap<String, NodeResult>,
    recorder: TraceRecorder,
}

enum WorkKind {
    Run,
    Restore,
    ProbeOrRun,
}

enum WorkOutcome {
    /// Fresh execution finished (any exit code).
    Executed(NodeResult),
    /// Cache probe hit; artifacts already restored.
    CacheHit(NodeResult),
    /// Planned reuse restored successfully.
    Restored(NodeResult),
    /// Planned reuse could not be restored; becomes a task failure.
    RestoreFailed(String),
    /// Infrastructure error; fatal to the run.
    Fatal(EngineError),
}

struct WorkDone {
    name: String,
    outcome: WorkOutcome,
}

/// Executes one task graph. Create one executor per run.
pub struct Executor {
    graph: Arc<TaskGraph>,
    runner: Arc<dyn TaskRunner>,
    plan: Option<ExecutionPlan>,
    invalidation: Option<InvalidationMap>,
    observer: Option<Arc<dyn RunObserver>>,
    terminal_sink: Option<Arc<dyn TerminalSink>>,
    cancel: Option<watch::Receiver<bool>>,
    data: Mutex<RunData>,
}

impl Executor {
    pub fn new(graph: Arc<TaskGraph>, runner: Arc<dyn TaskRunner>) -> Self {
        let state = ExecutionState::new(&graph);
        Self {
            graph,
            runner,
            plan: None,
            invalidation: None,
            observer: None,
            terminal_sink: None,
            cancel: None,
            data: Mutex::new(RunData {
                state,
                order: Vec::new(),
                results: BTreeMap::new(),
                recorder: TraceRecorder::new(),
            }),
        }
    }

    /// Overlay a precomputed plan. With a plan, on-the-fly cache probing
    /// is skipped: the decision is authoritative.
    pub fn with_plan(mut self, plan: ExecutionPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Attach the invalidation map backing the plan, so the trace carries
    /// one `TaskInvalidated` event per invalidated node.
    pub fn with_invalidation(mut self, invalidation: InvalidationMap) -> Self {
        self.invalidation = Some(invalidation);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_terminal_sink(mut self, sink: Arc<dyn TerminalSink>) -> Self {
        self.terminal_sink = Some(sink);
        self
    }

    /// Cancellation signal: send `true` to stop further dispatch.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn lock(&self) -> MutexGuard<'_, RunData> {
        // A poisoned coordinator mutex means a panic already tore down the
        // run; propagate the inner state regardless.
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn record_invalidation_events(&self) {
        let Some(invalidation) = &self.invalidation else {
            return;
        };
        let mut data = self.lock();
        for (name, entry) in invalidation {
            if !entry.invalidated {
                continue;
            }
            let mut event = TraceEvent::new(TraceEventKind::TaskInvalidated, name.clone());
            if let Some(first) = entry.reasons.first() {
                event = event.with_reason(first.kind.as_str());
            }
            data.recorder.record(event);
        }
    }

    /// Run the graph serially: always dispatch the deterministic leftmost
    /// ready task.
    pub async fn run_serial(self) -> Result<GraphResult> {
        observe("before_run", || {
            if let Some(obs) = &self.observer {
                obs.before_run();
            }
        });
        self.record_invalidation_events();

        loop {
            if self.cancelled() {
                return Err(EngineError::Cancelled);
            }

            let (next, task, kind) = {
                let mut data = self.lock();
                let ready = data.state.ready_tasks(&self.graph);
                let Some(next) = ready.first().cloned() else {
                    if data.state.all_terminal() {
                        drop(data);
                        return self.finalize();
                    }
                    return Err(EngineError::System(
                        "no ready tasks but graph not finished".to_string(),
                    ));
                };
                let task = self
                    .graph
                    .task(&next)
                    .cloned()
                    .ok_or_else(|| EngineError::System(format!("unknown task {next:?}")))?;

                let kind = match &self.plan {
                    Some(plan) => match plan.decision(&next) {
                        Decision::ReuseCache => WorkKind::Restore,
                        Decision::Execute => {
                            data.state
                                .transition(&next, NodeState::Pending, NodeState::Running)?;
                            WorkKind::Run
                        }
                    },
                    None => WorkKind::ProbeOrRun,
                };
                data.order.push(next.clone());
                (next, task, kind)
            };

            observe("before_node", || {
                if let Some(obs) = &self.observer {
                    obs.before_node(&next);
                }
            });

            // Execute outside the lock.
            let outcome = perform_work(&*self.runner, &task, &kind).await;

            self.commit(&task, outcome)?;

            observe("after_node", || {
                if let Some(obs) = &self.observer {
                    obs.after_node(&next);
                }
            });
        }
    }

    /// Run the graph with up to `concurrency` concurrent workers.
    ///
    /// Dispatch is depth-staged: tasks are grouped by topological depth
    /// and dispatched in lexicographic order within a depth; a later
    /// depth never starts before all in-flight work of the current depth
    /// has committed. This makes the dispatch order independent of worker
    /// interleaving, and the canonically sorted trace makes the output
    /// bytes identical across concurrency levels.
    pub async fn run_parallel(mut self, concurrency: usize) -> Result<GraphResult> {
        if concurrency == 0 {
            return Err(EngineError::System("concurrency must be > 0".to_string()));
        }

        observe("before_run", || {
            if let Some(obs) = &self.observer {
                obs.before_run();
            }
        });
        self.record_invalidation_events();

        let (done_tx, mut done_rx) = mpsc::channel::<WorkDone>(concurrency);
        let mut in_flight: usize = 0;
        let mut cancel = self.cancel.take();

        let by_depth: Vec<Vec<String>> = self
            .graph
            .names_by_depth()
            .into_iter()
            .map(|names| names.into_iter().map(str::to_string).collect())
            .collect();

        for names in &by_depth {
            let mut next_idx = 0usize;
            loop {
                let mut to_spawn: Vec<(Task, WorkKind)> = Vec::new();
                let stage_done;
                let dispatch_allowed = !cancel.as_ref().is_some_and(|rx| *rx.borrow());
                {
                    let mut data = self.lock();
                    while dispatch_allowed
                        && in_flight + to_spawn.len() < concurrency
                        && next_idx < names.len()
                    {
                        let name = &names[next_idx];
                        let current = data.state.state_of(name).ok_or_else(|| {
                            EngineError::System(format!("unknown task {name:?}"))
                        })?;

                        // Skipped by an earlier failure: never dispatched.
                        if current.is_terminal() {
                            next_idx += 1;
                            continue;
                        }
                        if current != NodeState::Pending {
                            return Err(EngineError::System(format!(
                                "unexpected non-pending state for {name:?}: {current}"
                            )));
                        }
                        let deps_ok = self
                            .graph
                            .upstream_of(name)
                            .iter()
                            .all(|p| data.state.state_of(p).is_some_and(|s| s.is_successful()));
                        if !deps_ok {
                            return Err(EngineError::System(format!(
                                "task {name:?} is pending but dependencies are not successful"
                            )));
                        }

                        let kind = match &self.plan {
                            Some(plan) => match plan.decision(name) {
                                Decision::ReuseCache => WorkKind::Restore,
                                Decision::Execute => {
                                    data.state.transition(
                                        name,
                                        NodeState::Pending,
                                        NodeState::Running,
                                    )?;
                                    WorkKind::Run
                                }
                            },
                            None => WorkKind::ProbeOrRun,
                        };
                        data.order.push(name.clone());
                        let task = self
                            .graph
                            .task(name)
                            .cloned()
                            .ok_or_else(|| EngineError::System(format!("unknown task {name:?}")))?;
                        to_spawn.push((task, kind));
                        next_idx += 1;
                    }
                    stage_done =
                        next_idx >= names.len() && in_flight == 0 && to_spawn.is_empty();
                }

                if stage_done {
                    break;
                }
                if !dispatch_allowed && in_flight == 0 {
                    return Err(EngineError::Cancelled);
                }

                for (task, kind) in to_spawn {
                    observe("before_node", || {
                        if let Some(obs) = &self.observer {
                            obs.before_node(&task.name);
                        }
                    });
                    let runner = Arc::clone(&self.runner);
                    let tx = done_tx.clone();
                    in_flight += 1;
                    tokio::spawn(async move {
                        let outcome = perform_work(&*runner, &task, &kind).await;
                        let _ = tx
                            .send(WorkDone {
                                name: task.name.clone(),
                                outcome,
                            })
                            .await;
                    });
                }

                if in_flight == 0 {
                    continue;
                }

                let received = match cancel.as_mut() {
                    Some(rx) => {
                        tokio::select! {
                            _ = wait_cancelled(rx) => None,
                            done = done_rx.recv() => Some(done),
                        }
                    }
                    None => Some(done_rx.recv().await),
                };

                match received {
                    None => {
                        // Cancellation: stop dispatch, let in-flight work
                        // complete and commit, then surface the typed error.
                        debug!(in_flight, "cancellation observed; draining in-flight tasks");
                        while in_flight > 0 {
                            let Some(done) = done_rx.recv().await else {
                                break;
                            };
                            in_flight -= 1;
                            if matches!(&done.outcome, WorkOutcome::Fatal(_)) {
                                continue;
                            }
                            if let Some(task) = self.graph.task(&done.name).cloned() {
                                self.commit(&task, done.outcome)?;
                            }
                        }
                        return Err(EngineError::Cancelled);
                    }
                    Some(None) => {
                        return Err(EngineError::System(
                            "completion channel closed unexpectedly".to_string(),
                        ));
                    }
                    Some(Some(done)) => {
                        in_flight -= 1;
                        let name = done.name.clone();
                        let task = self.graph.task(&name).cloned().ok_or_else(|| {
                            EngineError::System(format!("completion for unknown task {name:?}"))
                        })?;
                        self.commit(&task, done.outcome)?;
                        observe("after_node", || {
                            if let Some(obs) = &self.observer {
                                obs.after_node(&name);
                            }
                        });
                    }
                }
            }
        }

        self.finalize()
    }

    /// Commit one work outcome under the coordinator mutex. The terminal
    /// sink runs after the trace event is appended, outside the lock.
    fn commit(&self, task: &Task, outcome: WorkOutcome) -> Result<()> {
        let name = task.name.as_str();
        let committed: Option<NodeResult> = {
            let mut data = self.lock();
            match outcome {
                WorkOutcome::Fatal(err) => return Err(err),
                WorkOutcome::Executed(result) => {
                    // The probe-or-run path leaves the node Pending until
                    // its worker reports back.
                    if data.state.state_of(name) == Some(NodeState::Pending) {
                        data.state
                            .transition(name, NodeState::Pending, NodeState::Running)?;
                    }
                    data.results.insert(name.to_string(), result.clone());
                    if result.succeeded() {
                        data.state
                            .transition(name, NodeState::Running, NodeState::Completed)?;
                        data.recorder
                            .record(TraceEvent::new(TraceEventKind::TaskExecuted, name));
                    } else {
                        data.recorder.record(
                            TraceEvent::new(TraceEventKind::TaskFailed, name)
                                .with_reason(reason::EXIT_NON_ZERO),
                        );
                        data.state.fail_and_propagate(&self.graph, name)?;
                    }
                    Some(result)
                }
                WorkOutcome::CacheHit(result) => {
                    data.state
                        .transition(name, NodeState::Pending, NodeState::Cached)?;
                    data.results.insert(name.to_string(), result.clone());
                    data.recorder.record(
                        TraceEvent::new(TraceEventKind::TaskCached, name)
                            .with_reason(reason::CACHE_HIT),
                    );
                    data.recorder.record(
                        TraceEvent::new(TraceEventKind::TaskArtifactsRestored, name)
                            .with_reason(reason::CACHE_REPLAY)
                            .with_artifacts(task.outputs.clone()),
                    );
                    Some(result)
                }
                WorkOutcome::Restored(result) => {
                    data.state
                        .transition(name, NodeState::Pending, NodeState::Cached)?;
                    data.results.insert(name.to_string(), result.clone());
                    data.recorder.record(
                        TraceEvent::new(TraceEventKind::TaskCached, name)
                            .with_reason(reason::PLANNED_REUSE_CACHE),
                    );
                    data.recorder.record(
                        TraceEvent::new(TraceEventKind::TaskArtifactsRestored, name)
                            .with_reason(reason::CACHE_RESTORE)
                            .with_artifacts(task.outputs.clone()),
                    );
                    Some(result)
                }
                WorkOutcome::RestoreFailed(msg) => {
                    let message = format!("restoring task {name:?} from cache failed: {msg}");
                    warn!(task = %name, "{message}");
                    let result = NodeResult {
                        hash: TaskHash::new(""),
                        exit_code: 1,
                        stdout: Vec::new(),
                        stderr: message.into_bytes(),
                        from_cache: false,
                    };
                    data.results.insert(name.to_string(), result.clone());
                    data.recorder.record(
                        TraceEvent::new(TraceEventKind::TaskFailed, name)
                            .with_reason(reason::RESTORE_FAILED),
                    );
                    data.state
                        .transition(name, NodeState::Pending, NodeState::Running)?;
                    data.state.fail_and_propagate(&self.graph, name)?;
                    Some(result)
                }
            }
        };

        if let Some(result) = committed {
            notify_terminal(self.terminal_sink.as_deref(), task, &result);
        }
        Ok(())
    }

    /// Emit skip events from the final cause map, canonicalize the trace
    /// and assemble the graph result. Trace serialization failures leave
    /// the bytes empty; they never fail the run.
    fn finalize(self) -> Result<GraphResult> {
        let data = match self.data.into_inner() {
            Ok(data) => data,
            Err(poisoned) => poisoned.into_inner(),
        };
        let RunData {
            state,
            order,
            results,
            mut recorder,
        } = data;

        for (name, cause) in state.skip_causes() {
            recorder.record(
                TraceEvent::new(TraceEventKind::TaskSkipped, name.clone()).with_cause(cause.clone()),
            );
        }

        let trace = recorder.into_trace(self.graph.hash().as_str());
        let (trace_bytes, trace_hash) = match (trace.canonical_json(), trace.hash()) {
            (Ok(bytes), Ok(hash)) => (bytes, hash),
            _ => {
                warn!("trace serialization failed; emitting empty trace bytes");
                (Vec::new(), String::new())
            }
        };

        observe("after_run", || {
            if let Some(obs) = &self.observer {
                obs.after_run();
            }
        });

        Ok(GraphResult {
            graph_hash: self.graph.hash().clone(),
            final_state: state.snapshot(),
            execution_order: order,
            results,
            trace,
            trace_bytes,
            trace_hash,
        })
    }
}

async fn perform_work(runner: &dyn TaskRunner, task: &Task, kind: &WorkKind) -> WorkOutcome {
    match kind {
        WorkKind::Run => match runner.run(task).await {
            Ok(result) => WorkOutcome::Executed(result),
            Err(err) => WorkOutcome::Fatal(with_task_context(err, &task.name)),
        },
        WorkKind::Restore => match runner.restore(task).await {
            Ok(result) if result.succeeded() => WorkOutcome::Restored(result),
            Ok(result) => WorkOutcome::RestoreFailed(format!(
                "cached entry has exit code {}",
                result.exit_code
            )),
            Err(err) => WorkOutcome::RestoreFailed(err.to_string()),
        },
        WorkKind::ProbeOrRun => match runner.probe(task).await {
            Err(err) => WorkOutcome::Fatal(with_task_context(err, &task.name)),
            Ok(Some(result)) => WorkOutcome::CacheHit(result),
            Ok(None) => match runner.run(task).await {
                Ok(result) => WorkOutcome::Executed(result),
                Err(err) => WorkOutcome::Fatal(with_task_context(err, &task.name)),
            },
        },
    }
}

/// Prefix infrastructure errors with the task they arose from, keeping
/// the error kind intact.
fn with_task_context(err: EngineError, task: &str) -> EngineError {
    match err {
        EngineError::Workspace(msg) => EngineError::Workspace(format!("task {task:?}: {msg}")),
        EngineError::Cache(msg) => EngineError::Cache(format!("task {task:?}: {msg}")),
        EngineError::Execution(msg) => EngineError::Execution(format!("task {task:?}: {msg}")),
        other => other,
    }
}

/// Resolve only when the watch channel observes `true`. A dropped sender
/// means cancellation can no longer arrive; park forever in that case.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
