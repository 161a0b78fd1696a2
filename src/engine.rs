// src/engine.rs

//! Top-level driver mapping CLI invocations onto the engine.
//!
//! Responsibilities:
//! - workspace preparation and output-dir clearing
//! - cache selection per execution mode
//! - recovery store bookkeeping (run, checkpoint and failure records)
//! - resume validation (graph-hash continuity) and resume planning
//! - translating outcomes into canonical exit codes

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::cache::{Cache, FileCache};
use crate::cli::{
    exit_code_for, resolve_under_workdir, Command, Mode, PluginsCommand, ResumeArgs, RunArgs,
    EXIT_EXECUTION_ERROR, EXIT_PLUGIN_ERROR, EXIT_SUCCESS,
};
use crate::errors::{EngineError, Result};
use crate::exec::{CacheRunner, Executor};
use crate::graph::{parse_document, TaskGraph};
use crate::hasher::InputResolver;
use crate::incremental::ExecutionPlan;
use crate::plugins;
use crate::recovery::{
    build_resume_plan, CheckpointWriter, FailureClass, FailureRecord, RecoveryStore, RunMode,
    RunRecord, RunStatus,
};
use crate::trace::ExecutionTrace;
use crate::workspace::{prepare_output_dir, Workspace};

/// Execute one parsed CLI command and return the process exit code.
pub async fn execute(command: Command) -> i32 {
    let outcome = match command {
        Command::Validate { graph } => validate_command(&graph),
        Command::Hash { graph } => hash_command(&graph),
        Command::Run(args) => run_command(args).await,
        Command::Resume(args) => resume_command(args).await,
        Command::Plugins { command } => plugins_command(command),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            exit_code_for(&err)
        }
    }
}

fn load_graph(path: &Path) -> Result<TaskGraph> {
    let data = std::fs::read(path)
        .map_err(|e| EngineError::Workspace(format!("reading graph {}: {e}", path.display())))?;
    let doc = parse_document(&data)?;
    TaskGraph::from_document(&doc)
}

fn validate_command(graph_path: &Path) -> Result<i32> {
    load_graph(graph_path)?;
    Ok(EXIT_SUCCESS)
}

fn hash_command(graph_path: &Path) -> Result<i32> {
    let graph = load_graph(graph_path)?;
    println!("{}", graph.hash());
    Ok(EXIT_SUCCESS)
}

fn plugins_command(command: PluginsCommand) -> Result<i32> {
    match command {
        PluginsCommand::List { workdir } => {
            if !workdir.is_dir() {
                eprintln!("working directory does not exist: {}", workdir.display());
                return Ok(EXIT_PLUGIN_ERROR);
            }
            let root = workdir.join(crate::workspace::STATE_DIR).join("plugins");
            for line in plugins::list_plugin_states(&root) {
                println!("{line}");
            }
            Ok(EXIT_SUCCESS)
        }
    }
}

struct ExecInvocation {
    work_dir: PathBuf,
    graph_path: PathBuf,
    cache_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    mode: RunMode,
    jobs: usize,
    trace: TraceSink,
    previous_run_id: Option<String>,
}

/// Where the canonical trace bytes go, if anywhere.
enum TraceSink {
    Disabled,
    Stderr,
    File(PathBuf),
}

fn trace_sink(work_dir: &Path, trace: bool, trace_out: Option<PathBuf>) -> TraceSink {
    match (trace_out, trace) {
        (Some(path), _) => TraceSink::File(resolve_under_workdir(work_dir, &path)),
        (None, true) => TraceSink::Stderr,
        (None, false) => TraceSink::Disabled,
    }
}

async fn run_command(args: RunArgs) -> Result<i32> {
    let inv = ExecInvocation {
        graph_path: resolve_under_workdir(&args.workdir, &args.graph),
        cache_dir: args
            .cache_dir
            .map(|p| resolve_under_workdir(&args.workdir, &p)),
        output_dir: args
            .output_dir
            .map(|p| resolve_under_workdir(&args.workdir, &p)),
        trace: trace_sink(&args.workdir, args.trace, args.trace_out),
        work_dir: args.workdir,
        mode: match args.mode {
            Mode::Clean => RunMode::Clean,
            Mode::Incremental => RunMode::Incremental,
        },
        jobs: args.jobs,
        previous_run_id: None,
    };
    execute_graph(inv).await
}

async fn resume_command(args: ResumeArgs) -> Result<i32> {
    let inv = ExecInvocation {
        graph_path: resolve_under_workdir(&args.workdir, &args.graph),
        cache_dir: None,
        output_dir: None,
        trace: trace_sink(&args.workdir, args.trace, args.trace_out),
        work_dir: args.workdir,
        mode: if args.retry_failed_only {
            RunMode::ResumeFailedOnly
        } else {
            RunMode::Resume
        },
        jobs: args.jobs,
        previous_run_id: Some(args.previous_run_id),
    };
    execute_graph(inv).await
}

async fn execute_graph(inv: ExecInvocation) -> Result<i32> {
    let ws = Workspace::ensure(&inv.work_dir)?;
    let store = RecoveryStore::new(ws.runs_dir());
    let run_id = store.new_run_id();

    // Load and hash the graph. A failed load is recorded before the
    // validation error surfaces.
    let graph = match load_graph(&inv.graph_path) {
        Ok(graph) => Arc::new(graph),
        Err(err) => {
            record_graph_failure(&store, &run_id, &inv, &err);
            return Err(err);
        }
    };
    let graph_hash = graph.hash().clone();

    // Resume: enforce graph-hash continuity before anything else runs.
    let mut retry_count = 0;
    if let Some(previous_run_id) = &inv.previous_run_id {
        let prev = store.load_run(previous_run_id).map_err(|_| {
            EngineError::Semantic(format!("previous run not found: {previous_run_id}"))
        })?;
        if prev.graph_hash != graph_hash.as_str() {
            return Err(EngineError::Semantic(format!(
                "graph hash mismatch for previous run {previous_run_id}: \
                 expected {}, current graph is {graph_hash}",
                prev.graph_hash
            )));
        }
        retry_count = prev.retry_count + 1;
    }

    if let Some(output_dir) = &inv.output_dir {
        if let Err(err) = prepare_output_dir(output_dir) {
            record_failure(
                &store,
                &run_id,
                FailureRecord::new(
                    FailureClass::WorkspaceFailure,
                    None,
                    "OutputDir",
                    err.to_string(),
                    false,
                ),
            );
            return Err(err);
        }
    }

    let cache_dir = inv.cache_dir.clone().unwrap_or_else(|| ws.cache_dir());
    std::fs::create_dir_all(&cache_dir)?;
    let cache: Arc<dyn Cache> = Arc::new(FileCache::new(cache_dir));

    // Clean mode writes results through to the cache but never reads it.
    let runner = CacheRunner::new(&inv.work_dir, Arc::clone(&cache));
    let runner = Arc::new(match inv.mode {
        RunMode::Clean => runner.without_probing(),
        _ => runner,
    });

    // Resume planning reuses checkpointed work where the current task
    // hash still matches and the cache entry survives.
    let mut plan: Option<ExecutionPlan> = None;
    if let Some(previous_run_id) = &inv.previous_run_id {
        let checkpoints = store.load_all_checkpoints(previous_run_id)?;
        let resume_plan = build_resume_plan(
            &graph,
            &checkpoints,
            &cache,
            runner.resolver(),
            runner.hasher(),
            &*runner,
        )
        .await?;
        info!(
            previous_run_id = %previous_run_id,
            reused = resume_plan
                .decisions
                .values()
                .filter(|d| matches!(d, crate::incremental::Decision::ReuseCache))
                .count(),
            "resume plan built"
        );
        plan = Some(resume_plan);
    }

    store.start_run(&RunRecord {
        run_id: run_id.clone(),
        graph_hash: graph_hash.as_str().to_string(),
        start_time: Utc::now(),
        mode: inv.mode,
        retry_count,
        status: RunStatus::Running,
        previous_run_id: inv.previous_run_id.clone(),
    })?;

    let mut executor = Executor::new(Arc::clone(&graph), runner);
    if let Some(plan) = plan {
        executor = executor.with_plan(plan);
    }
    if !matches!(inv.mode, RunMode::Clean) {
        executor = executor.with_terminal_sink(Arc::new(CheckpointWriter::new(
            store.clone(),
            run_id.clone(),
            Arc::clone(&cache),
            InputResolver::new(&inv.work_dir),
        )));
    }

    let result = if inv.jobs > 1 {
        executor.run_parallel(inv.jobs).await
    } else {
        executor.run_serial().await
    };

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            let has_checkpoints = store
                .load_all_checkpoints(&run_id)
                .map(|c| !c.is_empty())
                .unwrap_or(false);
            record_failure(
                &store,
                &run_id,
                FailureRecord::new(
                    FailureClass::SystemFailure,
                    None,
                    "EngineError",
                    err.to_string(),
                    has_checkpoints,
                ),
            );
            let _ = store.finish_run(&run_id, RunStatus::Failed);
            let empty = ExecutionTrace::new(graph_hash.as_str());
            if let Ok(bytes) = empty.canonical_json() {
                emit_trace(&inv.trace, &bytes);
            }
            return Err(err);
        }
    };

    emit_trace(&inv.trace, &result.trace_bytes);

    if result.has_failures() {
        let failed = result.failed_tasks().first().map(|s| s.to_string());
        record_failure(
            &store,
            &run_id,
            FailureRecord::new(
                FailureClass::ExecutionFailure,
                failed.clone(),
                "NodeFailed",
                format!("node {} failed", failed.as_deref().unwrap_or("?")),
                true,
            ),
        );
        let _ = store.finish_run(&run_id, RunStatus::Failed);
        return Ok(EXIT_EXECUTION_ERROR);
    }

    store.finish_run(&run_id, RunStatus::Completed)?;
    Ok(EXIT_SUCCESS)
}

fn record_graph_failure(
    store: &RecoveryStore,
    run_id: &str,
    inv: &ExecInvocation,
    err: &EngineError,
) {
    let code = match err {
        EngineError::Schema(_) => "SchemaViolation",
        EngineError::Structural { .. } => "StructuralInvalidity",
        EngineError::Semantic(_) => "UnsupportedSchemaVersion",
        _ => "GraphLoadError",
    };
    let record = RunRecord {
        run_id: run_id.to_string(),
        graph_hash: String::new(),
        start_time: Utc::now(),
        mode: inv.mode,
        retry_count: 0,
        status: RunStatus::Failed,
        previous_run_id: inv.previous_run_id.clone(),
    };
    if store.start_run(&record).is_err() {
        warn!(run_id = %run_id, "failed to persist run record for graph failure");
    }
    record_failure(
        store,
        run_id,
        FailureRecord::new(
            FailureClass::GraphFailure,
            None,
            code,
            err.to_string(),
            false,
        ),
    );
}

fn record_failure(store: &RecoveryStore, run_id: &str, failure: FailureRecord) {
    if let Err(err) = store.record_failure(run_id, &failure) {
        warn!(run_id = %run_id, error = %err, "failed to persist failure record");
    }
}

fn emit_trace(sink: &TraceSink, bytes: &[u8]) {
    match sink {
        TraceSink::Disabled => {}
        TraceSink::Stderr => {
            let mut stderr = std::io::stderr().lock();
            let _ = stderr.write_all(bytes);
            let _ = stderr.write_all(b"\n");
        }
        TraceSink::File(path) => {
            if let Err(err) = std::fs::write(path, bytes) {
                warn!(path = %path.display(), error = %err, "failed to write trace file");
            }
        }
    }
}
