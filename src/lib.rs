// src/lib.rs

pub mod cache;
pub mod cli;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod hasher;
pub mod incremental;
pub mod logging;
pub mod plugins;
pub mod recovery;
pub mod task;
pub mod trace;
pub mod workspace;

pub use errors::{EngineError, Result, StructuralKind};
pub use exec::{CacheRunner, Executor, GraphResult, NodeState, RunObserver, TaskRunner, TerminalSink};
pub use graph::{GraphHash, TaskGraph};
pub use task::{NodeResult, Task, TaskHash};
