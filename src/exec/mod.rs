// src/exec/mod.rs

//! Execution layer: lifecycle state machine, runners and the
//! serial/parallel DAG executor.

pub mod executor;
pub mod observer;
pub mod runner;
pub mod state;

pub use executor::{Executor, GraphResult};
pub use observer::{RunObserver, TerminalSink};
pub use runner::{BoxFuture, CacheRunner, TaskRunner};
pub use state::{ExecutionState, NodeState};
