// src/exec/observer.rs

//! Read-only observation surface for external observers (plugins,
//! checkpoint writers, diagnostics).
//!
//! Observers never receive mutable references to graph, state, cache or
//! trace; isolation is by construction. The executor wraps every call in
//! a fault boundary: a panicking or erroring observer is reported
//! out-of-band and the run continues.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::errors::Result;
use crate::task::{NodeResult, Task};

/// Lifecycle observation points. Implementations must be inert: no state
/// mutation, no scheduling influence, quick returns.
pub trait RunObserver: Send + Sync {
    fn before_run(&self) {}
    fn after_run(&self) {}
    fn before_node(&self, _name: &str) {}
    fn after_node(&self, _name: &str) {}
}

/// Receives each committed terminal result. The checkpoint writer hangs
/// off this; errors are diagnostics, never run failures.
pub trait TerminalSink: Send + Sync {
    fn on_task_terminal(&self, task: &Task, result: &NodeResult) -> Result<()>;
}

/// Run an observer call inside a fault boundary.
pub(crate) fn observe<F: FnOnce()>(what: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(hook = %what, "observer panicked; continuing run");
    }
}

/// Run a terminal-sink call inside a fault boundary.
pub(crate) fn notify_terminal(
    sink: Option<&dyn TerminalSink>,
    task: &Task,
    result: &NodeResult,
) {
    let Some(sink) = sink else { return };
    let outcome = catch_unwind(AssertUnwindSafe(|| sink.on_task_terminal(task, result)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(task = %task.name, error = %err, "terminal sink failed; continuing run");
        }
        Err(_) => {
            warn!(task = %task.name, "terminal sink panicked; continuing run");
        }
    }
}
