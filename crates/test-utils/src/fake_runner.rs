// crates/test-utils/src/fake_runner.rs

//! Scripted in-memory task runner.
//!
//! Lets executor tests control per-task outcomes (exit codes, delays,
//! cache hits, restore failures) without spawning processes or touching
//! the filesystem.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use taskweave::errors::{EngineError, Result};
use taskweave::exec::{BoxFuture, TaskRunner};
use taskweave::task::{NodeResult, Task, TaskHash};

/// Scripted behavior for one task.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub delay: Option<Duration>,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            exit_code: 0,
            stdout: Vec::new(),
            delay: None,
        }
    }
}

impl FakeBehavior {
    pub fn failing(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn sleeping(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

/// In-memory runner with scripted outcomes. Unscripted tasks succeed
/// immediately with exit code 0.
#[derive(Debug, Default)]
pub struct FakeRunner {
    behaviors: Mutex<HashMap<String, FakeBehavior>>,
    /// Tasks whose probe reports a cache hit.
    cached: Mutex<HashSet<String>>,
    /// Tasks whose restore fails.
    restore_failures: Mutex<HashSet<String>>,
    /// Names of tasks that were actually run (not probed or restored).
    executed: Mutex<Vec<String>>,
    restored: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, name: &str, behavior: FakeBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(name.to_string(), behavior);
    }

    pub fn mark_cached(&self, name: &str) {
        self.cached.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_restore(&self, name: &str) {
        self.restore_failures
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn executed_tasks(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn restored_tasks(&self) -> Vec<String> {
        self.restored.lock().unwrap().clone()
    }

    fn fake_hash(task: &Task) -> TaskHash {
        TaskHash::new(format!("fake-{}", task.name))
    }

    fn behavior_for(&self, name: &str) -> FakeBehavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

impl TaskRunner for FakeRunner {
    fn probe(&self, task: &Task) -> BoxFuture<'_, Result<Option<NodeResult>>> {
        let task = task.clone();
        Box::pin(async move {
            if self.cached.lock().unwrap().contains(&task.name) {
                return Ok(Some(NodeResult {
                    hash: Self::fake_hash(&task),
                    exit_code: 0,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    from_cache: true,
                }));
            }
            Ok(None)
        })
    }

    fn run(&self, task: &Task) -> BoxFuture<'_, Result<NodeResult>> {
        let task = task.clone();
        Box::pin(async move {
            let behavior = self.behavior_for(&task.name);
            if let Some(delay) = behavior.delay {
                tokio::time::sleep(delay).await;
            }
            self.executed.lock().unwrap().push(task.name.clone());
            Ok(NodeResult {
                hash: Self::fake_hash(&task),
                exit_code: behavior.exit_code,
                stdout: behavior.stdout.clone(),
                stderr: Vec::new(),
                from_cache: false,
            })
        })
    }

    fn restore(&self, task: &Task) -> BoxFuture<'_, Result<NodeResult>> {
        let task = task.clone();
        Box::pin(async move {
            if self.restore_failures.lock().unwrap().contains(&task.name) {
                return Err(EngineError::Cache(format!(
                    "no cache entry for task {:?}",
                    task.name
                )));
            }
            self.restored.lock().unwrap().push(task.name.clone());
            Ok(NodeResult {
                hash: Self::fake_hash(&task),
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
                from_cache: true,
            })
        })
    }
}
