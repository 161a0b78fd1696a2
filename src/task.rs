// src/task.rs

//! Core task model shared by the graph, planner, executor and cache.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single unit of work with fully declared effects.
///
/// Two tasks with identical fields are identical: there is no hidden
/// state, and nothing outside these fields may influence scheduling or
/// hashing decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Stable identifier, unique within a graph.
    pub name: String,
    /// Opaque node type from the graph document. Participates in the task
    /// hash and runner dispatch only; invalidation logic never reads it.
    pub kind: String,
    /// Shell command executed for this task. May be empty.
    pub command: String,
    /// Declared input paths, relative to the working directory.
    /// Sorted and deduplicated at construction.
    pub inputs: Vec<String>,
    /// Declared environment variables (sorted by key).
    pub env: BTreeMap<String, String>,
    /// Declared output paths, relative to the working directory.
    /// Sorted and deduplicated at construction.
    pub outputs: Vec<String>,
}

/// Stable content identity of a task: resolved input digests, command,
/// env, outputs and working-directory identity. Doubles as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHash(String);

impl TaskHash {
    pub fn new(hex: impl Into<String>) -> Self {
        TaskHash(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observed outcome of one task, fresh or replayed from cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResult {
    pub hash: TaskHash,
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub from_cache: bool,
}

impl NodeResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Sort + dedup helper used wherever declared path lists are set-valued.
pub fn normalize_string_set(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items.dedup();
    items
}
