// src/hasher.rs

//! Content-addressed input resolution and task identity hashing.
//!
//! The task hash is the cache key and the planner's invalidation
//! identity. It covers resolved input *contents* (not just paths), the
//! command, the declared env and outputs, and the working-directory
//! identity. Env iteration order cannot affect the result because env
//! maps are ordered.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use blake3::Hasher;

use crate::errors::{EngineError, Result};
use crate::task::{Task, TaskHash};

/// Compute the blake3 digest of a single file, streaming.
/// Symlinks are followed, so the digest reflects the target content.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| EngineError::Workspace(format!("opening input {}: {e}", path.display())))?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| EngineError::Workspace(format!("reading input {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// A declared input resolved to its content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    /// Declared path, relative to the working directory.
    pub path: String,
    pub digest: String,
}

/// Resolves declared input paths against a working directory.
#[derive(Debug, Clone)]
pub struct InputResolver {
    work_dir: PathBuf,
}

impl InputResolver {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolve declared inputs to content digests, sorted by path.
    ///
    /// A missing declared input is a workspace error: hashing an absent
    /// file would silently produce a wrong identity.
    pub fn resolve(&self, inputs: &[String]) -> Result<Vec<ResolvedInput>> {
        let mut sorted: Vec<&String> = inputs.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut resolved = Vec::with_capacity(sorted.len());
        for input in sorted {
            let full = self.work_dir.join(input);
            if !full.is_file() {
                return Err(EngineError::Workspace(format!(
                    "declared input not found: {input}"
                )));
            }
            resolved.push(ResolvedInput {
                path: input.clone(),
                digest: file_digest(&full)?,
            });
        }
        Ok(resolved)
    }
}

/// Aggregate digest over resolved inputs; the snapshot's `input_hash`.
/// Inputs must already be sorted by path (resolve guarantees this).
pub fn aggregate_digest(resolved: &[ResolvedInput]) -> String {
    let mut hasher = Hasher::new();
    for input in resolved {
        write_field(&mut hasher, input.path.as_bytes());
        write_field(&mut hasher, input.digest.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Derives stable task identities for one working directory.
#[derive(Debug, Clone)]
pub struct TaskHasher {
    /// Working-directory identity folded into every task hash.
    work_dir_id: String,
}

impl TaskHasher {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir_id: work_dir.to_string_lossy().into_owned(),
        }
    }

    /// Compute the task hash from the task's declared fields and its
    /// resolved inputs. Length-prefixed fields prevent ambiguity between
    /// adjacent values.
    pub fn task_hash(&self, task: &Task, resolved: &[ResolvedInput]) -> TaskHash {
        let mut hasher = Hasher::new();

        write_field(&mut hasher, b"inputs");
        for input in resolved {
            write_field(&mut hasher, input.path.as_bytes());
            write_field(&mut hasher, input.digest.as_bytes());
        }

        write_field(&mut hasher, b"command");
        write_field(&mut hasher, task.command.as_bytes());

        write_field(&mut hasher, b"kind");
        write_field(&mut hasher, task.kind.as_bytes());

        write_field(&mut hasher, b"env");
        for (key, value) in &task.env {
            write_field(&mut hasher, key.as_bytes());
            write_field(&mut hasher, value.as_bytes());
        }

        write_field(&mut hasher, b"outputs");
        let mut outputs: Vec<&String> = task.outputs.iter().collect();
        outputs.sort();
        for output in outputs {
            write_field(&mut hasher, output.as_bytes());
        }

        write_field(&mut hasher, b"workdir");
        write_field(&mut hasher, self.work_dir_id.as_bytes());

        TaskHash::new(hasher.finalize().to_hex().to_string())
    }
}

fn write_field(hasher: &mut Hasher, data: &[u8]) {
    hasher.update(&(data.len() as u64).to_be_bytes());
    hasher.update(data);
}
