// src/exec/runner.rs

//! Task runners: the object-safe `TaskRunner` capability plus the
//! production cache-aware shell runner.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use crate::cache::{Cache, CacheArtifact, CacheEntry};
use crate::errors::{EngineError, Result};
use crate::hasher::{InputResolver, TaskHasher};
use crate::task::{NodeResult, Task, TaskHash};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes a single task.
///
/// Non-zero exit codes are task failures carried in the returned
/// [`NodeResult`]; an `Err` is an infrastructure error (inability to
/// start a process, cache backend I/O failure, ...).
pub trait TaskRunner: Send + Sync {
    /// Check whether the task can be satisfied from cache. A hit restores
    /// the declared artifacts and returns the replayed result
    /// (`from_cache = true`); a miss returns `None`.
    fn probe(&self, task: &Task) -> BoxFuture<'_, Result<Option<NodeResult>>>;

    /// Execute the task.
    fn run(&self, task: &Task) -> BoxFuture<'_, Result<NodeResult>>;

    /// Restore the task's artifacts from cache without executing it.
    /// Fails if no cache entry exists for the task's current hash.
    fn restore(&self, task: &Task) -> BoxFuture<'_, Result<NodeResult>>;
}

/// Production runner: resolves inputs, hashes the task, runs the command
/// through the platform shell and keeps the cache up to date.
pub struct CacheRunner {
    work_dir: PathBuf,
    resolver: InputResolver,
    hasher: TaskHasher,
    cache: Arc<dyn Cache>,
    probe_cache: bool,
}

impl CacheRunner {
    pub fn new(work_dir: impl Into<PathBuf>, cache: Arc<dyn Cache>) -> Self {
        let work_dir = work_dir.into();
        Self {
            resolver: InputResolver::new(&work_dir),
            hasher: TaskHasher::new(&work_dir),
            work_dir,
            cache,
            probe_cache: true,
        }
    }

    /// Clean-mode runner: executes everything and writes results through
    /// to the cache, but never reports probe hits.
    pub fn without_probing(mut self) -> Self {
        self.probe_cache = false;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn resolver(&self) -> &InputResolver {
        &self.resolver
    }

    pub fn hasher(&self) -> &TaskHasher {
        &self.hasher
    }

    /// Resolve the task's declared inputs and compute its current hash.
    pub fn task_hash(&self, task: &Task) -> Result<TaskHash> {
        let resolved = self.resolver.resolve(&task.inputs)?;
        Ok(self.hasher.task_hash(task, &resolved))
    }

    fn write_artifacts(&self, entry: &CacheEntry) -> Result<()> {
        for artifact in &entry.artifacts {
            let dest = self.work_dir.join(&artifact.path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EngineError::Workspace(format!(
                        "creating output dir for {}: {e}",
                        artifact.path
                    ))
                })?;
            }
            std::fs::write(&dest, &artifact.bytes).map_err(|e| {
                EngineError::Workspace(format!("restoring artifact {}: {e}", artifact.path))
            })?;
        }
        Ok(())
    }

    fn harvest_artifacts(&self, task: &Task) -> std::result::Result<Vec<CacheArtifact>, String> {
        let mut artifacts = Vec::with_capacity(task.outputs.len());
        for output in &task.outputs {
            let path = self.work_dir.join(output);
            match std::fs::read(&path) {
                Ok(bytes) => artifacts.push(CacheArtifact {
                    path: output.clone(),
                    bytes,
                }),
                Err(e) => return Err(format!("declared output missing: {output}: {e}")),
            }
        }
        Ok(artifacts)
    }

    async fn probe_impl(&self, task: &Task) -> Result<Option<NodeResult>> {
        if !self.probe_cache {
            return Ok(None);
        }
        let hash = self.task_hash(task)?;
        let Some(entry) = self.cache.get(&hash)? else {
            return Ok(None);
        };
        self.write_artifacts(&entry)?;
        debug!(task = %task.name, hash = %hash, "cache probe hit");
        Ok(Some(NodeResult {
            hash,
            exit_code: entry.exit_code,
            stdout: entry.stdout,
            stderr: entry.stderr,
            from_cache: true,
        }))
    }

    async fn run_impl(&self, task: &Task) -> Result<NodeResult> {
        let hash = self.task_hash(task)?;

        info!(task = %task.name, cmd = %task.command, "starting task process");

        // Platform shell, the same split the watcher-driven runner uses.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&task.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&task.command);
            c
        };

        let output = cmd
            .current_dir(&self.work_dir)
            .envs(&task.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                EngineError::Execution(format!("spawning process for task {:?}: {e}", task.name))
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        info!(task = %task.name, exit_code, "task process exited");

        if exit_code != 0 {
            return Ok(NodeResult {
                hash,
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
                from_cache: false,
            });
        }

        // A successful task must have produced every declared output;
        // anything less is a task failure, not a crash.
        let artifacts = match self.harvest_artifacts(task) {
            Ok(artifacts) => artifacts,
            Err(msg) => {
                return Ok(NodeResult {
                    hash,
                    exit_code: 1,
                    stdout: output.stdout,
                    stderr: msg.into_bytes(),
                    from_cache: false,
                })
            }
        };

        self.cache.put(&CacheEntry {
            task_hash: hash.clone(),
            exit_code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            artifacts,
        })?;

        Ok(NodeResult {
            hash,
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            from_cache: false,
        })
    }

    async fn restore_impl(&self, task: &Task) -> Result<NodeResult> {
        let hash = self.task_hash(task)?;
        let Some(entry) = self.cache.get(&hash)? else {
            return Err(EngineError::Cache(format!(
                "no cache entry for task {:?}",
                task.name
            )));
        };
        self.write_artifacts(&entry)?;
        debug!(task = %task.name, hash = %hash, "artifacts restored from cache");
        Ok(NodeResult {
            hash,
            exit_code: entry.exit_code,
            stdout: entry.stdout,
            stderr: entry.stderr,
            from_cache: true,
        })
    }
}

impl TaskRunner for CacheRunner {
    fn probe(&self, task: &Task) -> BoxFuture<'_, Result<Option<NodeResult>>> {
        let task = task.clone();
        Box::pin(async move { self.probe_impl(&task).await })
    }

    fn run(&self, task: &Task) -> BoxFuture<'_, Result<NodeResult>> {
        let task = task.clone();
        Box::pin(async move { self.run_impl(&task).await })
    }

    fn restore(&self, task: &Task) -> BoxFuture<'_, Result<NodeResult>> {
        let task = task.clone();
        Box::pin(async move { self.restore_impl(&task).await })
    }
}
