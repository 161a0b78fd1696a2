// src/recovery/checkpoint.rs

//! Checkpoint writer: persists a durable marker for every node that
//! completed successfully with a cache-confirmed result.
//!
//! A checkpoint is only written after (i) the node exited 0, (ii) the
//! cache holds an entry for its task hash, and (iii) the executor has
//! committed the node's trace event (the terminal sink fires after the
//! commit point).

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::cache::Cache;
use crate::errors::{EngineError, Result};
use crate::exec::observer::TerminalSink;
use crate::hasher::{file_digest, InputResolver};
use crate::recovery::store::{CheckpointRecord, RecoveryStore};
use crate::task::{NodeResult, Task};

pub struct CheckpointWriter {
    store: RecoveryStore,
    run_id: String,
    cache: Arc<dyn Cache>,
    resolver: InputResolver,
}

impl CheckpointWriter {
    pub fn new(
        store: RecoveryStore,
        run_id: impl Into<String>,
        cache: Arc<dyn Cache>,
        resolver: InputResolver,
    ) -> Self {
        Self {
            store,
            run_id: run_id.into(),
            cache,
            resolver,
        }
    }

    /// Aggregate digest over the node's produced outputs, sorted by path.
    fn output_hash(&self, task: &Task) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        let mut outputs: Vec<&String> = task.outputs.iter().collect();
        outputs.sort();
        for output in outputs {
            let digest = file_digest(&self.resolver.work_dir().join(output))?;
            hasher.update(output.as_bytes());
            hasher.update(digest.as_bytes());
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

impl TerminalSink for CheckpointWriter {
    fn on_task_terminal(&self, task: &Task, result: &NodeResult) -> Result<()> {
        if result.exit_code != 0 {
            return Ok(());
        }
        if task.name.is_empty() {
            return Err(EngineError::System(
                "checkpoint writer: task name is empty".to_string(),
            ));
        }
        if result.hash.as_str().is_empty() {
            return Ok(());
        }
        // The cache entry must exist before a checkpoint may claim it.
        if !self.cache.has(&result.hash)? {
            return Ok(());
        }

        let checkpoint = CheckpointRecord {
            node_id: task.name.clone(),
            recorded_at: Utc::now(),
            cache_keys: vec![result.hash.as_str().to_string()],
            output_hash: self.output_hash(task)?,
            valid: true,
        };
        self.store.save_checkpoint(&self.run_id, &checkpoint)?;
        debug!(task = %task.name, run_id = %self.run_id, "checkpoint saved");
        Ok(())
    }
}
