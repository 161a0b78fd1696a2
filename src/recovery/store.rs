// src/recovery/store.rs

//! Durable run state: run, checkpoint and failure records.
//!
//! Layout, one directory per run:
//!
//! ```text
//! <workdir>/.taskweave/runs/
//!   <run_id>/
//!     run.json
//!     checkpoints/<node_id>.json
//!     failure.json              # optional
//! ```
//!
//! Every write goes through write-to-temp + fsync + rename, so readers
//! never observe partial records.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::{EngineError, Result};

/// How a run was invoked. Recorded for auditing; never consulted by
/// scheduling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Clean,
    Incremental,
    Resume,
    ResumeFailedOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One execution attempt, optionally linked to a predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub graph_hash: String,
    /// Recorded for auditing only; decisions never read it.
    pub start_time: DateTime<Utc>,
    pub mode: RunMode,
    pub retry_count: u32,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_run_id: Option<String>,
}

/// Durable marker that a node completed with a confirmed cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub node_id: String,
    pub recorded_at: DateTime<Utc>,
    /// First entry is the task hash string.
    pub cache_keys: Vec<String>,
    pub output_hash: String,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureClass {
    GraphFailure,
    WorkspaceFailure,
    ExecutionFailure,
    SystemFailure,
}

/// Persisted description of why a run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub failure_class: FailureClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub error_code: String,
    pub message: String,
    pub resumable: bool,
}

impl FailureRecord {
    /// Graph and workspace failures are never resumable; execution is
    /// conditionally resumable; system failures are resumable iff
    /// checkpoints exist.
    pub fn new(
        failure_class: FailureClass,
        node_id: Option<String>,
        error_code: impl Into<String>,
        message: impl Into<String>,
        has_checkpoints: bool,
    ) -> Self {
        let resumable = match failure_class {
            FailureClass::GraphFailure | FailureClass::WorkspaceFailure => false,
            FailureClass::ExecutionFailure => true,
            FailureClass::SystemFailure => has_checkpoints,
        };
        Self {
            failure_class,
            node_id,
            error_code: error_code.into(),
            message: message.into(),
            resumable,
        }
    }
}

/// File-backed store for run, checkpoint and failure records. Only the
/// run coordinator writes; records persist indefinitely.
#[derive(Debug, Clone)]
pub struct RecoveryStore {
    runs_dir: PathBuf,
}

impl RecoveryStore {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
        }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Fresh 128-bit random id, hex encoded. Opaque to callers.
    pub fn new_run_id(&self) -> String {
        format!("{:032x}", rand::random::<u128>())
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id)
    }

    pub fn start_run(&self, record: &RunRecord) -> Result<()> {
        let dir = self.run_dir(&record.run_id);
        fs::create_dir_all(dir.join("checkpoints"))?;
        write_json_atomic(&dir.join("run.json"), record)
    }

    /// Rewrite the run record with a terminal status.
    pub fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let mut record = self.load_run(run_id)?;
        record.status = status;
        write_json_atomic(&self.run_dir(run_id).join("run.json"), &record)
    }

    pub fn save_checkpoint(&self, run_id: &str, checkpoint: &CheckpointRecord) -> Result<()> {
        let dir = self.run_dir(run_id).join("checkpoints");
        fs::create_dir_all(&dir)?;
        write_json_atomic(&dir.join(format!("{}.json", checkpoint.node_id)), checkpoint)
    }

    pub fn record_failure(&self, run_id: &str, failure: &FailureRecord) -> Result<()> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)?;
        write_json_atomic(&dir.join("failure.json"), failure)
    }

    pub fn load_run(&self, run_id: &str) -> Result<RunRecord> {
        read_json(&self.run_dir(run_id).join("run.json"))
    }

    pub fn load_failure(&self, run_id: &str) -> Result<Option<FailureRecord>> {
        let path = self.run_dir(run_id).join("failure.json");
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn load_all_checkpoints(&self, run_id: &str) -> Result<BTreeMap<String, CheckpointRecord>> {
        let dir = self.run_dir(run_id).join("checkpoints");
        let mut checkpoints = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(checkpoints);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                let checkpoint: CheckpointRecord = read_json(&path)?;
                checkpoints.insert(checkpoint.node_id.clone(), checkpoint);
            }
        }
        Ok(checkpoints)
    }

    /// All known run ids, sorted.
    pub fn list_run_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        if !self.runs_dir.is_dir() {
            return Ok(ids);
        }
        for entry in fs::read_dir(&self.runs_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| EngineError::System(format!("encoding {}: {e}", path.display())))?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| {
        EngineError::Workspace(format!("reading record {}: {e}", path.display()))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| EngineError::Workspace(format!("corrupt record {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, RecoveryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecoveryStore::new(dir.path().join("runs"));
        (dir, store)
    }

    fn run_record(id: &str) -> RunRecord {
        RunRecord {
            run_id: id.to_string(),
            graph_hash: "gh".to_string(),
            start_time: Utc::now(),
            mode: RunMode::Incremental,
            retry_count: 0,
            status: RunStatus::Running,
            previous_run_id: None,
        }
    }

    #[test]
    fn run_ids_are_opaque_128_bit_hex() {
        let (_dir, store) = store();
        let id = store.new_run_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, store.new_run_id());
    }

    #[test]
    fn run_round_trip_and_finish() {
        let (_dir, store) = store();
        let record = run_record("r1");
        store.start_run(&record).unwrap();
        assert_eq!(store.load_run("r1").unwrap(), record);

        store.finish_run("r1", RunStatus::Failed).unwrap();
        assert_eq!(store.load_run("r1").unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn checkpoints_round_trip() {
        let (_dir, store) = store();
        store.start_run(&run_record("r1")).unwrap();
        let cp = CheckpointRecord {
            node_id: "a".to_string(),
            recorded_at: Utc::now(),
            cache_keys: vec!["hash-a".to_string()],
            output_hash: "oh".to_string(),
            valid: true,
        };
        store.save_checkpoint("r1", &cp).unwrap();
        let all = store.load_all_checkpoints("r1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["a"], cp);
    }

    #[test]
    fn failure_resumability_matrix() {
        let graph = FailureRecord::new(FailureClass::GraphFailure, None, "X", "m", true);
        assert!(!graph.resumable);
        let ws = FailureRecord::new(FailureClass::WorkspaceFailure, None, "X", "m", true);
        assert!(!ws.resumable);
        let exec = FailureRecord::new(FailureClass::ExecutionFailure, None, "X", "m", false);
        assert!(exec.resumable);
        let sys_no = FailureRecord::new(FailureClass::SystemFailure, None, "X", "m", false);
        assert!(!sys_no.resumable);
        let sys_yes = FailureRecord::new(FailureClass::SystemFailure, None, "X", "m", true);
        assert!(sys_yes.resumable);
    }

    #[test]
    fn list_run_ids_sorted() {
        let (_dir, store) = store();
        store.start_run(&run_record("b")).unwrap();
        store.start_run(&run_record("a")).unwrap();
        assert_eq!(store.list_run_ids().unwrap(), vec!["a", "b"]);
    }
}
