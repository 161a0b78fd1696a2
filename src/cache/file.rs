// src/cache/file.rs

//! File-system cache backend.
//!
//! Layout (one directory per task hash):
//!
//! ```text
//! <root>/
//!   <task_hash>/
//!     entry.json        # exit code + artifact paths
//!     stdout            # captured stdout bytes
//!     stderr            # captured stderr bytes
//!     artifacts/<path>  # declared outputs, relative layout preserved
//! ```
//!
//! `put` stages the whole entry into a sibling temp directory and renames
//! it into place, so readers never observe a partial entry.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{Cache, CacheArtifact, CacheEntry};
use crate::errors::{EngineError, Result};
use crate::task::TaskHash;

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    exit_code: i32,
    artifacts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, hash: &TaskHash) -> PathBuf {
        self.root.join(hash.as_str())
    }
}

impl Cache for FileCache {
    fn has(&self, hash: &TaskHash) -> Result<bool> {
        Ok(self.entry_dir(hash).join("entry.json").is_file())
    }

    fn get(&self, hash: &TaskHash) -> Result<Option<CacheEntry>> {
        let dir = self.entry_dir(hash);
        let meta_path = dir.join("entry.json");
        if !meta_path.is_file() {
            return Ok(None);
        }

        let meta_bytes = fs::read(&meta_path)
            .map_err(|e| EngineError::Cache(format!("reading {}: {e}", meta_path.display())))?;
        let meta: EntryMeta = serde_json::from_slice(&meta_bytes)
            .map_err(|e| EngineError::Cache(format!("corrupt cache entry {hash}: {e}")))?;

        let read = |name: &str| -> Result<Vec<u8>> {
            let path = dir.join(name);
            if path.is_file() {
                fs::read(&path)
                    .map_err(|e| EngineError::Cache(format!("reading {}: {e}", path.display())))
            } else {
                Ok(Vec::new())
            }
        };

        let mut artifacts = Vec::with_capacity(meta.artifacts.len());
        for rel in &meta.artifacts {
            let path = dir.join("artifacts").join(rel);
            let bytes = fs::read(&path)
                .map_err(|e| EngineError::Cache(format!("reading artifact {rel}: {e}")))?;
            artifacts.push(CacheArtifact {
                path: rel.clone(),
                bytes,
            });
        }

        Ok(Some(CacheEntry {
            task_hash: hash.clone(),
            exit_code: meta.exit_code,
            stdout: read("stdout")?,
            stderr: read("stderr")?,
            artifacts,
        }))
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        let final_dir = self.entry_dir(&entry.task_hash);
        if final_dir.join("entry.json").is_file() {
            // Content-addressed: an existing entry is already the right one.
            return Ok(());
        }

        fs::create_dir_all(&self.root)
            .map_err(|e| EngineError::Cache(format!("creating cache root: {e}")))?;

        let staging = self.root.join(format!("{}.tmp", entry.task_hash));
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .map_err(|e| EngineError::Cache(format!("clearing stale staging dir: {e}")))?;
        }
        fs::create_dir_all(&staging)
            .map_err(|e| EngineError::Cache(format!("creating staging dir: {e}")))?;

        let write = |name: &str, bytes: &[u8]| -> Result<()> {
            fs::write(staging.join(name), bytes)
                .map_err(|e| EngineError::Cache(format!("writing cache {name}: {e}")))
        };
        write("stdout", &entry.stdout)?;
        write("stderr", &entry.stderr)?;

        for artifact in &entry.artifacts {
            let dest = staging.join("artifacts").join(&artifact.path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| EngineError::Cache(format!("creating artifact dir: {e}")))?;
            }
            fs::write(&dest, &artifact.bytes)
                .map_err(|e| EngineError::Cache(format!("writing artifact {}: {e}", artifact.path)))?;
        }

        let meta = EntryMeta {
            exit_code: entry.exit_code,
            artifacts: entry.artifacts.iter().map(|a| a.path.clone()).collect(),
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| EngineError::Cache(format!("encoding cache entry: {e}")))?;
        write("entry.json", &meta_bytes)?;

        match fs::rename(&staging, &final_dir) {
            Ok(()) => {}
            Err(_) if final_dir.join("entry.json").is_file() => {
                // Concurrent put of the same hash won the rename; identical
                // content, so discard our staging copy.
                let _ = fs::remove_dir_all(&staging);
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(EngineError::Cache(format!(
                    "committing cache entry {}: {e}",
                    entry.task_hash
                )));
            }
        }

        debug!(hash = %entry.task_hash, "cache entry stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str) -> CacheEntry {
        CacheEntry {
            task_hash: TaskHash::new(hash),
            exit_code: 0,
            stdout: b"out".to_vec(),
            stderr: Vec::new(),
            artifacts: vec![CacheArtifact {
                path: "nested/a.txt".to_string(),
                bytes: b"A1".to_vec(),
            }],
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let e = entry("h1");

        assert!(!cache.has(&e.task_hash).unwrap());
        cache.put(&e).unwrap();
        assert!(cache.has(&e.task_hash).unwrap());

        let loaded = cache.get(&e.task_hash).unwrap().unwrap();
        assert_eq!(loaded, e);
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let e = entry("h2");
        cache.put(&e).unwrap();
        cache.put(&e).unwrap();
        assert_eq!(cache.get(&e.task_hash).unwrap().unwrap(), e);
    }

    #[test]
    fn missing_entry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        assert!(cache.get(&TaskHash::new("absent")).unwrap().is_none());
    }
}
