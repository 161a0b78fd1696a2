// src/cache/mod.rs

//! Content-addressed result cache keyed by task hash.
//!
//! The core contract: `has` returning true implies a later `get` (and any
//! artifact restoration from the entry) must succeed modulo I/O errors,
//! and `put` is atomic. Backends must be internally synchronized; workers
//! probe and restore concurrently.

pub mod file;
pub mod memory;

use crate::errors::Result;
use crate::task::TaskHash;

pub use file::FileCache;
pub use memory::MemoryCache;

/// One declared artifact captured at `put` time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheArtifact {
    /// Declared output path, relative to the working directory.
    pub path: String,
    pub bytes: Vec<u8>,
}

/// A cached task result: exit status, captured stdio and artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub task_hash: TaskHash,
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub artifacts: Vec<CacheArtifact>,
}

/// Capability set of a cache backend.
pub trait Cache: Send + Sync {
    fn has(&self, hash: &TaskHash) -> Result<bool>;
    fn get(&self, hash: &TaskHash) -> Result<Option<CacheEntry>>;
    fn put(&self, entry: &CacheEntry) -> Result<()>;
}

/// No-op backend: never hits, discards every `put`. For running a graph
/// with caching disabled entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl Cache for NoCache {
    fn has(&self, _hash: &TaskHash) -> Result<bool> {
        Ok(false)
    }

    fn get(&self, _hash: &TaskHash) -> Result<Option<CacheEntry>> {
        Ok(None)
    }

    fn put(&self, _entry: &CacheEntry) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cache_never_hits_and_discards_puts() {
        let cache = NoCache;
        let hash = TaskHash::new("h1");
        cache
            .put(&CacheEntry {
                task_hash: hash.clone(),
                exit_code: 0,
                stdout: vec![],
                stderr: vec![],
                artifacts: vec![],
            })
            .unwrap();
        assert!(!cache.has(&hash).unwrap());
        assert!(cache.get(&hash).unwrap().is_none());
    }
}
