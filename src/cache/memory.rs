// src/cache/memory.rs

//! In-memory cache backend, primarily for tests and single-process runs.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::cache::{Cache, CacheEntry};
use crate::errors::{EngineError, Result};
use crate::task::TaskHash;

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<TaskHash, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn has(&self, hash: &TaskHash) -> Result<bool> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Cache("memory cache poisoned".to_string()))?;
        Ok(entries.contains_key(hash))
    }

    fn get(&self, hash: &TaskHash) -> Result<Option<CacheEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Cache("memory cache poisoned".to_string()))?;
        Ok(entries.get(hash).cloned())
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Cache("memory cache poisoned".to_string()))?;
        entries.insert(entry.task_hash.clone(), entry.clone());
        Ok(())
    }
}
