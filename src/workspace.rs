// src/workspace.rs

//! Workspace directory layout.
//!
//! All engine-owned state lives under `<workdir>/.taskweave/`:
//!
//! ```text
//! <workdir>/.taskweave/
//!   runs/       # run / checkpoint / failure records
//!   cache/      # content-addressed result cache
//!   plugins/    # observer plugin directories
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{EngineError, Result};

/// Engine state directory name inside the workspace.
pub const STATE_DIR: &str = ".taskweave";

#[derive(Debug, Clone)]
pub struct Workspace {
    work_dir: PathBuf,
}

impl Workspace {
    /// Validate the working directory and create the state layout.
    pub fn ensure(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = work_dir.into();
        if !work_dir.is_dir() {
            return Err(EngineError::Workspace(format!(
                "working directory does not exist: {}",
                work_dir.display()
            )));
        }
        let ws = Self { work_dir };
        fs::create_dir_all(ws.runs_dir())?;
        fs::create_dir_all(ws.cache_dir())?;
        fs::create_dir_all(ws.plugins_dir())?;
        Ok(ws)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn state_dir(&self) -> PathBuf {
        self.work_dir.join(STATE_DIR)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.state_dir().join("runs")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir().join("cache")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.state_dir().join("plugins")
    }
}

/// Create the output directory if needed and clear any stale entries, so
/// a run never observes artifacts from a previous invocation.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(EngineError::Workspace("output dir is empty".to_string()));
    }
    if dir == Path::new("/") {
        return Err(EngineError::Workspace(
            "refusing to operate on output dir '/'".to_string(),
        ));
    }
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    if !dir.is_dir() {
        return Err(EngineError::Workspace(format!(
            "output dir is not a directory: {}",
            dir.display()
        )));
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::ensure(tmp.path()).unwrap();
        assert!(ws.runs_dir().is_dir());
        assert!(ws.cache_dir().is_dir());
        assert!(ws.plugins_dir().is_dir());
    }

    #[test]
    fn missing_workdir_is_workspace_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Workspace::ensure(tmp.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), "workspace");
    }

    #[test]
    fn prepare_output_dir_clears_stale_files() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(out.join("nested")).unwrap();
        fs::write(out.join("stale.txt"), "x").unwrap();

        prepare_output_dir(&out).unwrap();
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }
}
