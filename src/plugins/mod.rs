// src/plugins/mod.rs

//! Plugin discovery and inspection.
//!
//! Discovery is deterministic and non-recursive: plugin directories are
//! scanned in sorted order, directories without a `manifest.json` are
//! skipped, invalid manifests are skipped with a report, and duplicate
//! plugin ids are rejected. Discovery never mutates plugin files.

pub mod manifest;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::warn;

pub use manifest::{load_manifest_file, parse_manifest, PluginManifest, SUPPORTED_HOOKS};

/// Successfully loaded manifests, keyed and ordered by plugin id.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    pub by_id: BTreeMap<String, PluginManifest>,
}

impl PluginRegistry {
    pub fn manifests(&self) -> impl Iterator<Item = &PluginManifest> {
        self.by_id.values()
    }
}

/// Scan a plugins root and register every valid manifest. Problems are
/// collected, not fatal: a broken plugin never takes down discovery.
pub fn discover(root: &Path) -> (PluginRegistry, Vec<String>) {
    let mut registry = PluginRegistry::default();
    let mut problems = Vec::new();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (registry, problems),
        Err(e) => {
            warn!(root = %root.display(), error = %e, "failed to read plugins root");
            problems.push(format!("reading plugins root: {e}"));
            return (registry, problems);
        }
    };

    let mut dirs: Vec<std::path::PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();

    for dir in dirs {
        let manifest_path = dir.join("manifest.json");
        if !manifest_path.is_file() {
            continue;
        }
        match load_manifest_file(&manifest_path) {
            Ok(manifest) => {
                if registry.by_id.contains_key(&manifest.plugin_id) {
                    let msg = format!("duplicate plugin_id: {}", manifest.plugin_id);
                    warn!(plugin = %manifest.plugin_id, "{msg}");
                    problems.push(msg);
                    continue;
                }
                registry.by_id.insert(manifest.plugin_id.clone(), manifest);
            }
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "invalid plugin manifest");
                problems.push(format!("{}: {err}", dir.display()));
            }
        }
    }

    (registry, problems)
}

/// Deterministic, human-readable status lines for `plugins list`.
///
/// A plugin is "enabled" if its manifest parses and validates, and
/// "disabled" (with the reason) otherwise. Directories without a
/// manifest are skipped, matching discovery.
pub fn list_plugin_states(root: &Path) -> Vec<String> {
    let mut rows: Vec<(String, String)> = Vec::new();

    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<std::path::PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();

    for dir in dirs {
        let manifest_path = dir.join("manifest.json");
        if !manifest_path.is_file() {
            continue;
        }
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match load_manifest_file(&manifest_path) {
            Ok(manifest) => rows.push((
                manifest.plugin_id.clone(),
                format!("{} enabled", manifest.plugin_id),
            )),
            // "~" sorts after ASCII alphanumerics, so broken plugins list last.
            Err(err) => rows.push((format!("~{dir_name}"), format!("{dir_name} disabled {err}"))),
        }
    }

    rows.sort();
    rows.into_iter().map(|(_, line)| line).collect()
}
