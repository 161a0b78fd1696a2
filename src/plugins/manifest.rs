// src/plugins/manifest.rs

//! Plugin manifest parsing and validation.
//!
//! Plugins are pure observers: a manifest may only subscribe to the four
//! lifecycle hooks, and manifests are parsed strictly (unknown fields and
//! trailing data rejected).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

/// Hook names a plugin may subscribe to.
pub const SUPPORTED_HOOKS: [&str; 4] = ["BeforeRun", "AfterRun", "BeforeNode", "AfterNode"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub plugin_id: String,
    pub version: String,
    pub hooks: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl PluginManifest {
    pub fn validate(&self) -> Result<()> {
        if self.plugin_id.is_empty() {
            return Err(invalid("missing plugin_id"));
        }
        if self.version.is_empty() {
            return Err(invalid("missing version"));
        }
        if self.hooks.is_empty() {
            return Err(invalid("empty hooks"));
        }
        for hook in &self.hooks {
            if !SUPPORTED_HOOKS.contains(&hook.as_str()) {
                return Err(invalid(&format!("unsupported hook: {hook}")));
            }
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> EngineError {
    EngineError::Execution(format!("manifest invalid: {msg}"))
}

/// Parse and validate a manifest from JSON bytes.
pub fn parse_manifest(data: &[u8]) -> Result<PluginManifest> {
    let manifest: PluginManifest = serde_json::from_slice(data)
        .map_err(|e| EngineError::Execution(format!("manifest malformed: {e}")))?;
    manifest.validate()?;
    Ok(manifest)
}

/// Load `manifest.json` from a plugin directory.
pub fn load_manifest_file(path: &Path) -> Result<PluginManifest> {
    let data = std::fs::read(path)
        .map_err(|e| EngineError::Execution(format!("manifest not found: {e}")))?;
    parse_manifest(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_manifest_parses() {
        let m = parse_manifest(
            br#"{"plugin_id":"p1","version":"1.0.0","hooks":["BeforeRun"],"description":"d"}"#,
        )
        .unwrap();
        assert_eq!(m.plugin_id, "p1");
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = parse_manifest(
            br#"{"plugin_id":"p1","version":"1.0.0","hooks":["BeforeRun"],"extra":1}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("manifest malformed"), "{err}");
    }

    #[test]
    fn unsupported_hook_rejected() {
        let err = parse_manifest(
            br#"{"plugin_id":"p1","version":"1.0.0","hooks":["OnMutateState"]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported hook"), "{err}");
    }

    #[test]
    fn empty_hooks_rejected() {
        let err =
            parse_manifest(br#"{"plugin_id":"p1","version":"1.0.0","hooks":[]}"#).unwrap_err();
        assert!(err.to_string().contains("empty hooks"), "{err}");
    }
}
