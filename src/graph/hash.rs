// src/graph/hash.rs

//! Stable content hash over the normalized graph body.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{EngineError, Result};
use crate::graph::normalize::normalized;
use crate::graph::schema::GraphDef;

/// SHA-256 hex digest of the normalized `{nodes, edges}` body.
///
/// Metadata and `schema_version` are excluded: the hash is a structural
/// contract, stable across formatting, source ordering and non-executing
/// metadata edits, and changed by any semantic change to tasks or edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphHash(String);

impl GraphHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the graph hash from an (not necessarily normalized) graph body.
pub fn compute_hash(graph: &GraphDef) -> Result<GraphHash> {
    let canonical = normalized(graph);
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| EngineError::Parse(format!("serializing graph for hashing: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(GraphHash(hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::schema::{EdgeDef, NodeDef, NodeInputs};

    fn node(id: &str, outputs: &[&str]) -> NodeDef {
        NodeDef {
            id: id.to_string(),
            kind: "shell".to_string(),
            inputs: NodeInputs::default(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn hash_is_stable_under_reordering() {
        let a = GraphDef {
            nodes: vec![node("b", &["y", "x"]), node("a", &[])],
            edges: vec![
                EdgeDef { from: "a".into(), to: "b".into() },
            ],
        };
        let b = GraphDef {
            nodes: vec![node("a", &[]), node("b", &["x", "y"])],
            edges: vec![
                EdgeDef { from: "a".into(), to: "b".into() },
            ],
        };
        assert_eq!(compute_hash(&a).unwrap(), compute_hash(&b).unwrap());
    }

    #[test]
    fn hash_changes_with_structure() {
        let a = GraphDef { nodes: vec![node("a", &[])], edges: vec![] };
        let b = GraphDef { nodes: vec![node("a", &["out"])], edges: vec![] };
        assert_ne!(compute_hash(&a).unwrap(), compute_hash(&b).unwrap());
    }

    #[test]
    fn empty_graph_hash_is_64_hex_chars() {
        let g = GraphDef { nodes: vec![], edges: vec![] };
        let h = compute_hash(&g).unwrap();
        assert_eq!(h.as_str().len(), 64);
        assert!(h.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
