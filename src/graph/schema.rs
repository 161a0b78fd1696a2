// src/graph/schema.rs

//! Serde types for the graph definition document.
//!
//! The schema is strict: unknown keys anywhere in the document are
//! rejected. Only one `schema_version` is supported at a time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The only schema version this crate accepts.
pub const SUPPORTED_SCHEMA_VERSION: &str = "1.0.0";

/// Top-level graph definition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    pub schema_version: String,
    pub graph: GraphDef,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Execution structure: nodes plus directed dependency edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDef {
    pub nodes: Vec<NodeDef>,
    pub edges: Vec<EdgeDef>,
}

/// A single execution unit in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub inputs: NodeInputs,
    pub outputs: Vec<String>,
}

/// The node `inputs` object: command, declared input files and env.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A directed dependency: `from` must complete before `to` starts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
}

/// Non-execution information. Excluded from the graph hash.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}
