// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Every externally visible failure belongs to one of the stable kinds
//! below. Messages are deterministic: they name task ids and paths, never
//! addresses or timestamps.

use thiserror::Error;

/// Structural graph violations, reported with a deterministic witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralKind {
    DuplicateId,
    SelfReference,
    DanglingEdge,
    Cycle,
}

impl StructuralKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructuralKind::DuplicateId => "duplicate_id",
            StructuralKind::SelfReference => "self_reference",
            StructuralKind::DanglingEdge => "dangling_edge",
            StructuralKind::Cycle => "cycle",
        }
    }
}

impl std::fmt::Display for StructuralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed encoding or unknown fields in a graph document.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structurally valid document with missing or wrongly typed fields.
    #[error("schema error: {0}")]
    Schema(String),

    /// Graph-shape violation (duplicate id, self edge, dangling edge, cycle).
    #[error("structural error: {kind}: {msg}")]
    Structural { kind: StructuralKind, msg: String },

    /// Unsupported schema version.
    #[error("semantic error: {0}")]
    Semantic(String),

    /// Missing or corrupt workspace, missing declared inputs, permissions.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// Cache backend I/O failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Non-zero task exit or runner restoration failure.
    #[error("execution error: {0}")]
    Execution(String),

    /// Invalid lifecycle transition requested for a node.
    #[error("state machine error: task {task}: cannot transition {from} -> {to} (current {current})")]
    StateMachine {
        task: String,
        from: &'static str,
        to: &'static str,
        current: &'static str,
    },

    /// Unexpected internal failure.
    #[error("system error: {0}")]
    System(String),

    /// The surrounding context was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Stable category name for diagnostics and failure records.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Parse(_) => "parse",
            EngineError::Schema(_) => "schema",
            EngineError::Structural { .. } => "structural",
            EngineError::Semantic(_) => "semantic",
            EngineError::Workspace(_) => "workspace",
            EngineError::Cache(_) => "cache",
            EngineError::Execution(_) => "execution",
            EngineError::StateMachine { .. } => "system",
            EngineError::System(_) => "system",
            EngineError::Cancelled => "cancelled",
            EngineError::Io(_) => "workspace",
        }
    }

    pub fn structural_kind(&self) -> Option<StructuralKind> {
        match self {
            EngineError::Structural { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
