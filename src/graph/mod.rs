// src/graph/mod.rs

//! Graph contract: parse -> normalize -> validate -> hash, plus the
//! immutable runtime model consumed by the planner and executor.

pub mod hash;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod schema;
pub mod validate;

pub use hash::{compute_hash, GraphHash};
pub use model::{Edge, TaskGraph};
pub use normalize::{normalize, normalized};
pub use parse::{parse_document, parse_document_str};
pub use schema::{Document, EdgeDef, GraphDef, Metadata, NodeDef, NodeInputs, SUPPORTED_SCHEMA_VERSION};
pub use validate::validate;
