// src/graph/parse.rs

//! Strict document parsing with a typed error surface.

use crate::errors::{EngineError, Result};
use crate::graph::schema::{Document, SUPPORTED_SCHEMA_VERSION};

/// Parse a graph definition from JSON bytes.
///
/// Error mapping:
/// - malformed JSON or unknown fields -> [`EngineError::Parse`]
/// - missing required fields or wrong field types -> [`EngineError::Schema`]
/// - unsupported `schema_version` -> [`EngineError::Semantic`]
pub fn parse_document(data: &[u8]) -> Result<Document> {
    let doc: Document = serde_json::from_slice(data).map_err(classify_serde_error)?;

    validate_required(&doc)?;

    if doc.schema_version != SUPPORTED_SCHEMA_VERSION {
        return Err(EngineError::Semantic(format!(
            "unsupported schema_version {:?}, expected {:?}",
            doc.schema_version, SUPPORTED_SCHEMA_VERSION
        )));
    }

    Ok(doc)
}

/// Parse a document from a string slice.
pub fn parse_document_str(data: &str) -> Result<Document> {
    parse_document(data.as_bytes())
}

fn classify_serde_error(err: serde_json::Error) -> EngineError {
    use serde_json::error::Category;

    match err.classify() {
        Category::Syntax | Category::Eof => EngineError::Parse(format!(
            "malformed JSON at line {}, column {}: {err}",
            err.line(),
            err.column()
        )),
        Category::Io => EngineError::Parse(err.to_string()),
        Category::Data => {
            // serde reports unknown keys as data errors; strict-schema
            // violations surface as parse errors, everything else
            // (missing fields, wrong types) as schema errors.
            let msg = err.to_string();
            if msg.starts_with("unknown field") {
                EngineError::Parse(msg)
            } else {
                EngineError::Schema(msg)
            }
        }
    }
}

/// Non-empty checks serde cannot express: ids and edge endpoints must not
/// be empty strings.
fn validate_required(doc: &Document) -> Result<()> {
    if doc.schema_version.is_empty() {
        return Err(EngineError::Schema(
            "schema_version: required field is empty".to_string(),
        ));
    }
    for (i, node) in doc.graph.nodes.iter().enumerate() {
        if node.id.is_empty() {
            return Err(EngineError::Schema(format!(
                "graph.nodes[{i}].id: required field is empty"
            )));
        }
        if node.kind.is_empty() {
            return Err(EngineError::Schema(format!(
                "graph.nodes[{i}].type: required field is empty"
            )));
        }
    }
    for (i, edge) in doc.graph.edges.iter().enumerate() {
        if edge.from.is_empty() {
            return Err(EngineError::Schema(format!(
                "graph.edges[{i}].from: required field is empty"
            )));
        }
        if edge.to.is_empty() {
            return Err(EngineError::Schema(format!(
                "graph.edges[{i}].to: required field is empty"
            )));
        }
    }
    Ok(())
}
