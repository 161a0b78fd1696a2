// src/graph/normalize.rs

//! Canonical form of a graph definition.
//!
//! Normalization rules:
//! - nodes sorted by id
//! - edges sorted by (from, to)
//! - per-node outputs and declared input files sorted and deduplicated
//! - env maps are `BTreeMap`s, so keys serialize sorted by construction

use crate::graph::schema::GraphDef;
use crate::task::normalize_string_set;

/// Normalize the graph in place and return it for chaining.
pub fn normalize(graph: &mut GraphDef) -> &mut GraphDef {
    graph.nodes.sort_by(|a, b| a.id.cmp(&b.id));
    for node in &mut graph.nodes {
        node.outputs = normalize_string_set(std::mem::take(&mut node.outputs));
        node.inputs.files = normalize_string_set(std::mem::take(&mut node.inputs.files));
    }
    graph.edges.sort();
    graph.edges.dedup();
    graph
}

/// Return a normalized copy, leaving the original untouched.
pub fn normalized(graph: &GraphDef) -> GraphDef {
    let mut copy = graph.clone();
    normalize(&mut copy);
    copy
}
