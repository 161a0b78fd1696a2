// src/incremental/delta.rs

//! Coarse difference between two graph snapshots.

use crate::incremental::snapshot::GraphSnapshot;

/// Nodes added, removed or modified between two graph executions.
/// All three lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

/// Compute a deterministic delta between two snapshots. Nodes are
/// identified by name; a node present in both is modified if any of its
/// snapshot fields differ.
pub fn calculate_delta(old: &GraphSnapshot, new: &GraphSnapshot) -> GraphDelta {
    let mut delta = GraphDelta::default();

    for (name, new_node) in &new.nodes {
        match old.nodes.get(name) {
            None => delta.added.push(name.clone()),
            Some(old_node) if old_node != new_node => delta.modified.push(name.clone()),
            Some(_) => {}
        }
    }
    for name in old.nodes.keys() {
        if !new.nodes.contains_key(name) {
            delta.removed.push(name.clone());
        }
    }

    // BTreeMap iteration already yields sorted names.
    delta
}
