// src/incremental/snapshot.rs

//! Immutable per-node identity projections used by the invalidation
//! analyzer and the plan builder.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::Result;
use crate::graph::TaskGraph;
use crate::hasher::{aggregate_digest, InputResolver, TaskHasher};
use crate::task::TaskHash;

/// The minimal identity inputs needed to decide whether a node is
/// unchanged or invalidated.
///
/// Declared inputs (the set of paths) and input content (the aggregate
/// digest over resolved file contents) are deliberately distinct fields:
/// a path-set change and a content change carry different reasons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeSnapshot {
    pub name: String,
    /// Deterministic execution/cache identity, if inputs resolved.
    pub task_hash: Option<TaskHash>,
    pub declared_inputs: BTreeSet<String>,
    /// Aggregate digest of resolved input content.
    pub input_hash: String,
    pub env: BTreeMap<String, String>,
    pub command: String,
    pub outputs: BTreeSet<String>,
    /// Direct upstream node names.
    pub upstream: BTreeSet<String>,
}

/// Per-node snapshots keyed by stable node name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<String, NodeSnapshot>,
}

impl GraphSnapshot {
    /// Capture a snapshot of the graph against the current workspace
    /// contents. Input resolution failures surface as workspace errors.
    pub fn capture(
        graph: &TaskGraph,
        resolver: &InputResolver,
        hasher: &TaskHasher,
    ) -> Result<GraphSnapshot> {
        let mut nodes = BTreeMap::new();
        for task in graph.tasks() {
            let resolved = resolver.resolve(&task.inputs)?;
            let input_hash = aggregate_digest(&resolved);
            let task_hash = hasher.task_hash(task, &resolved);
            nodes.insert(
                task.name.clone(),
                NodeSnapshot {
                    name: task.name.clone(),
                    task_hash: Some(task_hash),
                    declared_inputs: task.inputs.iter().cloned().collect(),
                    input_hash,
                    env: task.env.clone(),
                    command: task.command.clone(),
                    outputs: task.outputs.iter().cloned().collect(),
                    upstream: graph
                        .upstream_of(&task.name)
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                },
            );
        }
        Ok(GraphSnapshot { nodes })
    }

    /// Deterministic topological order over the snapshot's own upstream
    /// sets: Kahn with a sorted ready set, lexicographic tie-break.
    /// Falls back to plain lexicographic order if the upstream relation
    /// is not a DAG (a malformed snapshot, tolerated for totality).
    pub fn topological_order(&self) -> Vec<String> {
        let names: Vec<&String> = self.nodes.keys().collect();

        let mut indegree: BTreeMap<&str, usize> =
            names.iter().map(|n| (n.as_str(), 0)).collect();
        let mut outgoing: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, node) in &self.nodes {
            for parent in &node.upstream {
                if !self.nodes.contains_key(parent) {
                    // Missing upstreams are handled as structural reasons
                    // by the analyzer; they do not contribute edges.
                    continue;
                }
                outgoing
                    .entry(parent.as_str())
                    .or_default()
                    .push(name.as_str());
                *indegree.get_mut(name.as_str()).unwrap() += 1;
            }
        }
        for children in outgoing.values_mut() {
            children.sort_unstable();
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();
        let mut order: Vec<String> = Vec::with_capacity(names.len());

        while let Some(&next) = ready.iter().next() {
            ready.remove(next);
            order.push(next.to_string());
            if let Some(children) = outgoing.get(next) {
                for &child in children {
                    let d = indegree.get_mut(child).unwrap();
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        if order.len() != names.len() {
            return names.iter().map(|n| n.to_string()).collect();
        }
        order
    }
}
