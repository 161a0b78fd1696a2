// src/graph/model.rs

//! Runtime task graph: validated, normalized, indexed and hashed.
//!
//! Nodes are owned by the graph; all cross-references (edges, upstream
//! sets, failure propagation) go by stable task name or canonical index,
//! never by pointer.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::errors::{EngineError, Result};
use crate::graph::hash::{compute_hash, GraphHash};
use crate::graph::normalize::normalized;
use crate::graph::schema::Document;
use crate::graph::validate::validate;
use crate::task::{normalize_string_set, Task};

/// A directed dependency between two task names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Immutable, validated task graph.
///
/// Construction normalizes the document, validates its structure, computes
/// the content hash and derives the deterministic orders every later phase
/// relies on: the canonical (lexicographic) index, the topological order
/// with lexicographic tie-break, and per-node depth for staged dispatch.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index_by_name: BTreeMap<String, usize>,
    edges: Vec<Edge>,
    adjacency: DiGraphMap<usize, ()>,
    topo: Vec<usize>,
    depth: Vec<usize>,
    hash: GraphHash,
}

impl TaskGraph {
    /// Build a task graph from a parsed document.
    pub fn from_document(doc: &Document) -> Result<Self> {
        validate(&doc.graph)?;
        let hash = compute_hash(&doc.graph)?;
        let body = normalized(&doc.graph);

        let tasks: Vec<Task> = body
            .nodes
            .iter()
            .map(|n| Task {
                name: n.id.clone(),
                kind: n.kind.clone(),
                command: n.inputs.run.clone().unwrap_or_default(),
                inputs: normalize_string_set(n.inputs.files.clone()),
                env: n.inputs.env.clone(),
                outputs: normalize_string_set(n.outputs.clone()),
            })
            .collect();

        let index_by_name: BTreeMap<String, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        let edges: Vec<Edge> = body
            .edges
            .iter()
            .map(|e| Edge {
                from: e.from.clone(),
                to: e.to.clone(),
            })
            .collect();

        let mut adjacency: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..tasks.len() {
            adjacency.add_node(i);
        }
        for edge in &edges {
            let from = index_by_name[&edge.from];
            let to = index_by_name[&edge.to];
            adjacency.add_edge(from, to, ());
        }

        let topo = lex_topological_order(tasks.len(), &adjacency)?;

        let mut depth = vec![0usize; tasks.len()];
        for &idx in &topo {
            let parent_depth = adjacency
                .neighbors_directed(idx, Direction::Incoming)
                .map(|p| depth[p] + 1)
                .max()
                .unwrap_or(0);
            depth[idx] = parent_depth;
        }

        Ok(TaskGraph {
            tasks,
            index_by_name,
            edges,
            adjacency,
            topo,
            depth,
            hash,
        })
    }

    pub fn hash(&self) -> &GraphHash {
        &self.hash
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in canonical (lexicographic) order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.index_by_name.get(name).map(|&i| &self.tasks[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    pub fn task_at(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    /// Direct upstream task names, sorted.
    pub fn upstream_of(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.index_by_name.get(name) else {
            return Vec::new();
        };
        let mut parents: Vec<&str> = self
            .adjacency
            .neighbors_directed(idx, Direction::Incoming)
            .map(|p| self.tasks[p].name.as_str())
            .collect();
        parents.sort_unstable();
        parents
    }

    /// Direct downstream task names, sorted.
    pub fn downstream_of(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.index_by_name.get(name) else {
            return Vec::new();
        };
        let mut children: Vec<&str> = self
            .adjacency
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|c| self.tasks[c].name.as_str())
            .collect();
        children.sort_unstable();
        children
    }

    /// All tasks reachable downstream of `name`, in canonical index order.
    pub fn reachable_downstream(&self, name: &str) -> Vec<&str> {
        let Some(&start) = self.index_by_name.get(name) else {
            return Vec::new();
        };
        let mut seen: BTreeSet<usize> = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for child in self.adjacency.neighbors_directed(idx, Direction::Outgoing) {
                if seen.insert(child) {
                    stack.push(child);
                }
            }
        }
        seen.into_iter()
            .map(|i| self.tasks[i].name.as_str())
            .collect()
    }

    /// Topological order with lexicographic tie-break, as task names.
    pub fn topological_order(&self) -> Vec<&str> {
        self.topo
            .iter()
            .map(|&i| self.tasks[i].name.as_str())
            .collect()
    }

    /// Depth of a node: 0 for roots, 1 + max upstream depth otherwise.
    pub fn depth_of(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).map(|&i| self.depth[i])
    }

    /// Node names grouped by depth, lexicographically sorted within each
    /// depth. This is the parallel dispatcher's staging order.
    pub fn names_by_depth(&self) -> Vec<Vec<&str>> {
        let max_depth = self.depth.iter().copied().max().unwrap_or(0);
        let mut by_depth: Vec<Vec<&str>> = vec![Vec::new(); max_depth + 1];
        // Canonical order is lexicographic, so each bucket comes out sorted.
        for (i, task) in self.tasks.iter().enumerate() {
            by_depth[self.depth[i]].push(task.name.as_str());
        }
        by_depth
    }
}

/// Kahn's algorithm with a sorted ready set. The ready set is kept in
/// ascending canonical-index order, which equals lexicographic order of
/// names, so ties always break the same way.
fn lex_topological_order(
    node_count: usize,
    adjacency: &DiGraphMap<usize, ()>,
) -> Result<Vec<usize>> {
    let mut indegree = vec![0usize; node_count];
    for idx in 0..node_count {
        indegree[idx] = adjacency
            .neighbors_directed(idx, Direction::Incoming)
            .count();
    }

    let mut ready: BTreeSet<usize> = (0..node_count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);

    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        let mut children: Vec<usize> = adjacency
            .neighbors_directed(next, Direction::Outgoing)
            .collect();
        children.sort_unstable();
        for child in children {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() != node_count {
        // Validation rejects cycles before this point.
        return Err(EngineError::System(
            "topological sort did not cover all nodes".to_string(),
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::parse::parse_document_str;

    fn diamond() -> TaskGraph {
        let doc = parse_document_str(
            r#"{
              "schema_version": "1.0.0",
              "graph": {
                "nodes": [
                  {"id": "d", "type": "shell", "inputs": {}, "outputs": []},
                  {"id": "b", "type": "shell", "inputs": {}, "outputs": []},
                  {"id": "c", "type": "shell", "inputs": {}, "outputs": []},
                  {"id": "a", "type": "shell", "inputs": {}, "outputs": []}
                ],
                "edges": [
                  {"from": "a", "to": "b"},
                  {"from": "a", "to": "c"},
                  {"from": "b", "to": "d"},
                  {"from": "c", "to": "d"}
                ]
              },
              "metadata": {}
            }"#,
        )
        .unwrap();
        TaskGraph::from_document(&doc).unwrap()
    }

    #[test]
    fn topological_order_breaks_ties_lexicographically() {
        let g = diamond();
        assert_eq!(g.topological_order(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn depths_are_staged() {
        let g = diamond();
        assert_eq!(g.depth_of("a"), Some(0));
        assert_eq!(g.depth_of("b"), Some(1));
        assert_eq!(g.depth_of("c"), Some(1));
        assert_eq!(g.depth_of("d"), Some(2));
        assert_eq!(
            g.names_by_depth(),
            vec![vec!["a"], vec!["b", "c"], vec!["d"]]
        );
    }

    #[test]
    fn reachability_is_canonical() {
        let g = diamond();
        assert_eq!(g.reachable_downstream("a"), vec!["b", "c", "d"]);
        assert_eq!(g.reachable_downstream("b"), vec!["d"]);
    }
}
