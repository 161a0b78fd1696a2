// src/graph/validate.rs

//! Structural validation: duplicate ids, self edges, dangling edges and
//! cycles, each reported with a deterministic witness.

use std::collections::BTreeMap;

use crate::errors::{EngineError, Result, StructuralKind};
use crate::graph::schema::GraphDef;

/// Validate the graph shape.
///
/// Nodes are walked in lexicographic order so duplicate detection reports
/// the lexicographically first duplicate. Cycle detection is a coloring
/// DFS with neighbors traversed in sorted order; the reported cycle path
/// starts at the first re-entered gray node, which makes the witness
/// deterministic for any given graph.
pub fn validate(graph: &GraphDef) -> Result<()> {
    let mut ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    ids.sort_unstable();

    for pair in ids.windows(2) {
        if pair[0] == pair[1] {
            return Err(EngineError::Structural {
                kind: StructuralKind::DuplicateId,
                msg: format!("duplicate node id: {:?}", pair[0]),
            });
        }
    }

    let node_set: std::collections::BTreeSet<&str> = ids.iter().copied().collect();

    let mut edges: Vec<(&str, &str)> = graph
        .edges
        .iter()
        .map(|e| (e.from.as_str(), e.to.as_str()))
        .collect();
    edges.sort_unstable();

    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (from, to) in edges {
        if from == to {
            return Err(EngineError::Structural {
                kind: StructuralKind::SelfReference,
                msg: format!("self-referential edge: {from:?} -> {to:?}"),
            });
        }
        if !node_set.contains(from) {
            return Err(EngineError::Structural {
                kind: StructuralKind::DanglingEdge,
                msg: format!("edge references unknown node: {from:?}"),
            });
        }
        if !node_set.contains(to) {
            return Err(EngineError::Structural {
                kind: StructuralKind::DanglingEdge,
                msg: format!("edge references unknown node: {to:?}"),
            });
        }
        adjacency.entry(from).or_default().push(to);
    }
    for neighbors in adjacency.values_mut() {
        neighbors.sort_unstable();
        neighbors.dedup();
    }

    detect_cycle(&node_set, &adjacency)
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

fn detect_cycle(
    nodes: &std::collections::BTreeSet<&str>,
    adjacency: &BTreeMap<&str, Vec<&str>>,
) -> Result<()> {
    let mut color: BTreeMap<&str, Color> =
        nodes.iter().map(|&n| (n, Color::White)).collect();
    let mut path: Vec<&str> = Vec::new();

    // Iterative DFS; an explicit stack keeps deep chains off the call stack.
    enum Frame<'a> {
        Enter(&'a str),
        Exit(&'a str),
    }

    for &root in nodes.iter() {
        if color[root] != Color::White {
            continue;
        }

        let mut stack = vec![Frame::Enter(root)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(node) => {
                    if color[node] == Color::Black {
                        continue;
                    }
                    if color[node] == Color::Gray {
                        continue;
                    }
                    color.insert(node, Color::Gray);
                    path.push(node);
                    stack.push(Frame::Exit(node));

                    let neighbors = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
                    // Push in reverse so the smallest neighbor is visited first.
                    for &next in neighbors.iter().rev() {
                        match color[next] {
                            Color::Gray => {
                                let start = path
                                    .iter()
                                    .position(|&n| n == next)
                                    .unwrap_or(0);
                                let mut cycle: Vec<&str> = path[start..].to_vec();
                                cycle.push(next);
                                return Err(EngineError::Structural {
                                    kind: StructuralKind::Cycle,
                                    msg: format!("cycle detected: {}", cycle.join(" -> ")),
                                });
                            }
                            Color::White => stack.push(Frame::Enter(next)),
                            Color::Black => {}
                        }
                    }
                }
                Frame::Exit(node) => {
                    color.insert(node, Color::Black);
                    path.pop();
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::schema::{EdgeDef, NodeDef, NodeInputs};

    fn node(id: &str) -> NodeDef {
        NodeDef {
            id: id.to_string(),
            kind: "shell".to_string(),
            inputs: NodeInputs::default(),
            outputs: vec![],
        }
    }

    fn edge(from: &str, to: &str) -> EdgeDef {
        EdgeDef {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn cycle_witness_starts_at_smallest_reentered_node() {
        let graph = GraphDef {
            nodes: vec![node("a"), node("b")],
            edges: vec![edge("a", "b"), edge("b", "a")],
        };
        let err = validate(&graph).unwrap_err();
        assert_eq!(err.structural_kind(), Some(StructuralKind::Cycle));
        assert!(err.to_string().contains("a -> b -> a"), "{err}");
    }

    #[test]
    fn duplicate_reports_lexicographically_first() {
        let graph = GraphDef {
            nodes: vec![node("z"), node("z"), node("a"), node("a")],
            edges: vec![],
        };
        let err = validate(&graph).unwrap_err();
        assert_eq!(err.structural_kind(), Some(StructuralKind::DuplicateId));
        assert!(err.to_string().contains("\"a\""), "{err}");
    }

    #[test]
    fn dangling_edge_detected() {
        let graph = GraphDef {
            nodes: vec![node("a")],
            edges: vec![edge("a", "ghost")],
        };
        let err = validate(&graph).unwrap_err();
        assert_eq!(err.structural_kind(), Some(StructuralKind::DanglingEdge));
    }
}
