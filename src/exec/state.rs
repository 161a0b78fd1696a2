// src/exec/state.rs

//! Per-run node lifecycle state machine.
//!
//! Transitions are append-only: no state ever leaves the terminal set
//! {Completed, Cached, Failed, Skipped}. All operations are total and
//! pure over the state they are given.

use std::collections::BTreeMap;

use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::graph::TaskGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Cached,
    Completed,
    Failed,
    Skipped,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Pending => "Pending",
            NodeState::Running => "Running",
            NodeState::Cached => "Cached",
            NodeState::Completed => "Completed",
            NodeState::Failed => "Failed",
            NodeState::Skipped => "Skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeState::Completed | NodeState::Cached | NodeState::Failed | NodeState::Skipped
        )
    }

    /// Successful terminal states satisfy downstream dependencies.
    pub fn is_successful(&self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Cached)
    }

    fn allows(self, to: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, to),
            (Pending, Running) | (Pending, Cached) | (Pending, Skipped) | (Running, Completed) | (Running, Failed)
        )
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-run state for every node of one graph.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    states: BTreeMap<String, NodeState>,
    /// For each skipped node, the lexicographically smallest failed
    /// ancestor whose failure implies the skip.
    skip_causes: BTreeMap<String, String>,
}

impl ExecutionState {
    /// All nodes start Pending.
    pub fn new(graph: &TaskGraph) -> Self {
        Self {
            states: graph
                .tasks()
                .iter()
                .map(|t| (t.name.clone(), NodeState::Pending))
                .collect(),
            skip_causes: BTreeMap::new(),
        }
    }

    pub fn state_of(&self, name: &str) -> Option<NodeState> {
        self.states.get(name).copied()
    }

    pub fn skip_cause_of(&self, name: &str) -> Option<&str> {
        self.skip_causes.get(name).map(String::as_str)
    }

    pub fn skip_causes(&self) -> &BTreeMap<String, String> {
        &self.skip_causes
    }

    pub fn snapshot(&self) -> BTreeMap<String, NodeState> {
        self.states.clone()
    }

    /// Verify the expected `from` state and move to `to`.
    pub fn transition(&mut self, name: &str, from: NodeState, to: NodeState) -> Result<()> {
        let current = self.states.get_mut(name).ok_or_else(|| {
            EngineError::System(format!("transition for unknown task {name:?}"))
        })?;
        if *current != from || !from.allows(to) {
            return Err(EngineError::StateMachine {
                task: name.to_string(),
                from: from.as_str(),
                to: to.as_str(),
                current: current.as_str(),
            });
        }
        debug!(task = %name, from = %from, to = %to, "state transition");
        *current = to;
        Ok(())
    }

    /// Tasks that are Pending with every direct upstream in a successful
    /// terminal state, in lexicographic order.
    pub fn ready_tasks(&self, graph: &TaskGraph) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, &state)| state == NodeState::Pending)
            .filter(|(name, _)| {
                graph
                    .upstream_of(name)
                    .iter()
                    .all(|p| self.states.get(*p).is_some_and(|s| s.is_successful()))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Mark `name` Failed and transition every still-Pending downstream
    /// descendant to Skipped, in canonical index order.
    ///
    /// The recorded skip cause is the lexicographically smallest failed
    /// ancestor implying the skip: a later failure with a smaller name
    /// refines the cause of an already-skipped descendant, which keeps
    /// trace output independent of completion order. Idempotent on
    /// already-terminal descendants.
    pub fn fail_and_propagate(&mut self, graph: &TaskGraph, name: &str) -> Result<()> {
        self.transition(name, NodeState::Running, NodeState::Failed)?;

        for descendant in graph.reachable_downstream(name) {
            match self.states.get(descendant).copied() {
                Some(NodeState::Pending) => {
                    self.transition(descendant, NodeState::Pending, NodeState::Skipped)?;
                    self.skip_causes
                        .insert(descendant.to_string(), name.to_string());
                }
                Some(NodeState::Skipped) => {
                    let cause = self
                        .skip_causes
                        .entry(descendant.to_string())
                        .or_insert_with(|| name.to_string());
                    if name < cause.as_str() {
                        *cause = name.to_string();
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn all_terminal(&self) -> bool {
        self.states.values().all(NodeState::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::parse::parse_document_str;

    fn graph(doc: &str) -> TaskGraph {
        TaskGraph::from_document(&parse_document_str(doc).unwrap()).unwrap()
    }

    fn diamond() -> TaskGraph {
        graph(
            r#"{
              "schema_version": "1.0.0",
              "graph": {
                "nodes": [
                  {"id": "a", "type": "shell", "inputs": {}, "outputs": []},
                  {"id": "b", "type": "shell", "inputs": {}, "outputs": []},
                  {"id": "c", "type": "shell", "inputs": {}, "outputs": []},
                  {"id": "d", "type": "shell", "inputs": {}, "outputs": []}
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
    }

    #[test]
    fn ready_requires_successful_upstreams() {
        let g = diamond();
        let mut state = ExecutionState::new(&g);
        assert_eq!(state.ready_tasks(&g), vec!["a"]);

        state.transition("a", NodeState::Pending, NodeState::Running).unwrap();
        assert!(state.ready_tasks(&g).is_empty());

        state.transition("a", NodeState::Running, NodeState::Completed).unwrap();
        assert_eq!(state.ready_tasks(&g), vec!["b", "c"]);
    }

    #[test]
    fn invalid_transition_is_typed_error() {
        let g = diamond();
        let mut state = ExecutionState::new(&g);
        let err = state
            .transition("a", NodeState::Running, NodeState::Completed)
            .unwrap_err();
        assert!(matches!(err, EngineError::StateMachine { .. }));
    }

    #[test]
    fn terminal_states_are_sticky() {
        let g = diamond();
        let mut state = ExecutionState::new(&g);
        state.transition("a", NodeState::Pending, NodeState::Cached).unwrap();
        assert!(state
            .transition("a", NodeState::Cached, NodeState::Running)
            .is_err());
    }

    #[test]
    fn propagation_skips_descendants_with_cause() {
        let g = diamond();
        let mut state = ExecutionState::new(&g);
        state.transition("a", NodeState::Pending, NodeState::Running).unwrap();
        state.fail_and_propagate(&g, "a").unwrap();

        assert_eq!(state.state_of("a"), Some(NodeState::Failed));
        assert_eq!(state.state_of("b"), Some(NodeState::Skipped));
        assert_eq!(state.state_of("c"), Some(NodeState::Skipped));
        assert_eq!(state.state_of("d"), Some(NodeState::Skipped));
        assert_eq!(state.skip_cause_of("d"), Some("a"));
        assert!(state.all_terminal());
    }

    #[test]
    fn later_smaller_failure_refines_skip_cause() {
        let g = diamond();
        let mut state = ExecutionState::new(&g);
        state.transition("a", NodeState::Pending, NodeState::Running).unwrap();
        state.transition("a", NodeState::Running, NodeState::Completed).unwrap();
        state.transition("b", NodeState::Pending, NodeState::Running).unwrap();
        state.transition("c", NodeState::Pending, NodeState::Running).unwrap();

        // c fails first: d is skipped with cause c.
        state.fail_and_propagate(&g, "c").unwrap();
        assert_eq!(state.skip_cause_of("d"), Some("c"));

        // b fails second: the cause refines to the lex-min ancestor b.
        state.fail_and_propagate(&g, "b").unwrap();
        assert_eq!(state.skip_cause_of("d"), Some("b"));
    }
}
