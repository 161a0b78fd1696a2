// tests/graph_contract.rs

//! Graph contract properties: parse -> normalize -> validate -> hash.

use taskweave::errors::{EngineError, StructuralKind};
use taskweave::graph::{compute_hash, normalized, parse_document_str, validate, TaskGraph};
use taskweave_test_utils::{DocumentBuilder, NodeBuilder};

const EMPTY_GRAPH: &str = r#"{
  "schema_version": "1.0.0",
  "graph": {"nodes": [], "edges": []},
  "metadata": {}
}"#;

#[test]
fn empty_graph_parses_validates_and_hashes() {
    let doc = parse_document_str(EMPTY_GRAPH).unwrap();
    validate(&doc.graph).unwrap();
    let hash = compute_hash(&doc.graph).unwrap();
    assert_eq!(hash.as_str().len(), 64);

    // Stable across repeated computation.
    assert_eq!(hash, compute_hash(&doc.graph).unwrap());
}

#[test]
fn reordering_nodes_edges_outputs_preserves_hash() {
    let one = parse_document_str(
        r#"{
          "schema_version": "1.0.0",
          "graph": {
            "nodes": [
              {"id": "b", "type": "shell", "inputs": {"run": "true"}, "outputs": ["y", "x"]},
              {"id": "a", "type": "shell", "inputs": {"run": "true"}, "outputs": []}
            ],
            "edges": [{"from": "a", "to": "b"}]
          },
          "metadata": {}
        }"#,
    )
    .unwrap();
    let two = parse_document_str(
        r#"{
          "metadata": {"name": "renamed", "description": "metadata is free"},
          "graph": {
            "edges": [{"from": "a", "to": "b"}],
            "nodes": [
              {"id": "a", "type": "shell", "inputs": {"run": "true"}, "outputs": []},
              {"id": "b", "type": "shell", "outputs": ["x", "y"], "inputs": {"run": "true"}}
            ]
          },
          "schema_version": "1.0.0"
        }"#,
    )
    .unwrap();

    assert_eq!(
        compute_hash(&one.graph).unwrap(),
        compute_hash(&two.graph).unwrap()
    );
}

#[test]
fn metadata_changes_do_not_change_hash() {
    let plain = DocumentBuilder::new()
        .node(NodeBuilder::new("a").run("true"))
        .build();
    let labelled = DocumentBuilder::new()
        .node(NodeBuilder::new("a").run("true"))
        .metadata_name("renamed")
        .build();
    assert_eq!(
        compute_hash(&plain.graph).unwrap(),
        compute_hash(&labelled.graph).unwrap()
    );
}

#[test]
fn serialize_then_parse_round_trips_after_normalization() {
    let doc = DocumentBuilder::new()
        .node(NodeBuilder::new("b").run("true").output("out.txt"))
        .node(NodeBuilder::new("a").run("true"))
        .edge("a", "b")
        .build();

    let mut canonical = doc.clone();
    canonical.graph = normalized(&doc.graph);

    let serialized = serde_json::to_string(&canonical).unwrap();
    let reparsed = parse_document_str(&serialized).unwrap();
    assert_eq!(normalized(&reparsed.graph), canonical.graph);
    assert_eq!(
        compute_hash(&reparsed.graph).unwrap(),
        compute_hash(&doc.graph).unwrap()
    );
}

#[test]
fn unknown_top_level_field_is_parse_error() {
    let err = parse_document_str(
        r#"{"schema_version": "1.0.0", "graph": {"nodes": [], "edges": []}, "metadata": {}, "extra": 1}"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), "parse");
}

#[test]
fn unknown_node_field_is_parse_error() {
    let err = parse_document_str(
        r#"{
          "schema_version": "1.0.0",
          "graph": {
            "nodes": [{"id": "a", "type": "shell", "inputs": {}, "outputs": [], "surprise": true}],
            "edges": []
          },
          "metadata": {}
        }"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), "parse");
}

#[test]
fn malformed_json_is_parse_error() {
    let err = parse_document_str("{not json").unwrap_err();
    assert_eq!(err.kind(), "parse");
}

#[test]
fn missing_required_field_is_schema_error() {
    let err = parse_document_str(r#"{"schema_version": "1.0.0", "metadata": {}}"#).unwrap_err();
    assert_eq!(err.kind(), "schema");
}

#[test]
fn wrong_field_type_is_schema_error() {
    let err = parse_document_str(
        r#"{"schema_version": "1.0.0", "graph": {"nodes": "oops", "edges": []}, "metadata": {}}"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), "schema");
}

#[test]
fn unsupported_schema_version_is_semantic_error() {
    let err = parse_document_str(
        r#"{"schema_version": "2.0.0", "graph": {"nodes": [], "edges": []}, "metadata": {}}"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), "semantic");
}

#[test]
fn cycle_error_witness_starts_at_smallest_node() {
    let doc = DocumentBuilder::new()
        .node(NodeBuilder::new("a"))
        .node(NodeBuilder::new("b"))
        .edge("a", "b")
        .edge("b", "a")
        .build();
    let err = TaskGraph::from_document(&doc).unwrap_err();
    assert_eq!(err.structural_kind(), Some(StructuralKind::Cycle));
    assert!(err.to_string().contains("a -> b -> a"), "{err}");
}

#[test]
fn self_edge_duplicate_and_dangling_are_structural() {
    let self_edge = DocumentBuilder::new()
        .node(NodeBuilder::new("a"))
        .edge("a", "a")
        .build();
    assert_eq!(
        TaskGraph::from_document(&self_edge)
            .unwrap_err()
            .structural_kind(),
        Some(StructuralKind::SelfReference)
    );

    let duplicate = DocumentBuilder::new()
        .node(NodeBuilder::new("a"))
        .node(NodeBuilder::new("a"))
        .build();
    assert_eq!(
        TaskGraph::from_document(&duplicate)
            .unwrap_err()
            .structural_kind(),
        Some(StructuralKind::DuplicateId)
    );

    let dangling = DocumentBuilder::new()
        .node(NodeBuilder::new("a"))
        .edge("a", "ghost")
        .build();
    let err = TaskGraph::from_document(&dangling).unwrap_err();
    assert_eq!(err.structural_kind(), Some(StructuralKind::DanglingEdge));
    assert!(matches!(err, EngineError::Structural { .. }));
}
