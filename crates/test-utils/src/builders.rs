// crates/test-utils/src/builders.rs

#![allow(dead_code)]

use std::collections::BTreeMap;

use taskweave::graph::{
    Document, EdgeDef, GraphDef, Metadata, NodeDef, NodeInputs, TaskGraph,
    SUPPORTED_SCHEMA_VERSION,
};

/// Builder for a single graph node.
pub struct NodeBuilder {
    node: NodeDef,
}

impl NodeBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            node: NodeDef {
                id: id.to_string(),
                kind: "shell".to_string(),
                inputs: NodeInputs {
                    run: None,
                    files: vec![],
                    env: BTreeMap::new(),
                },
                outputs: vec![],
            },
        }
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.node.kind = kind.to_string();
        self
    }

    pub fn run(mut self, command: &str) -> Self {
        self.node.inputs.run = Some(command.to_string());
        self
    }

    pub fn input(mut self, path: &str) -> Self {
        self.node.inputs.files.push(path.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.node.inputs.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.node.outputs.push(path.to_string());
        self
    }

    pub fn build(self) -> NodeDef {
        self.node
    }
}

/// Builder for a full graph document.
pub struct DocumentBuilder {
    doc: Document,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            doc: Document {
                schema_version: SUPPORTED_SCHEMA_VERSION.to_string(),
                graph: GraphDef {
                    nodes: vec![],
                    edges: vec![],
                },
                metadata: Metadata::default(),
            },
        }
    }

    pub fn node(mut self, node: NodeBuilder) -> Self {
        self.doc.graph.nodes.push(node.build());
        self
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.doc.graph.edges.push(EdgeDef {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    pub fn metadata_name(mut self, name: &str) -> Self {
        self.doc.metadata.name = Some(name.to_string());
        self
    }

    pub fn build(self) -> Document {
        self.doc
    }

    pub fn build_graph(self) -> TaskGraph {
        TaskGraph::from_document(&self.build()).expect("builder produced an invalid graph")
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A chain a -> b -> c with no commands; handy with the fake runner.
pub fn chain_graph() -> TaskGraph {
    DocumentBuilder::new()
        .node(NodeBuilder::new("a"))
        .node(NodeBuilder::new("b"))
        .node(NodeBuilder::new("c"))
        .edge("a", "b")
        .edge("b", "c")
        .build_graph()
}

/// A diamond a -> {b, c} -> d with no commands.
pub fn diamond_graph() -> TaskGraph {
    DocumentBuilder::new()
        .node(NodeBuilder::new("a"))
        .node(NodeBuilder::new("b"))
        .node(NodeBuilder::new("c"))
        .node(NodeBuilder::new("d"))
        .edge("a", "b")
        .edge("a", "c")
        .edge("b", "d")
        .edge("c", "d")
        .build_graph()
}
