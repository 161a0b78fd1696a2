// src/incremental/invalidation.rs

//! Invalidation analysis between two graph snapshots.
//!
//! The analyzer is pure over its inputs: it never executes work and never
//! touches the filesystem. Two logically equal invalidation maps
//! serialize to identical bytes regardless of creation order.

use std::collections::{BTreeMap, BTreeSet};

use crate::incremental::snapshot::{GraphSnapshot, NodeSnapshot};

/// Stable reason category. The declaration order is the canonical
/// precedence used when sorting reason sets; do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReasonKind {
    InputChanged,
    EnvChanged,
    DependencyInvalidated,
    GraphStructureChanged,
    CommandChanged,
    OutputChanged,
}

impl ReasonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonKind::InputChanged => "InputChanged",
            ReasonKind::EnvChanged => "EnvChanged",
            ReasonKind::DependencyInvalidated => "DependencyInvalidated",
            ReasonKind::GraphStructureChanged => "GraphStructureChanged",
            ReasonKind::CommandChanged => "CommandChanged",
            ReasonKind::OutputChanged => "OutputChanged",
        }
    }
}

/// Optional key/value context attached to a reason. Stored as sorted,
/// deduplicated pairs to keep serialization creation-order independent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReasonDetail {
    pub key: String,
    pub value: String,
}

impl ReasonDetail {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single atomic cause for task invalidation.
///
/// `source` is the root-cause task id and is required exactly when
/// `kind == DependencyInvalidated`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reason {
    pub kind: ReasonKind,
    pub source: Option<String>,
    pub details: Vec<ReasonDetail>,
}

impl Reason {
    pub fn new(kind: ReasonKind) -> Self {
        Self {
            kind,
            source: None,
            details: Vec::new(),
        }
    }

    pub fn with_source(kind: ReasonKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: Some(source.into()),
            details: Vec::new(),
        }
    }

    pub fn with_details(kind: ReasonKind, details: Vec<ReasonDetail>) -> Self {
        Self {
            kind,
            source: None,
            details,
        }
    }

    fn canonical(mut self) -> Self {
        self.details.sort();
        self.details.dedup();
        self
    }
}

/// Sort + dedup a reason set into canonical order: (kind precedence,
/// source id, detail list).
pub fn canonicalize_reasons(reasons: Vec<Reason>) -> Vec<Reason> {
    let mut out: Vec<Reason> = reasons.into_iter().map(Reason::canonical).collect();
    out.sort();
    out.dedup();
    out
}

/// Per-node invalidation decision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvalidationEntry {
    pub invalidated: bool,
    pub reasons: Vec<Reason>,
}

/// Node name -> invalidation decision; one entry per node of the *new*
/// snapshot.
pub type InvalidationMap = BTreeMap<String, InvalidationEntry>;

/// Deterministic binary encoding of an invalidation map: sorted keys,
/// each (name, reasons) length-prefixed, reasons in canonical order.
pub fn serialize_invalidation_map(map: &InvalidationMap) -> Vec<u8> {
    let mut buf = Vec::new();
    if map.is_empty() {
        return buf;
    }
    buf.extend_from_slice(&(map.len() as u32).to_be_bytes());
    for (name, entry) in map {
        write_string(&mut buf, name);
        let reasons_bytes = serialize_reasons(&entry.reasons);
        buf.extend_from_slice(&(reasons_bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&reasons_bytes);
    }
    buf
}

fn serialize_reasons(reasons: &[Reason]) -> Vec<u8> {
    let canonical = canonicalize_reasons(reasons.to_vec());
    let mut buf = Vec::new();
    buf.extend_from_slice(&(canonical.len() as u32).to_be_bytes());
    for reason in &canonical {
        let body = serialize_reason(reason);
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body);
    }
    buf
}

fn serialize_reason(reason: &Reason) -> Vec<u8> {
    let mut buf = Vec::new();
    write_string(&mut buf, reason.kind.as_str());
    match &reason.source {
        Some(source) => {
            buf.push(1);
            write_string(&mut buf, source);
        }
        None => buf.push(0),
    }
    buf.extend_from_slice(&(reason.details.len() as u32).to_be_bytes());
    for detail in &reason.details {
        write_string(&mut buf, &detail.key);
        write_string(&mut buf, &detail.value);
    }
    buf
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Compute which nodes of `new` are invalidated relative to `old`.
///
/// Invalidation is strictly transitive: any node with an invalidated
/// upstream acquires `DependencyInvalidated` reasons naming the *root*
/// causes, not the immediate upstream. A node absent from the old
/// snapshot is a `GraphStructureChanged` root cause.
pub fn calculate_invalidation(
    old: Option<&GraphSnapshot>,
    new: &GraphSnapshot,
) -> InvalidationMap {
    let mut result = InvalidationMap::new();
    if new.nodes.is_empty() {
        return result;
    }

    let empty = GraphSnapshot::default();
    let old = old.unwrap_or(&empty);

    // Root causes per node, for downstream propagation.
    let mut root_sources: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for name in new.topological_order() {
        let new_node = &new.nodes[&name];
        let direct = direct_reasons(old.nodes.get(&name), new_node, new);

        // Dependency reasons reference the union of upstream root causes.
        let mut dep_sources: BTreeSet<String> = BTreeSet::new();
        for parent in &new_node.upstream {
            let Some(entry) = result.get(parent) else {
                continue;
            };
            if !entry.invalidated {
                continue;
            }
            if let Some(sources) = root_sources.get(parent) {
                dep_sources.extend(sources.iter().cloned());
            }
        }

        let mut reasons = direct.clone();
        for source in &dep_sources {
            reasons.push(Reason::with_source(
                ReasonKind::DependencyInvalidated,
                source.clone(),
            ));
        }
        let reasons = canonicalize_reasons(reasons);
        let invalidated = !reasons.is_empty();
        result.insert(
            name.clone(),
            InvalidationEntry {
                invalidated,
                reasons,
            },
        );

        let mut roots = BTreeSet::new();
        if invalidated {
            if !direct.is_empty() {
                roots.insert(name.clone());
            }
            roots.extend(dep_sources);
        }
        root_sources.insert(name, roots);
    }

    result
}

fn direct_reasons(
    old_node: Option<&NodeSnapshot>,
    new_node: &NodeSnapshot,
    new: &GraphSnapshot,
) -> Vec<Reason> {
    let Some(old_node) = old_node else {
        // A new node's root cause is the structural change itself.
        return vec![Reason::new(ReasonKind::GraphStructureChanged)];
    };

    let mut direct = Vec::new();

    if new_node.input_hash != old_node.input_hash {
        direct.push(Reason::new(ReasonKind::InputChanged));
    }

    if new_node.declared_inputs != old_node.declared_inputs {
        let diff = symmetric_difference(&old_node.declared_inputs, &new_node.declared_inputs);
        if diff.is_empty() {
            direct.push(Reason::with_details(
                ReasonKind::GraphStructureChanged,
                vec![ReasonDetail::new("DeclaredInputs", "changed")],
            ));
        } else {
            for path in diff {
                direct.push(Reason::with_details(
                    ReasonKind::GraphStructureChanged,
                    vec![ReasonDetail::new("InputName", path)],
                ));
            }
        }
    }

    if new_node.env != old_node.env {
        let keys = changed_map_keys(&old_node.env, &new_node.env);
        if keys.is_empty() {
            direct.push(Reason::new(ReasonKind::EnvChanged));
        } else {
            direct.push(Reason::with_details(
                ReasonKind::EnvChanged,
                keys.into_iter()
                    .map(|k| ReasonDetail::new("EnvName", k))
                    .collect(),
            ));
        }
    }

    if new_node.command != old_node.command {
        direct.push(Reason::new(ReasonKind::CommandChanged));
    }

    if new_node.outputs != old_node.outputs {
        let diff = symmetric_difference(&old_node.outputs, &new_node.outputs);
        if diff.is_empty() {
            direct.push(Reason::new(ReasonKind::OutputChanged));
        } else {
            direct.push(Reason::with_details(
                ReasonKind::OutputChanged,
                diff.into_iter()
                    .map(|o| ReasonDetail::new("OutputName", o))
                    .collect(),
            ));
        }
    }

    if new_node.upstream != old_node.upstream {
        direct.push(Reason::with_details(
            ReasonKind::GraphStructureChanged,
            vec![ReasonDetail::new("Upstream", "changed")],
        ));
    }

    // An upstream missing from the new graph is a structural change for
    // this node.
    for parent in &new_node.upstream {
        if !new.nodes.contains_key(parent) {
            direct.push(Reason::with_details(
                ReasonKind::GraphStructureChanged,
                vec![
                    ReasonDetail::new("Upstream", "missing"),
                    ReasonDetail::new("UpstreamTaskID", parent.clone()),
                ],
            ));
        }
    }

    canonicalize_reasons(direct)
}

fn symmetric_difference(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Vec<String> {
    a.symmetric_difference(b).cloned().collect()
}

fn changed_map_keys(
    a: &BTreeMap<String, String>,
    b: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut all: BTreeSet<&String> = a.keys().collect();
    all.extend(b.keys());
    all.into_iter()
        .filter(|k| a.get(*k) != b.get(*k))
        .cloned()
        .collect()
}
