// src/incremental/plan.rs

//! Deterministic execution plan: every node gets exactly one decision,
//! Execute or ReuseCache. There is no third "skip" state and no
//! runtime-conditional skipping.

use std::collections::BTreeMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::cache::Cache;
use crate::errors::{EngineError, Result};
use crate::incremental::invalidation::{calculate_invalidation, InvalidationMap};
use crate::incremental::snapshot::GraphSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Execute,
    ReuseCache,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Execute => "Execute",
            Decision::ReuseCache => "ReuseCache",
        }
    }
}

/// Ordered decisions overlaying a static graph. The order is the
/// deterministic topological order (lexicographic tie-break).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub order: Vec<String>,
    pub decisions: BTreeMap<String, Decision>,
}

impl ExecutionPlan {
    pub fn decision(&self, name: &str) -> Decision {
        self.decisions
            .get(name)
            .copied()
            .unwrap_or(Decision::Execute)
    }

    /// Deterministic byte encoding: big-endian task count, then per task
    /// its name and decision, length-prefixed.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.order.len() as u64).to_be_bytes());
        for name in &self.order {
            write_field(&mut buf, name.as_bytes());
            write_field(&mut buf, self.decision(name).as_str().as_bytes());
        }
        buf
    }

    /// SHA-256 hex over the serialized plan.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.serialize());
        hex::encode(hasher.finalize())
    }
}

/// Output of one planning pass: the invalidation map is the source of
/// truth, the plan is the decision overlay derived from it.
#[derive(Debug, Clone)]
pub struct PlanningResult {
    pub invalidation: InvalidationMap,
    pub plan: ExecutionPlan,
}

/// Build an execution plan from invalidation state and cache presence.
///
/// A node is ReuseCache iff it is not invalidated, its task hash is known
/// and present in the cache, and every direct upstream is ReuseCache. A
/// fresh upstream execution can change the semantic context even when the
/// local task hash matches a prior entry, hence the transitive condition.
///
/// Cache I/O errors abort planning; planning never executes tasks.
pub fn build_plan(
    snapshot: &GraphSnapshot,
    invalidation: &InvalidationMap,
    cache: &Arc<dyn Cache>,
) -> Result<ExecutionPlan> {
    let order = snapshot.topological_order();
    let mut decisions: BTreeMap<String, Decision> = BTreeMap::new();

    for name in &order {
        let node = &snapshot.nodes[name];

        if invalidation
            .get(name)
            .map(|e| e.invalidated)
            .unwrap_or(false)
        {
            decisions.insert(name.clone(), Decision::Execute);
            continue;
        }

        let Some(hash) = &node.task_hash else {
            decisions.insert(name.clone(), Decision::Execute);
            continue;
        };
        let present = cache
            .has(hash)
            .map_err(|e| EngineError::Cache(format!("checking cache for {name:?}: {e}")))?;
        if !present {
            decisions.insert(name.clone(), Decision::Execute);
            continue;
        }

        let all_upstream_reuse = node
            .upstream
            .iter()
            .all(|p| decisions.get(p) == Some(&Decision::ReuseCache));
        decisions.insert(
            name.clone(),
            if all_upstream_reuse {
                Decision::ReuseCache
            } else {
                Decision::Execute
            },
        );
    }

    Ok(ExecutionPlan { order, decisions })
}

/// Convenience integration point: invalidation plus plan in one pass.
pub fn plan_incremental(
    old: Option<&GraphSnapshot>,
    new: &GraphSnapshot,
    cache: &Arc<dyn Cache>,
) -> Result<PlanningResult> {
    let invalidation = calculate_invalidation(old, new);
    let plan = build_plan(new, &invalidation, cache)?;
    Ok(PlanningResult { invalidation, plan })
}

fn write_field(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u64).to_be_bytes());
    buf.extend_from_slice(data);
}
