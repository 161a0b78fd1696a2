// src/recovery/resume.rs

//! Resume planning: reconstruct an execution plan from a prior run's
//! checkpoints.
//!
//! A node is planned ReuseCache iff it has a valid checkpoint whose first
//! cache key equals the node's *current* task hash, the cache entry still
//! exists, and every upstream is itself ReuseCache. Everything else
//! executes. Resume is all-or-nothing over the graph: the full plan is
//! always produced deterministically; there is no cherry-picking.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::Cache;
use crate::errors::Result;
use crate::exec::runner::TaskRunner;
use crate::graph::TaskGraph;
use crate::hasher::{InputResolver, TaskHasher};
use crate::incremental::{Decision, ExecutionPlan};
use crate::recovery::store::CheckpointRecord;

/// Build a plan that reuses checkpointed work from a previous run.
///
/// Restoration ordering: before hashing a node, every planned-reuse
/// upstream has its outputs restored (lazily, once, in topological
/// order), so input-hash computation sees the real bytes. A restoration
/// failure demotes that upstream, and with it the downstream chain, to
/// Execute.
pub async fn build_resume_plan(
    graph: &TaskGraph,
    checkpoints: &BTreeMap<String, CheckpointRecord>,
    cache: &Arc<dyn Cache>,
    resolver: &InputResolver,
    hasher: &TaskHasher,
    runner: &dyn TaskRunner,
) -> Result<ExecutionPlan> {
    let order: Vec<String> = graph
        .topological_order()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut decisions: BTreeMap<String, Decision> = BTreeMap::new();
    let mut restored: BTreeMap<String, bool> = BTreeMap::new();

    for name in &order {
        let task = match graph.task(name) {
            Some(task) => task,
            None => continue,
        };

        // Restore planned-reuse upstreams first so this node's declared
        // inputs resolve against real bytes.
        for parent in graph.upstream_of(name) {
            if decisions.get(parent) != Some(&Decision::ReuseCache) {
                continue;
            }
            if restored.get(parent).copied().unwrap_or(false) {
                continue;
            }
            let parent_task = match graph.task(parent) {
                Some(task) => task,
                None => continue,
            };
            match runner.restore(parent_task).await {
                Ok(result) if result.succeeded() => {
                    restored.insert(parent.to_string(), true);
                }
                Ok(result) => {
                    warn!(
                        task = %parent,
                        exit_code = result.exit_code,
                        "resume restoration returned failure; demoting chain to execute"
                    );
                    decisions.insert(parent.to_string(), Decision::Execute);
                }
                Err(err) => {
                    warn!(
                        task = %parent,
                        error = %err,
                        "resume restoration failed; demoting chain to execute"
                    );
                    decisions.insert(parent.to_string(), Decision::Execute);
                }
            }
        }

        // Hash against the current workspace. Unresolvable inputs simply
        // force execution; the executor will surface real errors.
        let current_hash = match resolver.resolve(&task.inputs) {
            Ok(resolved) => Some(hasher.task_hash(task, &resolved)),
            Err(err) => {
                debug!(task = %name, error = %err, "inputs unresolvable during resume planning");
                None
            }
        };

        let reusable = match (checkpoints.get(name), &current_hash) {
            (Some(cp), Some(hash)) if cp.valid => {
                cp.cache_keys.first().map(String::as_str) == Some(hash.as_str())
                    && cache.has(hash)?
            }
            _ => false,
        };
        if !reusable {
            decisions.insert(name.clone(), Decision::Execute);
            continue;
        }

        let all_upstream_reuse = graph
            .upstream_of(name)
            .iter()
            .all(|p| decisions.get(*p) == Some(&Decision::ReuseCache));
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
