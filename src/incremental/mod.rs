// src/incremental/mod.rs

//! Incremental planning: snapshot comparison, invalidation analysis with
//! transitive root-cause propagation, and Execute/ReuseCache plans.

pub mod delta;
pub mod invalidation;
pub mod plan;
pub mod snapshot;

pub use delta::{calculate_delta, GraphDelta};
pub use invalidation::{
    calculate_invalidation, canonicalize_reasons, serialize_invalidation_map,
    InvalidationEntry, InvalidationMap, Reason, ReasonDetail, ReasonKind,
};
pub use plan::{build_plan, plan_incremental, Decision, ExecutionPlan, PlanningResult};
pub use snapshot::{GraphSnapshot, NodeSnapshot};
