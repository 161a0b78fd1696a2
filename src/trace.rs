// src/trace.rs

//! Canonical execution trace.
//!
//! The trace is an observational log of logical events. It is canonical:
//! two observationally equivalent runs produce byte-identical traces, no
//! matter the concurrency level or commit interleaving. Wall-clock time,
//! durations and byte counts are forbidden in events.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{EngineError, Result};

/// Closed set of event kinds. Declaration order is the canonical
/// kind-precedence used for sorting; do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TraceEventKind {
    TaskInvalidated,
    TaskArtifactsRestored,
    TaskCached,
    TaskExecuted,
    TaskFailed,
    TaskSkipped,
}

/// Stable reason codes attached to events.
pub mod reason {
    /// `TaskCached` from an on-the-fly cache probe hit.
    pub const CACHE_HIT: &str = "CacheHit";
    /// `TaskCached` from an authoritative plan decision.
    pub const PLANNED_REUSE_CACHE: &str = "PlannedReuseCache";
    /// `TaskArtifactsRestored` alongside a probe hit.
    pub const CACHE_REPLAY: &str = "CacheReplay";
    /// `TaskArtifactsRestored` alongside a planned reuse.
    pub const CACHE_RESTORE: &str = "CacheRestore";
    /// `TaskFailed` with a non-zero exit code.
    pub const EXIT_NON_ZERO: &str = "ExitNonZero";
    /// `TaskFailed` because cache restoration failed.
    pub const RESTORE_FAILED: &str = "RestoreFailed";
}

/// One logical event. Field order here is the canonical JSON field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(
        rename = "causeTaskId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cause_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<String>>,
}

impl TraceEvent {
    pub fn new(kind: TraceEventKind, task_id: impl Into<String>) -> Self {
        Self {
            kind,
            task_id: task_id.into(),
            reason: None,
            cause_task_id: None,
            artifacts: None,
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause_task_id = Some(cause.into());
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    fn canonical(mut self) -> Self {
        if let Some(artifacts) = &mut self.artifacts {
            artifacts.sort();
            artifacts.dedup();
            if artifacts.is_empty() {
                // Empty artifact lists normalize to absent.
                self.artifacts = None;
            }
        }
        self
    }

    fn sort_key(&self) -> (&str, TraceEventKind, &Option<String>, &Option<String>, &Option<Vec<String>>) {
        (
            self.task_id.as_str(),
            self.kind,
            &self.reason,
            &self.cause_task_id,
            &self.artifacts,
        )
    }
}

/// Graph hash plus the canonically ordered event list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    #[serde(rename = "graphHash")]
    pub graph_hash: String,
    pub events: Vec<TraceEvent>,
}

impl ExecutionTrace {
    pub fn new(graph_hash: impl Into<String>) -> Self {
        Self {
            graph_hash: graph_hash.into(),
            events: Vec::new(),
        }
    }

    /// Sort events by (task id, kind precedence, reason, cause, artifact
    /// list) and normalize empty artifact lists to absent.
    pub fn canonicalize(&mut self) {
        let events = std::mem::take(&mut self.events);
        let mut events: Vec<TraceEvent> =
            events.into_iter().map(TraceEvent::canonical).collect();
        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.events = events;
    }

    /// Compact canonical JSON bytes with fixed field order.
    pub fn canonical_json(&self) -> Result<Vec<u8>> {
        let mut canonical = self.clone();
        canonical.canonicalize();
        serde_json::to_vec(&canonical)
            .map_err(|e| EngineError::System(format!("serializing trace: {e}")))
    }

    /// SHA-256 hex over the canonical bytes.
    pub fn hash(&self) -> Result<String> {
        let bytes = self.canonical_json()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Append-only recorder owned by the run coordinator. Recording never
/// mutates graph or scheduler state and never fails the run.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consume the recorder into a canonical trace.
    pub fn into_trace(self, graph_hash: impl Into<String>) -> ExecutionTrace {
        let mut trace = ExecutionTrace {
            graph_hash: graph_hash.into(),
            events: self.events,
        };
        trace.canonicalize();
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_commit_order_independent() {
        let make = |order_swapped: bool| {
            let mut recorder = TraceRecorder::new();
            let a = TraceEvent::new(TraceEventKind::TaskExecuted, "a");
            let b = TraceEvent::new(TraceEventKind::TaskExecuted, "b");
            if order_swapped {
                recorder.record(b.clone());
                recorder.record(a.clone());
            } else {
                recorder.record(a);
                recorder.record(b);
            }
            recorder.into_trace("gh")
        };
        let one = make(false).canonical_json().unwrap();
        let two = make(true).canonical_json().unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn kind_precedence_orders_same_task_events() {
        let mut trace = ExecutionTrace::new("gh");
        trace.events.push(TraceEvent::new(TraceEventKind::TaskCached, "a"));
        trace
            .events
            .push(TraceEvent::new(TraceEventKind::TaskArtifactsRestored, "a"));
        trace.canonicalize();
        assert_eq!(trace.events[0].kind, TraceEventKind::TaskArtifactsRestored);
        assert_eq!(trace.events[1].kind, TraceEventKind::TaskCached);
    }

    #[test]
    fn empty_artifacts_normalize_to_absent() {
        let mut trace = ExecutionTrace::new("gh");
        trace.events.push(
            TraceEvent::new(TraceEventKind::TaskArtifactsRestored, "a").with_artifacts(vec![]),
        );
        trace.canonicalize();
        assert!(trace.events[0].artifacts.is_none());
        let json = String::from_utf8(trace.canonical_json().unwrap()).unwrap();
        assert!(!json.contains("artifacts"));
    }

    #[test]
    fn canonical_json_has_fixed_field_order() {
        let mut trace = ExecutionTrace::new("gh");
        trace.events.push(
            TraceEvent::new(TraceEventKind::TaskSkipped, "d").with_cause("b"),
        );
        let json = String::from_utf8(trace.canonical_json().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"graphHash":"gh","events":[{"kind":"TaskSkipped","taskId":"d","causeTaskId":"b"}]}"#
        );
    }

    #[test]
    fn hash_is_stable() {
        let trace = ExecutionTrace::new("gh");
        assert_eq!(trace.hash().unwrap(), trace.hash().unwrap());
        assert_eq!(trace.hash().unwrap().len(), 64);
    }
}
