// src/recovery/mod.rs

//! Persistent run state and resumable execution.

pub mod checkpoint;
pub mod resume;
pub mod store;

pub use checkpoint::CheckpointWriter;
pub use resume::build_resume_plan;
pub use store::{
    CheckpointRecord, FailureClass, FailureRecord, RecoveryStore, RunMode, RunRecord, RunStatus,
};
