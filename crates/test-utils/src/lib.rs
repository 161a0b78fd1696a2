// crates/test-utils/src/lib.rs

//! Shared test helpers: document/graph builders and a scripted fake
//! runner that executes no real processes.

pub mod builders;
pub mod fake_runner;

pub use builders::{DocumentBuilder, NodeBuilder};
pub use fake_runner::{FakeBehavior, FakeRunner};
