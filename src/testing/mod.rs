//! Test support utilities
//!
//! Mock collaborators behind the same traits production uses, so a fresh
//! orchestrator can be constructed and driven entirely in-process.

pub mod mocks;

pub use mocks::{MockResolver, MockSessionDriver};
