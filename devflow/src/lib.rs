//! Node-graph workflow engine for a simulated development pipeline.
//!
//! A master node repeatedly evaluates an ordered decision table against the
//! shared [`ProcessState`](core::state::ProcessState) and dispatches sub nodes
//! that perform stage work. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state, stages, decision table).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (document loading, config, process
//!   execution, randomness, run artifacts). Isolated behind traits so tests
//!   can script them.
//!
//! [`executor`] and [`engine`] coordinate the two to run a workflow.

pub mod core;
pub mod engine;
pub mod error;
pub mod executor;
pub mod exit_codes;
pub mod graph;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use engine::{Engine, RunOutcome};
pub use error::WorkflowError;
