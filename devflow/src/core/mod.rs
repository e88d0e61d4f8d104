//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod stages;
pub mod state;
pub mod state_update;
pub mod transitions;
pub mod types;
