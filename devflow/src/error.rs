//! Structural errors raised by the engine.
//!
//! Business outcomes (failed reviews, failing tests, exhausted bug-fix budget)
//! are modeled transitions, never errors.

use std::path::PathBuf;

/// Errors for configuration and graph-structure problems.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow document not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// `origin` is the document path or, for in-memory graphs, the workflow name.
    #[error("malformed workflow document {origin}: {message}")]
    ConfigMalformed { origin: String, message: String },
    #[error("master node '{0}' is not declared in the workflow document")]
    MasterNodeMissing(String),
    #[error("next node '{0}' is not declared in the workflow document")]
    UnknownNextNode(String),
    /// Recovered inside the node executor; only surfaces from backends.
    #[error("generation backend failed: {0}")]
    BackendFailure(String),
    #[error("step limit exceeded: {0} sub-node executions without a terminal decision")]
    StepLimitExceeded(u32),
}
