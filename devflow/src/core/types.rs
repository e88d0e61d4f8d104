//! Shared deterministic types for the engine core.
//!
//! These types define the vocabulary of the pipeline state machine. They carry
//! no behavior beyond formatting and serde mapping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one workflow run.
///
/// `Ready -> Executing -> {Finished | Terminated | Stalled}`; `Executing` is the
/// only state the driver loop iterates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Ready,
    Executing,
    /// The pipeline reached its merge stage and completed.
    Finished,
    /// The bug-fix budget ran out; manual intervention is required.
    Terminated,
    /// The loop ran out of work without reaching a terminal decision.
    Stalled,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Ready => "ready",
            WorkflowStatus::Executing => "executing",
            WorkflowStatus::Finished => "finished",
            WorkflowStatus::Terminated => "terminated",
            WorkflowStatus::Stalled => "stalled",
        }
    }

    /// True once the run can no longer make progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Finished | WorkflowStatus::Terminated | WorkflowStatus::Stalled
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a review or test stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Pending,
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pending => "pending",
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one master decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Dispatch the node with this id next.
    NextNode(String),
    /// Stop with [`WorkflowStatus::Finished`].
    Finished,
    /// Stop with [`WorkflowStatus::Terminated`].
    Terminated,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NextNode(id) => write!(f, "{id}"),
            Decision::Finished => f.write_str("<finished>"),
            Decision::Terminated => f.write_str("<terminated>"),
        }
    }
}
