//! Stable exit codes for the `devflow` CLI.

use crate::core::types::WorkflowStatus;

/// Run finished, or a non-run command succeeded.
pub const OK: i32 = 0;
/// Invalid document/config, or any other error.
pub const INVALID: i32 = 1;
/// Run terminated for manual intervention.
pub const TERMINATED: i32 = 2;
/// Run stalled without a next node.
pub const STALLED: i32 = 3;

/// Exit code reported for a run that ended with `status`.
pub fn for_status(status: WorkflowStatus) -> i32 {
    match status {
        WorkflowStatus::Finished => OK,
        WorkflowStatus::Terminated => TERMINATED,
        WorkflowStatus::Stalled => STALLED,
        // The driver loop only returns terminal statuses.
        WorkflowStatus::Ready | WorkflowStatus::Executing => INVALID,
    }
}
