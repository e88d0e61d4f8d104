use tracing::{debug, info, warn};

use crate::core::state::ProcessState;
use crate::core::transitions::TransitionTable;
use crate::core::types::{Decision, WorkflowStatus};
use crate::executor::{Envelope, NodeExecutor};
use crate::graph::Node;

/// Runs the decision table against the process state.
///
/// The master performs no stage work and never calls a generation backend.
pub struct MasterExecutor<'a> {
    base: NodeExecutor<'a>,
    table: &'a TransitionTable,
}

impl<'a> MasterExecutor<'a> {
    pub fn new(node: &'a Node, state: &'a mut ProcessState, table: &'a TransitionTable) -> Self {
        Self {
            base: NodeExecutor::new(node, state),
            table,
        }
    }

    /// Make one decision and describe it.
    ///
    /// - `ready`: start the run and dispatch the table's entry node.
    /// - `executing`: evaluate the rows for `current_node_id`. A terminal
    ///   decision sets the status; a node decision sets `next_node_id`; no
    ///   matching row clears `next_node_id`.
    /// - any terminal status: nothing changes.
    pub fn decide(mut self) -> Envelope {
        let status = self.base.state().workflow_status;
        let content = match status {
            WorkflowStatus::Ready => {
                let entry = self.table.entry().to_string();
                let state = self.base.state_mut();
                state.workflow_status = WorkflowStatus::Executing;
                state.next_node_id.clone_from(&entry);
                info!(entry = %entry, "workflow started");
                format!("workflow started, first node: {entry}")
            }
            WorkflowStatus::Executing => self.decide_executing(),
            other => format!("workflow already {other}, no decision taken"),
        };
        self.base.envelope(content)
    }

    fn decide_executing(&mut self) -> String {
        let current = self.base.state().current_node_id.clone();
        let decision = self.table.decide(&current, self.base.state());
        let state = self.base.state_mut();
        match decision {
            Some(Decision::NextNode(next)) => {
                debug!(from = %current, to = %next, "dispatching next node");
                let content = format!("dispatching next node: {next}");
                state.next_node_id = next;
                content
            }
            Some(Decision::Finished) => {
                state.workflow_status = WorkflowStatus::Finished;
                info!(from = %current, "workflow finished");
                "workflow finished".to_string()
            }
            Some(Decision::Terminated) => {
                state.workflow_status = WorkflowStatus::Terminated;
                warn!(
                    from = %current,
                    bug_fix_iteration = state.bug_fix_iteration,
                    max_bug_fix_iteration = state.max_bug_fix_iteration,
                    "workflow terminated, manual intervention required"
                );
                "workflow terminated, manual intervention required".to_string()
            }
            None => {
                warn!(from = %current, "no transition applies");
                state.next_node_id.clear();
                format!("no transition from '{current}', no next node")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Verdict;
    use crate::test_support::node;

    fn decide(state: &mut ProcessState) -> Envelope {
        let master = node("master");
        let table = TransitionTable::pipeline();
        MasterExecutor::new(&master, state, &table).decide()
    }

    fn executing_at(current: &str) -> ProcessState {
        ProcessState {
            workflow_status: WorkflowStatus::Executing,
            current_node_id: current.to_string(),
            ..ProcessState::default()
        }
    }

    #[test]
    fn ready_starts_and_dispatches_entry() {
        let mut state = ProcessState::default();
        let envelope = decide(&mut state);
        assert_eq!(state.workflow_status, WorkflowStatus::Executing);
        assert_eq!(state.next_node_id, "requirements-analysis");
        assert_eq!(envelope.node_id, "master");
        assert!(envelope.content.contains("requirements-analysis"));
    }

    #[test]
    fn review_failure_routes_back_to_implementation() {
        let mut state = executing_at("code-review");
        state.code_review_result = Verdict::Fail;
        decide(&mut state);
        assert_eq!(state.next_node_id, "code-implementation");
        assert_eq!(state.workflow_status, WorkflowStatus::Executing);
    }

    #[test]
    fn merge_finishes() {
        let mut state = executing_at("manual-merge");
        let envelope = decide(&mut state);
        assert_eq!(state.workflow_status, WorkflowStatus::Finished);
        assert_eq!(envelope.content, "workflow finished");
    }

    #[test]
    fn exhausted_budget_terminates_even_with_bugs() {
        let mut state = executing_at("bug-fix");
        state.bug_fix_iteration = 3;
        state.has_remaining_bugs = true;
        decide(&mut state);
        assert_eq!(state.workflow_status, WorkflowStatus::Terminated);
    }

    #[test]
    fn unknown_current_node_clears_next() {
        let mut state = executing_at("somewhere-else");
        state.next_node_id = "somewhere-else".to_string();
        let envelope = decide(&mut state);
        assert_eq!(state.next_node_id, "");
        assert_eq!(state.workflow_status, WorkflowStatus::Executing);
        assert!(envelope.content.contains("no next node"));
    }

    #[test]
    fn deciding_twice_is_idempotent() {
        let mut state = executing_at("unit-test");
        state.unit_test_pass_rate = 95;
        decide(&mut state);
        let first = state.clone();
        decide(&mut state);
        assert_eq!(state, first);
        assert_eq!(state.next_node_id, "integration-test");
    }

    #[test]
    fn terminal_status_is_left_alone() {
        let mut state = executing_at("manual-merge");
        state.workflow_status = WorkflowStatus::Terminated;
        let before = state.clone();
        let envelope = decide(&mut state);
        assert_eq!(state, before);
        assert!(envelope.content.contains("already terminated"));
    }
}
