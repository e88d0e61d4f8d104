//! Driver loop: alternate master decisions and sub-node executions until the
//! run reaches a terminal status.

use std::path::Path;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::state::ProcessState;
use crate::core::transitions::TransitionTable;
use crate::core::types::WorkflowStatus;
use crate::error::WorkflowError;
use crate::executor::{Envelope, MasterExecutor, SubExecutor};
use crate::graph::{Graph, Node, WorkflowDefinition};
use crate::io::backend::GenerationBackend;
use crate::io::graph_store::load_workflow;
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptBuilder;

/// Sub-node executions allowed per run unless configured otherwise.
pub const DEFAULT_MAX_STEPS: u32 = 200;

/// Counters and final status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub status: WorkflowStatus,
    pub master_decisions: u32,
    pub sub_executions: u32,
}

/// Owns the graph, the process state and the injected capabilities for one run.
pub struct Engine<B, O> {
    graph: Graph,
    state: ProcessState,
    table: TransitionTable,
    backend: B,
    oracle: O,
    prompts: PromptBuilder,
    max_steps: u32,
}

impl<B: GenerationBackend, O: Oracle> Engine<B, O> {
    /// Build the node index and locate the master node.
    pub fn new(
        definition: WorkflowDefinition,
        backend: B,
        oracle: O,
    ) -> Result<Self, WorkflowError> {
        let WorkflowDefinition {
            meta,
            initial_state,
            nodes,
        } = definition;
        let graph = Graph::new(meta, nodes)?;
        if graph.master().is_none() {
            return Err(WorkflowError::MasterNodeMissing(graph.master_id().to_string()));
        }
        let table = TransitionTable::pipeline();
        warn_unknown_targets(&table, &graph);
        Ok(Self {
            graph,
            state: initial_state,
            table,
            backend,
            oracle,
            prompts: PromptBuilder::new(),
            max_steps: DEFAULT_MAX_STEPS,
        })
    }

    /// Load the workflow document at `path` and build an engine for it.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn from_path(path: &Path, backend: B, oracle: O) -> Result<Self, WorkflowError> {
        let definition = load_workflow(path)?;
        Self::new(definition, backend, oracle)
    }

    /// Replace the decision table.
    pub fn with_table(mut self, table: TransitionTable) -> Self {
        warn_unknown_targets(&table, &self.graph);
        self.table = table;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Node named by `current_node_id`, if it is declared.
    pub fn current_node(&self) -> Option<&Node> {
        self.graph.get(&self.state.current_node_id)
    }

    /// Node named by `next_node_id`, if it is declared.
    pub fn next_node(&self) -> Option<&Node> {
        self.graph.get(&self.state.next_node_id)
    }

    /// Run to a terminal status.
    pub fn run(&mut self) -> Result<WorkflowStatus, WorkflowError> {
        self.run_with(|_| {}).map(|outcome| outcome.status)
    }

    /// Run to a terminal status, handing every envelope to `on_envelope` as it
    /// is produced.
    ///
    /// An empty `next_node_id` ends the run as [`WorkflowStatus::Stalled`]. A
    /// next node the graph does not declare, or more than `max_steps` sub
    /// executions, is an error.
    #[instrument(skip_all, fields(workflow = %self.graph.meta().workflow_name))]
    pub fn run_with<F: FnMut(&Envelope)>(
        &mut self,
        mut on_envelope: F,
    ) -> Result<RunOutcome, WorkflowError> {
        let Self {
            graph,
            state,
            table,
            backend,
            oracle,
            prompts,
            max_steps,
        } = self;
        let master = graph
            .master()
            .ok_or_else(|| WorkflowError::MasterNodeMissing(graph.master_id().to_string()))?;

        let mut master_decisions = 0u32;
        let mut sub_executions = 0u32;

        on_envelope(&MasterExecutor::new(master, state, table).decide());
        master_decisions += 1;

        while state.workflow_status == WorkflowStatus::Executing {
            if state.next_node_id.is_empty() {
                warn!(current = %state.current_node_id, "no next node, run stalled");
                state.workflow_status = WorkflowStatus::Stalled;
                break;
            }
            state.current_node_id.clone_from(&state.next_node_id);

            if state.current_node_id != master.node_id {
                let node = graph
                    .get(&state.current_node_id)
                    .ok_or_else(|| WorkflowError::UnknownNextNode(state.current_node_id.clone()))?;
                if sub_executions >= *max_steps {
                    return Err(WorkflowError::StepLimitExceeded(*max_steps));
                }
                let envelope = SubExecutor::new(node, state, backend, oracle, prompts).run();
                sub_executions += 1;
                on_envelope(&envelope);
            }

            on_envelope(&MasterExecutor::new(master, state, table).decide());
            master_decisions += 1;
        }

        let outcome = RunOutcome {
            status: state.workflow_status,
            master_decisions,
            sub_executions,
        };
        info!(
            status = %outcome.status,
            master_decisions,
            sub_executions,
            bug_fix_iteration = state.bug_fix_iteration,
            "run complete"
        );
        Ok(outcome)
    }
}

fn warn_unknown_targets(table: &TransitionTable, graph: &Graph) {
    let unknown = table.unknown_targets(graph);
    if !unknown.is_empty() {
        warn!(unknown = ?unknown, "decision table references nodes the graph does not declare");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Verdict;
    use crate::io::backend::StubBackend;
    use crate::test_support::{ScriptedOracle, meta, node, pipeline_definition};

    fn engine(oracle: ScriptedOracle) -> Engine<StubBackend, ScriptedOracle> {
        Engine::new(pipeline_definition(), StubBackend::new(), oracle).expect("engine")
    }

    #[test]
    fn missing_master_is_rejected() {
        let definition = WorkflowDefinition {
            meta: meta("master"),
            initial_state: ProcessState::default(),
            nodes: vec![node("requirements-analysis")],
        };
        let err = Engine::new(definition, StubBackend::new(), ScriptedOracle::all_pass())
            .err()
            .expect("error");
        assert!(matches!(err, WorkflowError::MasterNodeMissing(id) if id == "master"));
    }

    #[test]
    fn happy_path_counts() {
        let mut engine = engine(ScriptedOracle::all_pass());
        let outcome = engine.run_with(|_| {}).expect("run");
        assert_eq!(outcome.status, WorkflowStatus::Finished);
        assert_eq!(outcome.master_decisions, 11);
        assert_eq!(outcome.sub_executions, 10);
        assert_eq!(engine.state().current_node_id, "manual-merge");
    }

    #[test]
    fn review_retry_loops_through_implementation() {
        let oracle = ScriptedOracle::all_pass().with_reviews([Verdict::Fail, Verdict::Pass]);
        let mut seen = Vec::new();
        let outcome = engine(oracle)
            .run_with(|envelope| seen.push(envelope.node_id.clone()))
            .expect("run");
        assert_eq!(outcome.status, WorkflowStatus::Finished);
        assert_eq!(outcome.sub_executions, 12);
        let implementations = seen.iter().filter(|id| *id == "code-implementation").count();
        assert_eq!(implementations, 2);
    }

    #[test]
    fn step_limit_stops_endless_review_loop() {
        let oracle = ScriptedOracle::all_pass().with_reviews(vec![Verdict::Fail; 1000]);
        let err = engine(oracle).with_max_steps(25).run().unwrap_err();
        assert!(matches!(err, WorkflowError::StepLimitExceeded(25)));
    }

    #[test]
    fn accessors_follow_the_run() {
        let mut engine = engine(ScriptedOracle::all_pass());
        assert!(engine.current_node().is_none());
        assert!(engine.next_node().is_none());
        engine.run().expect("run");
        assert_eq!(
            engine.current_node().map(|n| n.node_id.as_str()),
            Some("manual-merge")
        );
        assert_eq!(engine.graph().len(), 12);
    }
}
