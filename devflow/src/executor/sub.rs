use tracing::{debug, info, warn};

use crate::core::stages::Stage;
use crate::core::state::ProcessState;
use crate::core::state_update::{StateUpdate, apply_state_update};
use crate::executor::{Envelope, NodeExecutor};
use crate::graph::Node;
use crate::io::backend::GenerationBackend;
use crate::io::oracle::Oracle;
use crate::io::prompt::{PromptBuilder, fallback_prompt};

/// Performs the work of one pipeline stage.
pub struct SubExecutor<'a> {
    base: NodeExecutor<'a>,
    backend: &'a dyn GenerationBackend,
    oracle: &'a mut dyn Oracle,
    prompts: &'a PromptBuilder,
}

impl<'a> SubExecutor<'a> {
    pub fn new(
        node: &'a Node,
        state: &'a mut ProcessState,
        backend: &'a dyn GenerationBackend,
        oracle: &'a mut dyn Oracle,
        prompts: &'a PromptBuilder,
    ) -> Self {
        Self {
            base: NodeExecutor::new(node, state),
            backend,
            oracle,
            prompts,
        }
    }

    /// Generate the stage's text, draw its outcomes, write them to the process
    /// state and return the envelope.
    ///
    /// The envelope content is a one-line summary of the outcome followed by
    /// the generated text.
    pub fn run(mut self) -> Envelope {
        let node = self.base.node();
        if node.is_manual() {
            info!(node_id = %node.node_id, "running manual stage");
        }

        let prompt = match self.prompts.render(node, self.base.state()) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(node_id = %node.node_id, err = %err, "stage prompt failed to render");
                fallback_prompt(node)
            }
        };
        let generated = self.base.generate(self.backend, &prompt);

        let stage = Stage::from_node_id(&node.node_id);
        let (update, mut summary) = draw_outcome(stage, node, self.base.state(), self.oracle);
        match apply_state_update(self.base.state_mut(), &update) {
            Ok(applied) => {
                debug!(node_id = %node.node_id, changed = ?applied.changed, "stage applied");
            }
            Err(reason) => {
                warn!(node_id = %node.node_id, reason = %reason, "stage update rejected");
                summary = format!("{summary} (state update rejected: {reason})");
            }
        }

        let generated = generated.trim();
        let content = if generated.is_empty() {
            summary
        } else {
            format!("{summary}\n\n{generated}")
        };
        self.base.envelope(content)
    }
}

/// Draw the outcomes of `stage` and describe them.
///
/// Stages without a branching effect, and nodes that are not pipeline
/// stages, produce an empty update.
fn draw_outcome(
    stage: Option<Stage>,
    node: &Node,
    state: &ProcessState,
    oracle: &mut dyn Oracle,
) -> (StateUpdate, String) {
    let Some(stage) = stage else {
        return (
            StateUpdate::default(),
            format!("node {} complete", node.node_id),
        );
    };
    match stage {
        Stage::CodeReview => {
            let verdict = oracle.review_verdict();
            let update = StateUpdate {
                code_review_result: Some(verdict),
                ..StateUpdate::default()
            };
            (update, format!("{}, verdict: {verdict}", stage.narrative()))
        }
        Stage::UnitTest => {
            let rate = oracle.unit_test_pass_rate();
            let update = StateUpdate {
                unit_test_pass_rate: Some(rate),
                ..StateUpdate::default()
            };
            (update, format!("{}, pass rate: {rate}%", stage.narrative()))
        }
        Stage::IntegrationTest => {
            let verdict = oracle.integration_verdict();
            let update = StateUpdate {
                integration_test_result: Some(verdict),
                ..StateUpdate::default()
            };
            (update, format!("{}, verdict: {verdict}", stage.narrative()))
        }
        Stage::SystemTest => {
            let report = oracle.system_test();
            let update = StateUpdate {
                system_test_result: Some(report.verdict),
                has_remaining_bugs: Some(report.bugs_remaining),
                ..StateUpdate::default()
            };
            let summary = format!(
                "{}, verdict: {}, remaining bugs: {}",
                stage.narrative(),
                report.verdict,
                report.bugs_remaining
            );
            (update, summary)
        }
        Stage::BugFix => {
            let iteration = state.bug_fix_iteration.saturating_add(1);
            let bugs_remaining = oracle.bugs_remaining_after_fix(iteration);
            let update = StateUpdate {
                bug_fix_iteration: Some(iteration),
                has_remaining_bugs: Some(bugs_remaining),
                ..StateUpdate::default()
            };
            let summary = format!(
                "{}, iteration: {iteration}, remaining bugs: {bugs_remaining}",
                stage.narrative()
            );
            (update, summary)
        }
        Stage::RequirementsAnalysis
        | Stage::ProductDesign
        | Stage::ArchitectureDesign
        | Stage::TaskBreakdown
        | Stage::CodeImplementation
        | Stage::ManualMerge => (StateUpdate::default(), stage.narrative().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Verdict;
    use crate::io::backend::StubBackend;
    use crate::io::oracle::SystemTestReport;
    use crate::test_support::{FailingBackend, ScriptedOracle, node};

    fn run(stage: &str, state: &mut ProcessState, oracle: &mut ScriptedOracle) -> Envelope {
        let target = node(stage);
        let backend = StubBackend::fixed("generated text");
        let prompts = PromptBuilder::new();
        SubExecutor::new(&target, state, &backend, oracle, &prompts).run()
    }

    #[test]
    fn review_writes_verdict() {
        let mut state = ProcessState::default();
        let mut oracle = ScriptedOracle::all_pass().with_reviews([Verdict::Fail]);
        let envelope = run("code-review", &mut state, &mut oracle);
        assert_eq!(state.code_review_result, Verdict::Fail);
        assert_eq!(envelope.headline(), "code review complete, verdict: fail");
        assert!(envelope.content.ends_with("generated text"));
    }

    #[test]
    fn unit_test_writes_pass_rate() {
        let mut state = ProcessState::default();
        let mut oracle = ScriptedOracle::all_pass().with_pass_rates([94]);
        run("unit-test", &mut state, &mut oracle);
        assert_eq!(state.unit_test_pass_rate, 94);
    }

    #[test]
    fn system_test_writes_verdict_and_bugs() {
        let mut state = ProcessState::default();
        let mut oracle = ScriptedOracle::all_pass().with_system_tests([SystemTestReport {
            verdict: Verdict::Fail,
            bugs_remaining: true,
        }]);
        run("system-test", &mut state, &mut oracle);
        assert_eq!(state.system_test_result, Verdict::Fail);
        assert!(state.has_remaining_bugs);
    }

    #[test]
    fn bug_fix_increments_iteration() {
        let mut state = ProcessState {
            bug_fix_iteration: 1,
            has_remaining_bugs: true,
            ..ProcessState::default()
        };
        let mut oracle = ScriptedOracle::all_pass();
        let envelope = run("bug-fix", &mut state, &mut oracle);
        assert_eq!(state.bug_fix_iteration, 2);
        assert!(!state.has_remaining_bugs);
        assert_eq!(oracle.fix_iterations_seen(), &[2]);
        assert!(envelope.headline().contains("iteration: 2"));
    }

    #[test]
    fn narrative_stage_leaves_state_alone() {
        let mut state = ProcessState::default();
        let before = state.clone();
        let mut oracle = ScriptedOracle::all_pass();
        let envelope = run("architecture-design", &mut state, &mut oracle);
        assert_eq!(state, before);
        assert_eq!(envelope.headline(), Stage::ArchitectureDesign.narrative());
    }

    #[test]
    fn non_stage_node_still_runs() {
        let mut state = ProcessState::default();
        let mut oracle = ScriptedOracle::all_pass();
        let envelope = run("security-audit", &mut state, &mut oracle);
        assert_eq!(envelope.headline(), "node security-audit complete");
    }

    #[test]
    fn out_of_range_pass_rate_is_rejected() {
        let mut state = ProcessState::default();
        let mut oracle = ScriptedOracle::all_pass().with_pass_rates([140]);
        let envelope = run("unit-test", &mut state, &mut oracle);
        assert_eq!(state.unit_test_pass_rate, 0);
        assert!(envelope.headline().contains("state update rejected"));
    }

    #[test]
    fn backend_failure_still_applies_outcome() {
        let target = node("integration-test");
        let mut state = ProcessState::default();
        let mut oracle = ScriptedOracle::all_pass();
        let backend = FailingBackend::new("model offline");
        let prompts = PromptBuilder::new();
        let envelope = SubExecutor::new(&target, &mut state, &backend, &mut oracle, &prompts).run();
        assert_eq!(state.integration_test_result, Verdict::Pass);
        assert!(envelope.content.contains("model offline"));
    }
}
