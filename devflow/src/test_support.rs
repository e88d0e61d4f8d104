//! Test-only helpers: fixture builders, a scripted oracle and scripted backends.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::stages::Stage;
use crate::core::state::ProcessState;
use crate::core::types::Verdict;
use crate::error::WorkflowError;
use crate::graph::{Category, Condition, Connections, Graph, Meta, Node, WorkflowDefinition};
use crate::io::backend::GenerationBackend;
use crate::io::oracle::{Oracle, SystemTestReport};

/// Id of the master node in the pipeline fixtures.
pub const MASTER_ID: &str = "master";

/// Meta block naming `master_node_id`.
pub fn meta(master_node_id: &str) -> Meta {
    Meta {
        workflow_name: "test-pipeline".to_string(),
        master_node_id: master_node_id.to_string(),
        extra: BTreeMap::new(),
    }
}

/// Automatic node with no bindings or edges.
pub fn node(id: &str) -> Node {
    Node {
        node_id: id.to_string(),
        name: String::new(),
        description: String::new(),
        category: Category::Automatic,
        inputs: Vec::new(),
        outputs: Vec::new(),
        connections: Connections::default(),
        instruction_text: format!("You execute {id}."),
    }
}

/// Master plus every pipeline stage, in pipeline order, with the edges the
/// pipeline decision table follows.
pub fn pipeline_nodes() -> Vec<Node> {
    let mut nodes = vec![node(MASTER_ID)];
    nodes.extend(Stage::ALL.into_iter().map(|stage| node(stage.id())));

    let branch = |when: &str, next: Stage| Condition {
        when: when.to_string(),
        next_node: vec![next.id().to_string()],
    };
    for node in &mut nodes {
        let Some(stage) = Stage::from_node_id(&node.node_id) else {
            continue;
        };
        node.name = stage.id().replace('-', " ");
        let (conditions, successors) = match stage {
            Stage::RequirementsAnalysis => (vec![], vec![Stage::ProductDesign]),
            Stage::ProductDesign => (vec![], vec![Stage::ArchitectureDesign]),
            Stage::ArchitectureDesign => (vec![], vec![Stage::TaskBreakdown]),
            Stage::TaskBreakdown => (vec![], vec![Stage::CodeImplementation]),
            Stage::CodeImplementation => (vec![], vec![Stage::CodeReview]),
            Stage::CodeReview => (
                vec![
                    branch("code_review_result == 'pass'", Stage::UnitTest),
                    branch("code_review_result != 'pass'", Stage::CodeImplementation),
                ],
                vec![],
            ),
            Stage::UnitTest => (
                vec![
                    branch("unit_test_pass_rate >= 95", Stage::IntegrationTest),
                    branch("unit_test_pass_rate < 95", Stage::CodeImplementation),
                ],
                vec![],
            ),
            Stage::IntegrationTest => (
                vec![
                    branch("integration_test_result == 'pass'", Stage::SystemTest),
                    branch("integration_test_result != 'pass'", Stage::CodeImplementation),
                ],
                vec![],
            ),
            Stage::SystemTest => (
                vec![
                    branch(
                        "system_test_result == 'pass' and not has_remaining_bugs",
                        Stage::ManualMerge,
                    ),
                    branch("otherwise", Stage::BugFix),
                ],
                vec![],
            ),
            Stage::BugFix => (
                vec![
                    branch("has_remaining_bugs", Stage::SystemTest),
                    branch("not has_remaining_bugs", Stage::ManualMerge),
                ],
                vec![],
            ),
            Stage::ManualMerge => {
                node.category = Category::Manual;
                (vec![], vec![])
            }
        };
        node.connections = Connections {
            conditions,
            successors: successors.into_iter().map(|s| s.id().to_string()).collect(),
        };
    }
    nodes
}

pub fn pipeline_graph() -> Graph {
    match Graph::new(meta(MASTER_ID), pipeline_nodes()) {
        Ok(graph) => graph,
        Err(err) => panic!("pipeline fixture is invalid: {err}"),
    }
}

/// Pipeline document starting from a `ready` state.
pub fn pipeline_definition() -> WorkflowDefinition {
    WorkflowDefinition {
        meta: meta(MASTER_ID),
        initial_state: ProcessState::default(),
        nodes: pipeline_nodes(),
    }
}

/// Temporary directory holding one workflow document; removed on drop.
pub struct WorkflowFixture {
    dir: tempfile::TempDir,
}

impl WorkflowFixture {
    pub const FILE_NAME: &'static str = "workflow.yaml";

    pub fn new(contents: &str) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(Self::FILE_NAME), contents)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn workflow_path(&self) -> PathBuf {
        self.dir.path().join(Self::FILE_NAME)
    }
}

/// Oracle that replays queued outcomes.
///
/// Each draw pops the front of its queue; an empty queue falls back to the
/// configured default (passing, unless built with [`ScriptedOracle::always_buggy`]).
#[derive(Debug, Clone)]
pub struct ScriptedOracle {
    reviews: VecDeque<Verdict>,
    pass_rates: VecDeque<u32>,
    integrations: VecDeque<Verdict>,
    system_tests: VecDeque<SystemTestReport>,
    fixes: VecDeque<bool>,
    default_system_test: SystemTestReport,
    default_fix_leaves_bugs: bool,
    fix_iterations: Vec<u32>,
}

impl ScriptedOracle {
    /// Every draw passes: review/integration/system pass, rate 100, no bugs.
    pub fn all_pass() -> Self {
        Self {
            reviews: VecDeque::new(),
            pass_rates: VecDeque::new(),
            integrations: VecDeque::new(),
            system_tests: VecDeque::new(),
            fixes: VecDeque::new(),
            default_system_test: SystemTestReport {
                verdict: Verdict::Pass,
                bugs_remaining: false,
            },
            default_fix_leaves_bugs: false,
            fix_iterations: Vec::new(),
        }
    }

    /// Development passes, but system tests always find bugs and fixes never
    /// resolve them.
    pub fn always_buggy() -> Self {
        Self {
            default_system_test: SystemTestReport {
                verdict: Verdict::Fail,
                bugs_remaining: true,
            },
            default_fix_leaves_bugs: true,
            ..Self::all_pass()
        }
    }

    pub fn with_reviews(mut self, verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        self.reviews.extend(verdicts);
        self
    }

    pub fn with_pass_rates(mut self, rates: impl IntoIterator<Item = u32>) -> Self {
        self.pass_rates.extend(rates);
        self
    }

    pub fn with_integrations(mut self, verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        self.integrations.extend(verdicts);
        self
    }

    pub fn with_system_tests(
        mut self,
        reports: impl IntoIterator<Item = SystemTestReport>,
    ) -> Self {
        self.system_tests.extend(reports);
        self
    }

    /// Queue bugs-remaining flags returned by successive bug-fix draws.
    pub fn with_fixes(mut self, bugs_remaining: impl IntoIterator<Item = bool>) -> Self {
        self.fixes.extend(bugs_remaining);
        self
    }

    /// Iterations passed to `bugs_remaining_after_fix`, in call order.
    pub fn fix_iterations_seen(&self) -> &[u32] {
        &self.fix_iterations
    }
}

impl Oracle for ScriptedOracle {
    fn review_verdict(&mut self) -> Verdict {
        self.reviews.pop_front().unwrap_or(Verdict::Pass)
    }

    fn unit_test_pass_rate(&mut self) -> u32 {
        self.pass_rates.pop_front().unwrap_or(100)
    }

    fn integration_verdict(&mut self) -> Verdict {
        self.integrations.pop_front().unwrap_or(Verdict::Pass)
    }

    fn system_test(&mut self) -> SystemTestReport {
        self.system_tests
            .pop_front()
            .unwrap_or(self.default_system_test)
    }

    fn bugs_remaining_after_fix(&mut self, iteration: u32) -> bool {
        self.fix_iterations.push(iteration);
        self.fixes
            .pop_front()
            .unwrap_or(self.default_fix_leaves_bugs)
    }
}

/// Backend whose every call fails with `message`.
#[derive(Debug, Clone)]
pub struct FailingBackend {
    message: String,
}

impl FailingBackend {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl GenerationBackend for FailingBackend {
    fn generate(&self, _: &str, _: &str, _: &str) -> Result<String, WorkflowError> {
        Err(WorkflowError::BackendFailure(self.message.clone()))
    }
}

/// Backend that records every call and echoes the node id.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: RefCell<Vec<BackendCall>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub text: String,
    pub system_prompt: String,
    pub context_id: String,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.borrow().clone()
    }
}

impl GenerationBackend for RecordingBackend {
    fn generate(
        &self,
        text: &str,
        system_prompt: &str,
        context_id: &str,
    ) -> Result<String, WorkflowError> {
        self.calls.borrow_mut().push(BackendCall {
            text: text.to_string(),
            system_prompt: system_prompt.to_string(),
            context_id: context_id.to_string(),
        });
        Ok(format!("output of {context_id}"))
    }
}
