//! Ordered decision table for the master node.
//!
//! Each row is `(from node, guard, decision)`. For a given `current_node_id`
//! the rows for that node are evaluated in order and the first guard that holds
//! wins. Every node the pipeline table knows about ends with an
//! [`Guard::Always`] row, so the table is total over those nodes.

use std::collections::BTreeSet;
use std::fmt;

use crate::core::stages::Stage;
use crate::core::state::ProcessState;
use crate::core::types::{Decision, Verdict};
use crate::graph::Graph;

/// Minimum unit test pass rate (inclusive) required to leave the unit-test stage.
pub const UNIT_TEST_PASS_THRESHOLD: u32 = 95;

/// Predicate over [`ProcessState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Always,
    ReviewIs(Verdict),
    UnitPassRateAtLeast(u32),
    IntegrationIs(Verdict),
    /// System tests passed and no bugs remain.
    SystemClean,
    /// `bug_fix_iteration >= max_bug_fix_iteration`.
    BugFixBudgetExhausted,
    BugsRemaining,
}

impl Guard {
    pub fn holds(&self, state: &ProcessState) -> bool {
        match self {
            Guard::Always => true,
            Guard::ReviewIs(verdict) => state.code_review_result == *verdict,
            Guard::UnitPassRateAtLeast(threshold) => state.unit_test_pass_rate >= *threshold,
            Guard::IntegrationIs(verdict) => state.integration_test_result == *verdict,
            Guard::SystemClean => {
                state.system_test_result == Verdict::Pass && !state.has_remaining_bugs
            }
            Guard::BugFixBudgetExhausted => state.bug_fix_budget_exhausted(),
            Guard::BugsRemaining => state.has_remaining_bugs,
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Always => f.write_str("always"),
            Guard::ReviewIs(verdict) => write!(f, "code_review_result == {verdict}"),
            Guard::UnitPassRateAtLeast(threshold) => {
                write!(f, "unit_test_pass_rate >= {threshold}")
            }
            Guard::IntegrationIs(verdict) => write!(f, "integration_test_result == {verdict}"),
            Guard::SystemClean => f.write_str("system_test_result == pass && !has_remaining_bugs"),
            Guard::BugFixBudgetExhausted => {
                f.write_str("bug_fix_iteration >= max_bug_fix_iteration")
            }
            Guard::BugsRemaining => f.write_str("has_remaining_bugs"),
        }
    }
}

/// One row of the decision table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: String,
    pub guard: Guard,
    pub decision: Decision,
}

impl Transition {
    pub fn new(from: impl Into<String>, guard: Guard, decision: Decision) -> Self {
        Self {
            from: from.into(),
            guard,
            decision,
        }
    }
}

/// Entry node plus ordered transition rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    entry: String,
    rows: Vec<Transition>,
}

impl TransitionTable {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Rows for the same node are evaluated in insertion order.
    pub fn push(&mut self, transition: Transition) -> &mut Self {
        self.rows.push(transition);
        self
    }

    /// The development pipeline: requirements through merge, with the review,
    /// test and bounded bug-fix cycles.
    pub fn pipeline() -> Self {
        use Stage::{
            ArchitectureDesign, BugFix, CodeImplementation, CodeReview, IntegrationTest,
            ManualMerge, ProductDesign, RequirementsAnalysis, SystemTest, TaskBreakdown, UnitTest,
        };

        let next = |stage: Stage| Decision::NextNode(stage.id().to_string());
        let mut table = TransitionTable::new(RequirementsAnalysis.id());
        let rows = [
            (RequirementsAnalysis, Guard::Always, next(ProductDesign)),
            (ProductDesign, Guard::Always, next(ArchitectureDesign)),
            (ArchitectureDesign, Guard::Always, next(TaskBreakdown)),
            (TaskBreakdown, Guard::Always, next(CodeImplementation)),
            (CodeImplementation, Guard::Always, next(CodeReview)),
            (CodeReview, Guard::ReviewIs(Verdict::Pass), next(UnitTest)),
            (CodeReview, Guard::Always, next(CodeImplementation)),
            (
                UnitTest,
                Guard::UnitPassRateAtLeast(UNIT_TEST_PASS_THRESHOLD),
                next(IntegrationTest),
            ),
            (UnitTest, Guard::Always, next(CodeImplementation)),
            (IntegrationTest, Guard::IntegrationIs(Verdict::Pass), next(SystemTest)),
            (IntegrationTest, Guard::Always, next(CodeImplementation)),
            (SystemTest, Guard::SystemClean, next(ManualMerge)),
            (SystemTest, Guard::Always, next(BugFix)),
            // The budget check comes first so escalation beats another retry.
            (BugFix, Guard::BugFixBudgetExhausted, Decision::Terminated),
            (BugFix, Guard::BugsRemaining, next(SystemTest)),
            (BugFix, Guard::Always, next(ManualMerge)),
            (ManualMerge, Guard::Always, Decision::Finished),
        ];
        for (from, guard, decision) in rows {
            table.push(Transition::new(from.id(), guard, decision));
        }
        table
    }

    /// First node dispatched when a run leaves `ready`.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Rows that apply to `from`, in evaluation order.
    pub fn rows_for<'a>(&'a self, from: &'a str) -> impl Iterator<Item = &'a Transition> + 'a {
        self.rows.iter().filter(move |row| row.from == from)
    }

    /// Evaluate the rows for `current` against `state`; first match wins.
    ///
    /// Returns `None` when no row applies (unknown node or no guard holds).
    pub fn decide(&self, current: &str, state: &ProcessState) -> Option<Decision> {
        self.rows_for(current)
            .find(|row| row.guard.holds(state))
            .map(|row| row.decision.clone())
    }

    /// Distinct `from` ids, in first-appearance order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.rows
            .iter()
            .filter(|row| seen.insert(row.from.as_str()))
            .map(|row| row.from.as_str())
            .collect()
    }

    /// Nodes whose last row is not [`Guard::Always`], i.e. where a decision can
    /// fall through to nothing.
    pub fn partial_sources(&self) -> Vec<&str> {
        self.sources()
            .into_iter()
            .filter(|from| {
                self.rows_for(from)
                    .last()
                    .is_none_or(|row| row.guard != Guard::Always)
            })
            .collect()
    }

    /// Ids referenced by the table (entry, sources, targets) that `graph` does
    /// not declare, sorted and deduplicated.
    pub fn unknown_targets(&self, graph: &Graph) -> Vec<String> {
        let mut referenced: BTreeSet<&str> = BTreeSet::new();
        referenced.insert(self.entry.as_str());
        for row in &self.rows {
            referenced.insert(row.from.as_str());
            if let Decision::NextNode(id) = &row.decision {
                referenced.insert(id.as_str());
            }
        }
        referenced
            .into_iter()
            .filter(|id| graph.get(id).is_none())
            .map(str::to_string)
            .collect()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        TransitionTable::pipeline()
    }
}
