//! Canonical pipeline stages and their node ids.

use std::fmt;

/// A pipeline stage the sub executor knows how to perform.
///
/// Nodes whose id is not a canonical stage id still run, but only produce
/// narrative output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    RequirementsAnalysis,
    ProductDesign,
    ArchitectureDesign,
    TaskBreakdown,
    CodeImplementation,
    CodeReview,
    UnitTest,
    IntegrationTest,
    SystemTest,
    BugFix,
    ManualMerge,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 11] = [
        Stage::RequirementsAnalysis,
        Stage::ProductDesign,
        Stage::ArchitectureDesign,
        Stage::TaskBreakdown,
        Stage::CodeImplementation,
        Stage::CodeReview,
        Stage::UnitTest,
        Stage::IntegrationTest,
        Stage::SystemTest,
        Stage::BugFix,
        Stage::ManualMerge,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Stage::RequirementsAnalysis => "requirements-analysis",
            Stage::ProductDesign => "product-design",
            Stage::ArchitectureDesign => "architecture-design",
            Stage::TaskBreakdown => "task-breakdown",
            Stage::CodeImplementation => "code-implementation",
            Stage::CodeReview => "code-review",
            Stage::UnitTest => "unit-test",
            Stage::IntegrationTest => "integration-test",
            Stage::SystemTest => "system-test",
            Stage::BugFix => "bug-fix",
            Stage::ManualMerge => "manual-merge",
        }
    }

    pub fn from_node_id(node_id: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.id() == node_id)
    }

    /// One-line result for stages that only produce narrative output.
    pub fn narrative(self) -> &'static str {
        match self {
            Stage::RequirementsAnalysis => "requirements analysis complete, standardized PRD produced",
            Stage::ProductDesign => "product design complete, prototype and business flows produced",
            Stage::ArchitectureDesign => "architecture design complete, technical architecture produced",
            Stage::TaskBreakdown => "task breakdown complete, development task list produced",
            Stage::CodeImplementation => "code implementation complete, module code produced",
            Stage::CodeReview => "code review complete",
            Stage::UnitTest => "unit tests complete",
            Stage::IntegrationTest => "integration tests complete",
            Stage::SystemTest => "system tests complete",
            Stage::BugFix => "bug fix complete",
            Stage::ManualMerge => "merge complete, code merged into the main branch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
