//! The single mutable record shared by every executor during a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{Verdict, WorkflowStatus};

/// Default cap on bug-fix iterations before the run escalates.
pub const DEFAULT_MAX_BUG_FIX_ITERATION: u32 = 3;

/// Default envelope format.
pub const DEFAULT_OUTPUT_FORMAT: &str = "markdown";

/// Pipeline progress and review/test outcomes.
///
/// Seeded from `global.process_control` of the workflow document. Key names
/// used by older documents are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessState {
    #[serde(alias = "current_exec_node")]
    pub current_node_id: String,
    #[serde(alias = "next_exec_node")]
    pub next_node_id: String,
    pub workflow_status: WorkflowStatus,
    pub code_review_result: Verdict,
    /// Percentage in `0..=100`.
    #[serde(alias = "unit_test_actual_pass_rate")]
    pub unit_test_pass_rate: u32,
    pub integration_test_result: Verdict,
    pub system_test_result: Verdict,
    pub has_remaining_bugs: bool,
    /// Non-decreasing within a run.
    #[serde(alias = "current_bug_fix_iteration")]
    pub bug_fix_iteration: u32,
    pub max_bug_fix_iteration: u32,
    /// Comes from `global.rpc_config`, never from `process_control`.
    #[serde(skip_deserializing)]
    pub rpc: RpcConfig,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self {
            current_node_id: String::new(),
            next_node_id: String::new(),
            workflow_status: WorkflowStatus::Ready,
            code_review_result: Verdict::Pending,
            unit_test_pass_rate: 0,
            integration_test_result: Verdict::Pending,
            system_test_result: Verdict::Pending,
            has_remaining_bugs: false,
            bug_fix_iteration: 0,
            max_bug_fix_iteration: DEFAULT_MAX_BUG_FIX_ITERATION,
            rpc: RpcConfig::default(),
        }
    }
}

impl ProcessState {
    pub fn with_rpc(mut self, rpc: RpcConfig) -> Self {
        self.rpc = rpc;
        self
    }

    pub fn output_format(&self) -> &str {
        &self.rpc.output_format
    }

    /// True once the bug-fix cycle has used its whole budget.
    pub fn bug_fix_budget_exhausted(&self) -> bool {
        self.bug_fix_iteration >= self.max_bug_fix_iteration
    }
}

/// Static response settings (`global.rpc_config`).
///
/// Keys other than the output format are kept verbatim for re-serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    #[serde(alias = "rpc_data_format")]
    pub output_format: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            extra: BTreeMap::new(),
        }
    }
}
