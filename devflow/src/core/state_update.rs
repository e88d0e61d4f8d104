//! Stage-owned state transitions for [`ProcessState`].
//!
//! Sub stages never write `ProcessState` fields directly. They describe what
//! changed as a [`StateUpdate`] and this module applies it, enforcing the
//! range and monotonicity rules of the record.

use crate::core::state::ProcessState;
use crate::core::types::Verdict;

/// Field updates produced by one stage execution. `None` leaves a field as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub code_review_result: Option<Verdict>,
    pub unit_test_pass_rate: Option<u32>,
    pub integration_test_result: Option<Verdict>,
    pub system_test_result: Option<Verdict>,
    pub has_remaining_bugs: Option<bool>,
    pub bug_fix_iteration: Option<u32>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        *self == StateUpdate::default()
    }
}

/// Names of the fields an update actually changed, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdateSummary {
    pub changed: Vec<&'static str>,
}

/// Apply `update` to `state`.
///
/// Rejects the whole update (leaving `state` untouched) when the pass rate is
/// above 100 or the bug-fix iteration would move backwards.
pub fn apply_state_update(
    state: &mut ProcessState,
    update: &StateUpdate,
) -> Result<StateUpdateSummary, String> {
    if let Some(rate) = update.unit_test_pass_rate
        && rate > 100
    {
        return Err(format!("unit_test_pass_rate {rate} is above 100"));
    }
    if let Some(iteration) = update.bug_fix_iteration
        && iteration < state.bug_fix_iteration
    {
        return Err(format!(
            "bug_fix_iteration cannot decrease ({} -> {})",
            state.bug_fix_iteration, iteration
        ));
    }

    let mut summary = StateUpdateSummary::default();
    if let Some(verdict) = update.code_review_result {
        set_field(&mut state.code_review_result, verdict, "code_review_result", &mut summary);
    }
    if let Some(rate) = update.unit_test_pass_rate {
        set_field(&mut state.unit_test_pass_rate, rate, "unit_test_pass_rate", &mut summary);
    }
    if let Some(verdict) = update.integration_test_result {
        set_field(
            &mut state.integration_test_result,
            verdict,
            "integration_test_result",
            &mut summary,
        );
    }
    if let Some(verdict) = update.system_test_result {
        set_field(&mut state.system_test_result, verdict, "system_test_result", &mut summary);
    }
    if let Some(bugs) = update.has_remaining_bugs {
        set_field(&mut state.has_remaining_bugs, bugs, "has_remaining_bugs", &mut summary);
    }
    if let Some(iteration) = update.bug_fix_iteration {
        set_field(&mut state.bug_fix_iteration, iteration, "bug_fix_iteration", &mut summary);
    }
    Ok(summary)
}

fn set_field<T: PartialEq>(
    slot: &mut T,
    value: T,
    name: &'static str,
    summary: &mut StateUpdateSummary,
) {
    if *slot != value {
        *slot = value;
        summary.changed.push(name);
    }
}
