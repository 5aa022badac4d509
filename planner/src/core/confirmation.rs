//! Confirmation gate: which steps need human sign-off, and the resulting status.
//!
//! Always derived from the canonical step list. The oracle's advisory
//! `user_confirmations_required` count is never consulted.

use serde::{Deserialize, Serialize};

use crate::core::types::{ExecutionPlan, PlanStatus, PlanStep, PlanningResult};
use crate::core::validate::UnknownToolWarning;

/// What planning does when a step names a tool missing from the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownToolPolicy {
    /// Log a warning; the step fails with `ToolNotFound` if it is reached.
    #[default]
    Warn,
    /// Report the plan as `blocked`.
    Block,
}

/// Steps with `requires_user_confirmation == true`, in plan order.
pub fn confirmations_needed(plan: &ExecutionPlan) -> Vec<PlanStep> {
    plan.steps
        .iter()
        .filter(|step| step.requires_user_confirmation)
        .cloned()
        .collect()
}

impl PlanningResult {
    /// Gate a validated plan, ignoring unknown tools.
    pub fn from_plan(plan: ExecutionPlan) -> Self {
        Self::gate(plan, UnknownToolPolicy::Warn, &[])
    }

    /// Gate a validated plan under the given unknown-tool policy.
    pub fn gate(
        plan: ExecutionPlan,
        policy: UnknownToolPolicy,
        unknown_tools: &[UnknownToolWarning],
    ) -> Self {
        let confirmations_needed = confirmations_needed(&plan);
        let status = if policy == UnknownToolPolicy::Block && !unknown_tools.is_empty() {
            PlanStatus::Blocked
        } else if confirmations_needed.is_empty() {
            PlanStatus::Ready
        } else {
            PlanStatus::RequiresConfirmation
        };
        Self {
            plan,
            status,
            confirmations_needed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan_of, step};

    #[test]
    fn no_confirmations_is_ready() {
        let result = PlanningResult::from_plan(plan_of(vec![step("a", "t"), step("b", "t")]));
        assert_eq!(result.status, PlanStatus::Ready);
        assert!(result.confirmations_needed.is_empty());
    }

    #[test]
    fn confirmation_set_ignores_advisory_count() {
        let mut gated = step("b", "t");
        gated.requires_user_confirmation = true;
        let mut plan = plan_of(vec![step("a", "t"), gated.clone(), step("c", "t")]);
        plan.user_confirmations_required = 7;

        let result = PlanningResult::from_plan(plan);
        assert_eq!(result.status, PlanStatus::RequiresConfirmation);
        assert_eq!(result.confirmations_needed, vec![gated]);
    }

    #[test]
    fn advisory_count_alone_does_not_require_confirmation() {
        let mut plan = plan_of(vec![step("a", "t")]);
        plan.user_confirmations_required = 2;
        assert_eq!(PlanningResult::from_plan(plan).status, PlanStatus::Ready);
    }

    #[test]
    fn block_policy_blocks_on_unknown_tools() {
        let mut gated = step("a", "missing");
        gated.requires_user_confirmation = true;
        let plan = plan_of(vec![gated]);
        let warnings = vec![UnknownToolWarning {
            position: 1,
            step_id: "a".to_string(),
            tool: "missing".to_string(),
        }];

        let blocked = PlanningResult::gate(plan.clone(), UnknownToolPolicy::Block, &warnings);
        assert_eq!(blocked.status, PlanStatus::Blocked);
        assert_eq!(blocked.confirmations_needed.len(), 1);

        let warned = PlanningResult::gate(plan, UnknownToolPolicy::Warn, &warnings);
        assert_eq!(warned.status, PlanStatus::RequiresConfirmation);
    }
}
