//! Built-in Node Pack (spec §6): the concrete `NodeHandler` implementations
//! shipped with the engine — triggers, conditions, flow control, loops,
//! actions, meeting, and notify categories.

pub mod action;
pub mod conditions;
pub mod flow;
pub mod loops;
pub mod meeting;
pub mod notify;
pub mod slots;
pub mod triggers;

use fleet_action::NodeRegistry;
use fleet_core::NodeTypeId;
use slots::SlotRegistry;
use std::sync::Arc;

fn ty(s: &str) -> NodeTypeId {
    NodeTypeId::new(s).unwrap_or_else(|e| panic!("built-in node type `{s}` must be a valid NodeTypeId: {e}"))
}

/// Registers every built-in handler (spec §6's node category table) into
/// `registry`. Call once at startup, before the first run, per spec §9
/// "Global mutable state".
pub fn register_all(registry: &NodeRegistry) {
    let slots = SlotRegistry::default();

    registry.register(ty("trigger.manual"), Arc::new(triggers::ManualTrigger));
    registry.register(ty("trigger.schedule"), Arc::new(triggers::ScheduleTrigger));
    registry.register(ty("trigger.scheduled_once"), Arc::new(triggers::ScheduledOnceTrigger));
    registry.register(ty("trigger.event"), Arc::new(triggers::event_trigger()));
    registry.register(ty("trigger.pr_event"), Arc::new(triggers::pr_event_trigger()));
    registry.register(ty("trigger.task_assigned"), Arc::new(triggers::task_assigned_trigger()));
    registry.register(ty("trigger.task_available"), Arc::new(triggers::TaskAvailableTrigger));
    registry.register(ty("trigger.anomaly"), Arc::new(triggers::AnomalyTrigger));
    registry.register(ty("trigger.webhook"), Arc::new(triggers::webhook_trigger()));
    registry.register(ty("meeting.wake_phrase"), Arc::new(triggers::WakePhraseTrigger));

    registry.register(ty("condition.expression"), Arc::new(conditions::ExpressionCondition));
    registry.register(ty("condition.switch"), Arc::new(conditions::SwitchCondition));
    registry.register(ty("condition.slot_available"), Arc::new(conditions::SlotAvailableCondition::new(slots.clone())));

    registry.register(ty("flow.gate"), Arc::new(flow::GateNode));

    registry.register(ty("loop.for_each"), Arc::new(loops::ForEachNode));

    registry.register(ty("action.run_agent"), Arc::new(action::agent::RunAgentAction));
    registry.register(ty("action.run_planner"), Arc::new(action::agent::RunPlannerAction));
    registry.register(ty("action.run_command"), Arc::new(action::agent::RunCommandAction));
    registry.register(ty("action.build_task_prompt"), Arc::new(action::agent::BuildTaskPromptAction));
    registry.register(ty("action.resolve_executor"), Arc::new(action::agent::ResolveExecutorAction));
    registry.register(ty("action.handle_rate_limit"), Arc::new(action::agent::HandleRateLimitAction));

    registry.register(ty("action.create_pr"), Arc::new(action::git::CreatePrAction));
    registry.register(ty("action.git_operations"), Arc::new(action::git::GitOperationsAction));
    registry.register(ty("action.push_branch"), Arc::new(action::git::PushBranchAction));
    registry.register(ty("action.detect_new_commits"), Arc::new(action::git::DetectNewCommitsAction));
    registry.register(ty("action.acquire_worktree"), Arc::new(action::git::AcquireWorktreeAction));
    registry.register(ty("action.release_worktree"), Arc::new(action::git::ReleaseWorktreeAction));

    registry.register(ty("action.create_task"), Arc::new(action::task::CreateTaskAction));
    registry.register(ty("action.update_task_status"), Arc::new(action::task::UpdateTaskStatusAction));
    registry.register(ty("action.materialize_planner_tasks"), Arc::new(action::task::MaterializePlannerTasksAction));
    registry.register(ty("action.claim_task"), Arc::new(action::task::ClaimTaskAction));
    registry.register(ty("action.release_claim"), Arc::new(action::task::ReleaseClaimAction));
    registry.register(ty("action.allocate_slot"), Arc::new(action::task::AllocateSlotAction::new(slots.clone())));
    registry.register(ty("action.release_slot"), Arc::new(action::task::ReleaseSlotAction::new(slots)));

    registry.register(ty("action.delay"), Arc::new(action::control::DelayAction));
    registry.register(ty("action.set_variable"), Arc::new(action::control::SetVariableAction));
    registry.register(ty("action.execute_workflow"), Arc::new(action::control::ExecuteWorkflowAction));

    registry.register(ty("meeting.start"), Arc::new(meeting::MeetingStartAction));
    registry.register(ty("meeting.send"), Arc::new(meeting::MeetingSendAction));
    registry.register(ty("meeting.transcript"), Arc::new(meeting::MeetingTranscriptAction));
    registry.register(ty("meeting.vision"), Arc::new(meeting::MeetingVisionAction));
    registry.register(ty("meeting.finalize"), Arc::new(meeting::MeetingFinalizeAction));

    registry.register(ty("notify.log"), Arc::new(notify::LogNotify));
    registry.register(ty("notify.telegram"), Arc::new(notify::TelegramNotify));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_populates_every_documented_category() {
        let registry = NodeRegistry::new();
        register_all(&registry);

        let types: Vec<String> = registry.list_node_types().iter().map(|t| t.to_string()).collect();
        for expected in [
            "trigger.manual",
            "trigger.schedule",
            "trigger.scheduled_once",
            "trigger.event",
            "trigger.pr_event",
            "trigger.task_assigned",
            "trigger.task_available",
            "trigger.anomaly",
            "trigger.webhook",
            "meeting.wake_phrase",
            "condition.expression",
            "condition.switch",
            "condition.slot_available",
            "flow.gate",
            "loop.for_each",
            "action.run_agent",
            "action.run_planner",
            "action.run_command",
            "action.create_pr",
            "action.create_task",
            "action.update_task_status",
            "action.git_operations",
            "action.delay",
            "action.set_variable",
            "action.execute_workflow",
            "action.materialize_planner_tasks",
            "action.allocate_slot",
            "action.release_slot",
            "action.claim_task",
            "action.release_claim",
            "action.resolve_executor",
            "action.acquire_worktree",
            "action.release_worktree",
            "action.build_task_prompt",
            "action.detect_new_commits",
            "action.push_branch",
            "action.handle_rate_limit",
            "meeting.start",
            "meeting.send",
            "meeting.transcript",
            "meeting.vision",
            "meeting.finalize",
            "notify.log",
            "notify.telegram",
        ] {
            assert!(types.contains(&expected.to_string()), "missing registration for {expected}");
        }
    }
}
