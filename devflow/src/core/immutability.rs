//! Frozen-plan immutability checks.
//!
//! Once a plan is locked its task list is frozen: tasks cannot be added,
//! removed, reordered or edited. Only the lifecycle fields (status, timestamps,
//! issue reference, blocked reason) may change, and completed tasks may not
//! change at all.

use std::collections::HashMap;

use crate::core::types::PlanTask;
use crate::tracker::{Task, TaskStatus, TaskTracker};

/// Validate that a tracker write only touched lifecycle fields.
///
/// Returns a list of stable error messages (in task order).
pub fn check_frozen_task_list(prev: &TaskTracker, next: &TaskTracker) -> Vec<String> {
    let mut errors = Vec::new();

    if prev.plan_id != next.plan_id {
        errors.push(format!(
            "planId changed from '{}' to '{}'",
            prev.plan_id, next.plan_id
        ));
    }

    let prev_ids: Vec<&str> = prev.task_files.iter().map(|t| t.id.as_str()).collect();
    let next_ids: Vec<&str> = next.task_files.iter().map(|t| t.id.as_str()).collect();
    if prev_ids != next_ids {
        errors.push(format!(
            "task list changed: [{}] -> [{}]",
            prev_ids.join(", "),
            next_ids.join(", ")
        ));
        return errors;
    }

    for (before, after) in prev.task_files.iter().zip(&next.task_files) {
        if frozen_fields(before) != frozen_fields(after) {
            errors.push(format!("task '{}' definition changed", before.id));
        }
        if before.status == TaskStatus::Completed && before != after {
            errors.push(format!("completed task '{}' changed", before.id));
        }
    }

    errors
}

/// Validate that the tracker still mirrors the locked plan specification.
pub fn check_matches_plan(plan: &[PlanTask], tracker: &TaskTracker) -> Vec<String> {
    let mut errors = Vec::new();
    let by_id: HashMap<&str, &Task> = tracker
        .task_files
        .iter()
        .map(|t| (t.id.as_str(), t))
        .collect();

    for spec in plan {
        match by_id.get(spec.id.as_str()) {
            None => errors.push(format!("plan task '{}' missing from tracker", spec.id)),
            Some(task) => {
                let expected = Task::from_plan(spec);
                if frozen_fields(task) != frozen_fields(&expected) {
                    errors.push(format!("task '{}' differs from locked plan", spec.id));
                }
            }
        }
    }

    let plan_ids: Vec<&str> = plan.iter().map(|t| t.id.as_str()).collect();
    let tracker_ids: Vec<&str> = tracker.task_files.iter().map(|t| t.id.as_str()).collect();
    for id in &tracker_ids {
        if !plan_ids.contains(id) {
            errors.push(format!("tracker task '{id}' is not in the locked plan"));
        }
    }
    if errors.is_empty() && plan_ids != tracker_ids {
        errors.push("tracker task order differs from the locked plan".to_string());
    }

    errors
}

type FrozenFields<'a> = (
    &'a str,
    &'a str,
    &'a str,
    Option<&'a str>,
    &'a [String],
    &'a [String],
);

fn frozen_fields(task: &Task) -> FrozenFields<'_> {
    (
        task.id.as_str(),
        task.title.as_str(),
        task.phase.as_str(),
        task.description.as_deref(),
        task.dependencies.as_slice(),
        task.completion_criteria.as_slice(),
    )
}
