//! Deterministic next-task selection.

use crate::tracker::{Task, TaskStatus, TaskTracker};

/// Dependencies of `task` that are not yet `completed`, in declaration order.
///
/// Dependencies that do not resolve to a task count as unmet.
pub fn unmet_dependencies(tracker: &TaskTracker, task: &Task) -> Vec<String> {
    task.dependencies
        .iter()
        .filter(|dep| {
            tracker
                .find(dep)
                .is_none_or(|found| found.status != TaskStatus::Completed)
        })
        .cloned()
        .collect()
}

pub fn dependencies_met(tracker: &TaskTracker, task: &Task) -> bool {
    unmet_dependencies(tracker, task).is_empty()
}

/// First `pending` task in stored (document) order whose dependencies are all
/// completed.
///
/// Returns `None` when no task is ready.
pub fn next_pending(tracker: &TaskTracker) -> Option<&Task> {
    tracker
        .task_files
        .iter()
        .find(|task| task.status == TaskStatus::Pending && dependencies_met(tracker, task))
}

/// Number of `pending` tasks still waiting on dependencies.
pub fn waiting_count(tracker: &TaskTracker) -> usize {
    tracker
        .task_files
        .iter()
        .filter(|task| task.status == TaskStatus::Pending && !dependencies_met(tracker, task))
        .count()
}
