//! Semantic tracker invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::selector::unmet_dependencies;
use crate::core::task_id::is_canonical_task_id;
use crate::tracker::{TaskStatus, TaskTracker};

/// Check semantic invariants not expressible in JSON Schema:
/// - Task ids are `TASK-NNN` and unique
/// - Dependencies reference known tasks, never the task itself
/// - At most one task is `in_progress`
/// - `activeTaskId` is set iff exactly that task is `in_progress`
/// - An `in_progress` task has all dependencies completed
pub fn validate_tracker_invariants(tracker: &TaskTracker) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let known: HashSet<&str> = tracker.task_files.iter().map(|t| t.id.as_str()).collect();

    for task in &tracker.task_files {
        if !is_canonical_task_id(&task.id) {
            errors.push(format!("task id '{}' is not of the form TASK-NNN", task.id));
        }
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("duplicate task id '{}'", task.id));
        }
        for dep in &task.dependencies {
            if dep == &task.id {
                errors.push(format!("{}: depends on itself", task.id));
            } else if !known.contains(dep.as_str()) {
                errors.push(format!("{}: unknown dependency '{}'", task.id, dep));
            }
        }
    }

    let in_progress: Vec<&str> = tracker
        .task_files
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
        .map(|t| t.id.as_str())
        .collect();
    if in_progress.len() > 1 {
        errors.push(format!(
            "multiple tasks in progress: {}",
            in_progress.join(", ")
        ));
    }

    match (tracker.active_task_id.as_deref(), in_progress.as_slice()) {
        (None, []) => {}
        (Some(active), [only]) if active == *only => {}
        (Some(active), _) if !known.contains(active) => {
            errors.push(format!("activeTaskId '{active}' does not match any task"));
        }
        (Some(active), _) => {
            errors.push(format!("activeTaskId '{active}' is not the in-progress task"));
        }
        (None, _) => {
            errors.push(format!(
                "task '{}' is in progress but activeTaskId is null",
                in_progress.join(", ")
            ));
        }
    }

    for task in tracker
        .task_files
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
    {
        let pending = unmet_dependencies(tracker, task);
        if !pending.is_empty() {
            errors.push(format!(
                "{}: in progress with unmet dependencies {}",
                task.id,
                pending.join(", ")
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{task, task_with_status, tracker};

    #[test]
    fn valid_tracker_has_no_errors() {
        let mut tracker = tracker(vec![
            task_with_status("TASK-001", &[], TaskStatus::Completed),
            task_with_status("TASK-002", &["TASK-001"], TaskStatus::InProgress),
        ]);
        tracker.active_task_id = Some("TASK-002".to_string());
        assert!(validate_tracker_invariants(&tracker).is_empty());
    }

    #[test]
    fn reports_structural_errors() {
        let tracker = tracker(vec![
            task("TASK-001", &["TASK-001"]),
            task("TASK-001", &["TASK-404"]),
            task("task-3", &[]),
        ]);
        let errors = validate_tracker_invariants(&tracker);
        assert!(errors.iter().any(|e| e.contains("duplicate task id")));
        assert!(errors.iter().any(|e| e.contains("depends on itself")));
        assert!(errors.iter().any(|e| e.contains("unknown dependency 'TASK-404'")));
        assert!(errors.iter().any(|e| e.contains("not of the form")));
    }

    #[test]
    fn reports_multiple_in_progress_and_active_mismatch() {
        let mut tracker = tracker(vec![
            task_with_status("TASK-001", &[], TaskStatus::InProgress),
            task_with_status("TASK-002", &[], TaskStatus::InProgress),
        ]);
        tracker.active_task_id = Some("TASK-001".to_string());
        let errors = validate_tracker_invariants(&tracker);
        assert!(errors.iter().any(|e| e.contains("multiple tasks in progress")));
        assert!(errors.iter().any(|e| e.contains("not the in-progress task")));
    }

    #[test]
    fn reports_in_progress_without_active_pointer() {
        let tracker = tracker(vec![task_with_status(
            "TASK-001",
            &[],
            TaskStatus::InProgress,
        )]);
        let errors = validate_tracker_invariants(&tracker);
        assert_eq!(
            errors,
            vec!["task 'TASK-001' is in progress but activeTaskId is null".to_string()]
        );
    }

    #[test]
    fn reports_in_progress_with_unmet_dependencies() {
        let mut tracker = tracker(vec![
            task("TASK-001", &[]),
            task_with_status("TASK-002", &["TASK-001"], TaskStatus::InProgress),
        ]);
        tracker.active_task_id = Some("TASK-002".to_string());
        let errors = validate_tracker_invariants(&tracker);
        assert_eq!(
            errors,
            vec!["TASK-002: in progress with unmet dependencies TASK-001".to_string()]
        );
    }
}
