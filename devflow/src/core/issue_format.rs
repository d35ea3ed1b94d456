//! Fixed mapping from task records to issue titles and labels.

use crate::tracker::{Task, TaskStatus};

/// Issue and pull request title: `[{id}] {title}`.
pub fn issue_title(task: &Task) -> String {
    format!("[{}] {}", task.id, task.title)
}

pub fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "status: pending",
        TaskStatus::InProgress => "status: in-progress",
        TaskStatus::Completed => "status: completed",
        TaskStatus::Blocked => "status: blocked",
    }
}

/// Full label set for a task in `status`, optionally with its phase label.
pub fn labels_for(task: &Task, status: TaskStatus, with_phase: bool) -> Vec<String> {
    let mut labels = vec![status_label(status).to_string()];
    let phase = task.phase.trim();
    if with_phase && !phase.is_empty() {
        labels.push(format!("phase: {phase}"));
    }
    labels
}
