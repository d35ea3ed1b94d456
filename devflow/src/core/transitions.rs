//! Task status transitions.
//!
//! ```text
//! pending ──start──▶ in_progress ──complete──▶ completed (terminal)
//!    │  ▲                 │
//!  block unblock        block
//!    ▼  │                 ▼
//!   blocked ◀─────────────┘
//! ```
//!
//! Every function validates before it mutates: on `Err` the tracker is left
//! exactly as it was passed in.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::selector::unmet_dependencies;
use crate::tracker::{TaskStatus, TaskTracker};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("task '{0}' not found")]
    UnknownTask(String),
    #[error("cannot start '{requested}': task '{active}' is already in progress")]
    AlreadyInProgress { requested: String, active: String },
    #[error("task '{task_id}' has unmet dependencies: {}", pending.join(", "))]
    DependencyNotSatisfied { task_id: String, pending: Vec<String> },
    #[error("task '{task_id}' is not the active task")]
    NotActive {
        task_id: String,
        active: Option<String>,
    },
    #[error("task '{task_id}' is {status} and cannot be started")]
    NotStartable { task_id: String, status: TaskStatus },
    #[error("task '{task_id}' is {status}, not blocked")]
    NotBlocked { task_id: String, status: TaskStatus },
    #[error("task '{task_id}' is completed; refusing transition to {attempted}")]
    Terminal {
        task_id: String,
        attempted: TaskStatus,
    },
}

/// Check that `task_id` may move `pending → in_progress` without mutating.
pub fn check_start(tracker: &TaskTracker, task_id: &str) -> Result<(), TransitionError> {
    let task = tracker
        .find(task_id)
        .ok_or_else(|| TransitionError::UnknownTask(task_id.to_string()))?;

    if task.status == TaskStatus::Completed {
        return Err(TransitionError::Terminal {
            task_id: task_id.to_string(),
            attempted: TaskStatus::InProgress,
        });
    }

    let active = tracker.active_task_id.clone().or_else(|| {
        tracker
            .task_files
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
            .map(|t| t.id.clone())
    });
    if let Some(active) = active {
        return Err(TransitionError::AlreadyInProgress {
            requested: task_id.to_string(),
            active,
        });
    }

    if task.status != TaskStatus::Pending {
        return Err(TransitionError::NotStartable {
            task_id: task_id.to_string(),
            status: task.status,
        });
    }

    let pending = unmet_dependencies(tracker, task);
    if !pending.is_empty() {
        return Err(TransitionError::DependencyNotSatisfied {
            task_id: task_id.to_string(),
            pending,
        });
    }
    Ok(())
}

/// `pending → in_progress`; sets the active task and start timestamp.
pub fn start(
    tracker: &mut TaskTracker,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    check_start(tracker, task_id)?;
    tracker.active_task_id = Some(task_id.to_string());
    if let Some(task) = tracker.find_mut(task_id) {
        task.status = TaskStatus::InProgress;
        task.started_at = Some(now);
        task.blocked_reason = None;
    }
    Ok(())
}

/// `in_progress → completed`; only the active task may complete.
pub fn complete(
    tracker: &mut TaskTracker,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if tracker.find(task_id).is_none() {
        return Err(TransitionError::UnknownTask(task_id.to_string()));
    }
    if tracker.active_task_id.as_deref() != Some(task_id) {
        return Err(TransitionError::NotActive {
            task_id: task_id.to_string(),
            active: tracker.active_task_id.clone(),
        });
    }
    tracker.active_task_id = None;
    if let Some(task) = tracker.find_mut(task_id) {
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
    }
    Ok(())
}

/// Any non-completed status `→ blocked`. Re-blocking updates the reason.
///
/// Blocking the active task clears the active slot; no other task is selected.
pub fn block(tracker: &mut TaskTracker, task_id: &str, reason: &str) -> Result<(), TransitionError> {
    let status = tracker
        .find(task_id)
        .map(|task| task.status)
        .ok_or_else(|| TransitionError::UnknownTask(task_id.to_string()))?;
    if status == TaskStatus::Completed {
        return Err(TransitionError::Terminal {
            task_id: task_id.to_string(),
            attempted: TaskStatus::Blocked,
        });
    }
    if tracker.active_task_id.as_deref() == Some(task_id) {
        tracker.active_task_id = None;
    }
    if let Some(task) = tracker.find_mut(task_id) {
        task.status = TaskStatus::Blocked;
        task.blocked_reason = Some(reason.trim().to_string()).filter(|r| !r.is_empty());
    }
    Ok(())
}

/// `blocked → pending`.
pub fn unblock(tracker: &mut TaskTracker, task_id: &str) -> Result<(), TransitionError> {
    let status = tracker
        .find(task_id)
        .map(|task| task.status)
        .ok_or_else(|| TransitionError::UnknownTask(task_id.to_string()))?;
    match status {
        TaskStatus::Blocked => {}
        TaskStatus::Completed => {
            return Err(TransitionError::Terminal {
                task_id: task_id.to_string(),
                attempted: TaskStatus::Pending,
            });
        }
        other => {
            return Err(TransitionError::NotBlocked {
                task_id: task_id.to_string(),
                status: other,
            });
        }
    }
    if let Some(task) = tracker.find_mut(task_id) {
        task.status = TaskStatus::Pending;
        task.blocked_reason = None;
    }
    Ok(())
}
