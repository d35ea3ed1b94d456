//! Persisted task tracker model (`.devflow/plans/<plan-id>/tasks.json`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::PlanTask;

/// Lifecycle status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a remote issue (GitHub issue number or Azure work item id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    pub url: String,
}

/// A single unit of work extracted from the locked plan.
///
/// Everything except `status`, the timestamps, `github_issue` and
/// `blocked_reason` is frozen once the tracker is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub completion_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_issue: Option<IssueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl Task {
    /// Build a pending task from its plan specification.
    pub fn from_plan(spec: &PlanTask) -> Self {
        Self {
            id: spec.id.clone(),
            title: spec.title.clone(),
            phase: spec.phase.clone(),
            description: spec.description.clone(),
            status: TaskStatus::Pending,
            dependencies: spec.dependencies.clone(),
            completion_criteria: spec.completion_criteria.clone(),
            github_issue: None,
            started_at: None,
            completed_at: None,
            blocked_reason: None,
        }
    }
}

/// The mutable, persisted record of every task's status for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTracker {
    pub plan_id: String,
    pub project_name: String,
    pub active_task_id: Option<String>,
    pub task_files: Vec<Task>,
}

/// Per-status task counts for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.blocked
    }
}

impl TaskTracker {
    /// Create a tracker from the frozen plan task list, preserving document order.
    pub fn from_plan(plan_id: &str, project_name: &str, tasks: &[PlanTask]) -> Self {
        Self {
            plan_id: plan_id.to_string(),
            project_name: project_name.to_string(),
            active_task_id: None,
            task_files: tasks.iter().map(Task::from_plan).collect(),
        }
    }

    pub fn find(&self, task_id: &str) -> Option<&Task> {
        self.task_files.iter().find(|task| task.id == task_id)
    }

    pub fn find_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.task_files.iter_mut().find(|task| task.id == task_id)
    }

    /// The task currently recorded as active, if any.
    pub fn active_task(&self) -> Option<&Task> {
        self.active_task_id
            .as_deref()
            .and_then(|task_id| self.find(task_id))
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in &self.task_files {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }
}
