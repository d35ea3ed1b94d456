//! Shared deterministic types for devflow core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Plan specification as written by plan generation (`plan.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub tasks: Vec<PlanTask>,
}

/// One task entry in the plan specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub completion_criteria: Vec<String>,
}

/// A plan as owned by the plan store: requirements, tasks and lock state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub id: String,
    pub requirements: String,
    /// Empty until the specification has been produced.
    pub tasks: Vec<PlanTask>,
    pub locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
}

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    /// Render as `XY path`, the form used in error details.
    pub fn render(&self) -> String {
        format!("{} {}", self.code, self.path)
    }
}

/// Result of running the configured test command.
///
/// `Fail` is also used when the command could not complete (timeout, spawn
/// error), i.e. whenever the commit must not be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardOutcome {
    /// Tests completed successfully.
    Pass,
    /// Tests failed, or the runner could not complete them.
    Fail,
    /// No test command is configured.
    Skipped,
}
