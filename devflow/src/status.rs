//! Read-only progress report for `devflow status`.
//!
//! Collecting the report never fails: missing or unreadable state becomes
//! part of the report so the command can always exit 0.

use std::fmt;

use tracing::debug;

use crate::core::issue_format::issue_title;
use crate::core::selector::{next_pending, waiting_count};
use crate::io::tracker_store::TrackerStore;
use crate::tracker::{StatusCounts, TaskStatus};
use crate::workflow::Workflow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    NoPlan,
    /// Generated plan awaiting its specification or lock.
    Unlocked { plan_id: String, spec_present: bool },
    Locked(Progress),
    /// State exists but could not be read.
    Unreadable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub plan_id: String,
    pub project_name: String,
    pub branch: Option<String>,
    pub counts: StatusCounts,
    /// Rendered `[id] title` of the active task.
    pub active: Option<String>,
    pub next: Option<String>,
    pub waiting: usize,
    /// `(id, reason)` for blocked tasks.
    pub blocked: Vec<(String, String)>,
}

pub fn collect_status(wf: &Workflow) -> StatusReport {
    let plans = wf.plans();
    let plan_id = match plans.active_plan_id() {
        Ok(Some(plan_id)) => plan_id,
        Ok(None) => return StatusReport::NoPlan,
        Err(err) => {
            return StatusReport::Unreadable {
                message: err.to_string(),
            };
        }
    };
    if !plans.is_locked(&plan_id) {
        let spec_present = wf.paths().plan_spec_path(&plan_id).is_file();
        return StatusReport::Unlocked {
            plan_id,
            spec_present,
        };
    }

    let tracker = match wf.tracker_store().and_then(|store| store.load()) {
        Ok(tracker) => tracker,
        Err(err) => {
            debug!(error = %err, "tracker unreadable");
            return StatusReport::Unreadable {
                message: err.to_string(),
            };
        }
    };

    let blocked = tracker
        .task_files
        .iter()
        .filter(|task| task.status == TaskStatus::Blocked)
        .map(|task| {
            (
                task.id.clone(),
                task.blocked_reason.clone().unwrap_or_default(),
            )
        })
        .collect();

    StatusReport::Locked(Progress {
        branch: wf.git().current_branch().ok(),
        counts: tracker.counts(),
        active: tracker.active_task().map(issue_title),
        next: next_pending(&tracker).map(issue_title),
        waiting: waiting_count(&tracker),
        blocked,
        plan_id: tracker.plan_id,
        project_name: tracker.project_name,
    })
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::NoPlan => {
                writeln!(f, "No active plan.")?;
                write!(f, "Start one with `devflow plan generate <requirements>`.")
            }
            StatusReport::Unlocked {
                plan_id,
                spec_present,
            } => {
                writeln!(f, "Plan: {plan_id} (not locked)")?;
                if *spec_present {
                    write!(f, "Plan specification ready; lock it with `devflow plan lock`.")
                } else {
                    write!(f, "Waiting for the plan specification (plan.json).")
                }
            }
            StatusReport::Unreadable { message } => {
                writeln!(f, "State could not be read: {message}")?;
                write!(f, "Run `devflow validate` for details.")
            }
            StatusReport::Locked(progress) => progress.fmt(f),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.counts.total();
        let percent = if total == 0 {
            100
        } else {
            self.counts.completed * 100 / total
        };

        writeln!(f, "Plan: {} ({})", self.plan_id, self.project_name)?;
        if let Some(branch) = &self.branch {
            writeln!(f, "Branch: {branch}")?;
        }
        writeln!(
            f,
            "Progress: {}/{} completed ({percent}%)",
            self.counts.completed, total
        )?;
        writeln!(
            f,
            "  pending {}, in progress {}, blocked {}",
            self.counts.pending, self.counts.in_progress, self.counts.blocked
        )?;
        match &self.active {
            Some(active) => writeln!(f, "Active: {active}")?,
            None => writeln!(f, "Active: none")?,
        }
        match (&self.next, self.waiting) {
            (Some(next), _) => write!(f, "Next: {next}")?,
            (None, 0) => write!(f, "Next: none")?,
            (None, waiting) => write!(f, "Next: none ({waiting} waiting on dependencies)")?,
        }
        for (id, reason) in &self.blocked {
            write!(f, "\nBlocked: {id}")?;
            if !reason.is_empty() {
                write!(f, ": {reason}")?;
            }
        }
        Ok(())
    }
}
