//! Task lifecycle commands: start, complete, block, unblock.
//!
//! Each command validates against the current tracker before touching git or
//! disk, applies the transition through [`TrackerStore::update`], and only then
//! tells [`IssueSync`] about it.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::branch::BranchCoordinator;
use crate::core::selector::{next_pending, waiting_count};
use crate::core::task_id::normalize_task_id;
use crate::core::transitions::{self, TransitionError};
use crate::error::{FlowError, Result};
use crate::io::tracker_store::TrackerStore;
use crate::issue_sync::{IssueSync, TaskEvent};
use crate::tracker::{IssueRef, Task, TaskTracker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub task: Task,
    /// Feature branch checked out for the task, when branching is enabled.
    pub branch: Option<String>,
    /// Issue created for the task by this start.
    pub issue: Option<IssueRef>,
}

fn parse_task_id(value: &str) -> Result<String> {
    normalize_task_id(value).ok_or_else(|| FlowError::InvalidTaskId {
        value: value.to_string(),
    })
}

pub struct TaskLifecycle<'a, S: TrackerStore> {
    store: S,
    issues: IssueSync<'a>,
    branches: Option<BranchCoordinator<'a>>,
}

impl<'a, S: TrackerStore> TaskLifecycle<'a, S> {
    pub fn new(store: S, issues: IssueSync<'a>, branches: Option<BranchCoordinator<'a>>) -> Self {
        Self {
            store,
            issues,
            branches,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The task `start_next` would pick, without starting it.
    pub fn peek_next(&self) -> Result<Option<Task>> {
        let tracker = self.store.load()?;
        Ok(next_pending(&tracker).cloned())
    }

    /// `pending → in_progress` for `task_id`.
    ///
    /// Preconditions are checked before the feature branch is created and
    /// before the tracker is written.
    #[instrument(skip_all, fields(task_id = raw_id))]
    pub fn start(&self, raw_id: &str, now: DateTime<Utc>) -> Result<StartOutcome> {
        let task_id = parse_task_id(raw_id)?;
        let tracker = self.store.load()?;
        transitions::check_start(&tracker, &task_id)?;

        let branch = match &self.branches {
            Some(branches) => Some(branches.start_task_branch(&task_id)?),
            None => None,
        };

        let task = self.store.update(|tracker| {
            transitions::start(tracker, &task_id, now)?;
            Ok(tracker.find(&task_id).cloned())
        })?;
        let mut task = task.ok_or_else(|| FlowError::TaskNotFound {
            task_id: task_id.clone(),
        })?;
        info!(task_id = %task.id, "task started");

        let issue = self.notify(&task, &TaskEvent::Started);
        if let Some(issue) = &issue {
            task.github_issue = Some(issue.clone());
        }
        Ok(StartOutcome {
            task,
            branch,
            issue,
        })
    }

    /// Start the first ready pending task.
    pub fn start_next(&self, now: DateTime<Utc>) -> Result<StartOutcome> {
        let tracker = self.store.load()?;
        if let Some(active) = tracker.active_task_id.clone() {
            return Err(FlowError::TaskAlreadyInProgress {
                requested: None,
                active,
            });
        }
        let next = next_pending(&tracker).ok_or_else(|| FlowError::NoPendingTasks {
            waiting: waiting_count(&tracker),
        })?;
        let task_id = next.id.clone();
        self.start(&task_id, now)
    }

    /// `in_progress → completed` for the active task.
    #[instrument(skip_all, fields(task_id = raw_id))]
    pub fn complete(&self, raw_id: &str, now: DateTime<Utc>) -> Result<Task> {
        let task = self.transition(raw_id, |tracker, task_id| {
            transitions::complete(tracker, task_id, now)
        })?;
        info!(task_id = %task.id, "task completed");
        self.notify(
            &task,
            &TaskEvent::Completed {
                pull_request_url: None,
            },
        );
        Ok(task)
    }

    #[instrument(skip_all, fields(task_id = raw_id))]
    pub fn block(&self, raw_id: &str, reason: &str) -> Result<Task> {
        let task = self.transition(raw_id, |tracker, task_id| {
            transitions::block(tracker, task_id, reason)
        })?;
        info!(task_id = %task.id, "task blocked");
        self.notify(
            &task,
            &TaskEvent::Blocked {
                reason: reason.to_string(),
            },
        );
        Ok(task)
    }

    /// `blocked → pending`.
    #[instrument(skip_all, fields(task_id = raw_id))]
    pub fn unblock(&self, raw_id: &str) -> Result<Task> {
        let task = self.transition(raw_id, transitions::unblock)?;
        info!(task_id = %task.id, "task unblocked");
        self.notify(&task, &TaskEvent::Unblocked);
        Ok(task)
    }

    fn transition(
        &self,
        raw_id: &str,
        apply: impl FnOnce(&mut TaskTracker, &str) -> std::result::Result<(), TransitionError>,
    ) -> Result<Task> {
        let task_id = parse_task_id(raw_id)?;
        let task = self.store.update(|tracker| {
            apply(tracker, &task_id)?;
            Ok(tracker.find(&task_id).cloned())
        })?;
        task.ok_or(FlowError::TaskNotFound { task_id })
    }

    /// Forward `event` to issue sync and record a newly created issue.
    pub fn notify(&self, task: &Task, event: &TaskEvent) -> Option<IssueRef> {
        let created = self.issues.notify(task, event)?;
        let recorded = self.store.update(|tracker| {
            if let Some(entry) = tracker.find_mut(&task.id) {
                entry.github_issue = Some(created.clone());
            }
            Ok(())
        });
        if let Err(err) = recorded {
            warn!(error = %err, task_id = %task.id, "could not record issue reference");
        }
        Some(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::IssueSettings;
    use crate::io::tracker_store::MemoryTrackerStore;
    use crate::test_support::{FakeHosting, task, task_with_status, tracker};
    use crate::tracker::TaskStatus;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn lifecycle(store: MemoryTrackerStore) -> TaskLifecycle<'static, MemoryTrackerStore> {
        TaskLifecycle::new(store, IssueSync::disabled(), None)
    }

    #[test]
    fn start_next_picks_first_ready_task() {
        let life = lifecycle(MemoryTrackerStore::new(tracker(vec![
            task_with_status("TASK-001", &[], TaskStatus::Completed),
            task("TASK-002", &["TASK-003"]),
            task("TASK-003", &["TASK-001"]),
        ])));
        let outcome = life.start_next(now()).expect("start");
        assert_eq!(outcome.task.id, "TASK-003");
        assert_eq!(outcome.task.status, TaskStatus::InProgress);
        assert_eq!(outcome.task.started_at, Some(now()));

        let stored = life.store().snapshot();
        assert_eq!(stored.active_task_id.as_deref(), Some("TASK-003"));
    }

    #[test]
    fn start_next_reports_active_task() {
        let life = lifecycle(MemoryTrackerStore::new(tracker(vec![
            task("TASK-001", &[]),
            task("TASK-002", &[]),
        ])));
        life.start("TASK-001", now()).expect("start");
        match life.start_next(now()) {
            Err(FlowError::TaskAlreadyInProgress { requested, active }) => {
                assert_eq!(requested, None);
                assert_eq!(active, "TASK-001");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn start_next_counts_waiting_tasks() {
        let life = lifecycle(MemoryTrackerStore::new(tracker(vec![
            task_with_status("TASK-001", &[], TaskStatus::Blocked),
            task("TASK-002", &["TASK-001"]),
        ])));
        assert!(matches!(
            life.start_next(now()),
            Err(FlowError::NoPendingTasks { waiting: 1 })
        ));
        assert_eq!(life.peek_next().expect("peek"), None);
    }

    #[test]
    fn start_accepts_lowercase_ids_and_rejects_malformed() {
        let life = lifecycle(MemoryTrackerStore::new(tracker(vec![task("TASK-001", &[])])));
        assert!(matches!(
            life.start("TASK-1", now()),
            Err(FlowError::InvalidTaskId { .. })
        ));
        assert_eq!(
            life.start("task-001", now()).expect("start").task.id,
            "TASK-001"
        );
    }

    #[test]
    fn unmet_dependencies_leave_tracker_untouched() {
        let store = MemoryTrackerStore::new(tracker(vec![
            task("TASK-001", &[]),
            task("TASK-002", &["TASK-001"]),
        ]));
        let life = lifecycle(store);
        match life.start("TASK-002", now()) {
            Err(FlowError::DependencyNotSatisfied { pending, .. }) => {
                assert_eq!(pending, vec!["TASK-001".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(life.store().saves(), 0);
    }

    #[test]
    fn complete_requires_active_task() {
        let life = lifecycle(MemoryTrackerStore::new(tracker(vec![
            task("TASK-001", &[]),
            task("TASK-002", &[]),
        ])));
        life.start("TASK-001", now()).expect("start");
        assert!(matches!(
            life.complete("TASK-002", now()),
            Err(FlowError::TaskNotActive { .. })
        ));
        let done = life.complete("TASK-001", now()).expect("complete");
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(life.store().snapshot().active_task_id, None);

        assert!(matches!(
            life.block("TASK-001", "late"),
            Err(FlowError::TerminalState { .. })
        ));
    }

    #[test]
    fn block_and_unblock_round_trip() {
        let life = lifecycle(MemoryTrackerStore::new(tracker(vec![task("TASK-001", &[])])));
        life.start("TASK-001", now()).expect("start");
        let blocked = life.block("TASK-001", "waiting on design").expect("block");
        assert_eq!(blocked.status, TaskStatus::Blocked);
        assert_eq!(blocked.blocked_reason.as_deref(), Some("waiting on design"));
        assert_eq!(life.store().snapshot().active_task_id, None);

        let pending = life.unblock("TASK-001").expect("unblock");
        assert_eq!(pending.status, TaskStatus::Pending);
        assert!(matches!(
            life.unblock("TASK-001"),
            Err(FlowError::TaskNotBlocked { .. })
        ));
    }

    #[test]
    fn started_task_records_created_issue() {
        let fake = FakeHosting::new();
        let life = TaskLifecycle::new(
            MemoryTrackerStore::new(tracker(vec![task("TASK-001", &[])])),
            IssueSync::new(Some(&fake), &IssueSettings::default()),
            None,
        );
        let outcome = life.start("TASK-001", now()).expect("start");
        let issue = outcome.issue.expect("issue");
        assert_eq!(outcome.task.github_issue.as_ref(), Some(&issue));
        assert_eq!(
            life.store().snapshot().task_files[0].github_issue,
            Some(issue)
        );
    }

    #[test]
    fn issue_outage_does_not_fail_start() {
        let fake = FakeHosting::failing();
        let life = TaskLifecycle::new(
            MemoryTrackerStore::new(tracker(vec![task("TASK-001", &[])])),
            IssueSync::new(Some(&fake), &IssueSettings::default()),
            None,
        );
        let outcome = life.start("TASK-001", now()).expect("start");
        assert_eq!(outcome.issue, None);
        assert_eq!(
            life.store().snapshot().task_files[0].status,
            TaskStatus::InProgress
        );
    }
}
