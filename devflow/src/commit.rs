//! Finishing a unit of work: gate, complete, commit, push, pull request.
//!
//! Everything up to the tracker transition is validation and mutates nothing.
//! Once the active task is marked completed there is no rollback: a later
//! failure is reported as [`FlowError::FinalizeFailed`] naming the stage, so
//! the user knows what already happened.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::changes::ChangeSummary;
use crate::core::issue_format::issue_title;
use crate::core::task_id::task_id_from_branch;
use crate::error::{FinalizeStage, FlowError, Result};
use crate::hooks::{Action, Phase, Pipeline};
use crate::io::guards::TestRunner;
use crate::io::hosting::{NewPullRequest, PullRequest, PullRequestState};
use crate::io::templates::Templates;
use crate::io::tracker_store::TrackerStore;
use crate::issue_sync::{IssueSync, TaskEvent};
use crate::task::TaskLifecycle;
use crate::tracker::Task;
use crate::workflow::Workflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Active task with working-tree changes.
    Task,
    /// Active task, nothing changed besides devflow state.
    TaskOnly,
    /// Changes without an active task: commit and push, no completion.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub mode: CommitMode,
    /// Completed task (task modes) or the task the branch belongs to.
    pub task: Option<Task>,
    pub branch: String,
    /// Short SHA of the new commit.
    pub commit: Option<String>,
    pub pushed: bool,
    pub pull_request: Option<PullRequest>,
}

/// Run the commit flow on the current branch.
#[instrument(skip_all)]
pub fn run_commit(wf: &Workflow, tests: &dyn TestRunner, now: DateTime<Utc>) -> Result<CommitOutcome> {
    let store = wf.tracker_store()?;
    let tracker = store.load()?;

    let git = wf.git();
    let branch = git.current_branch()?;
    if branch == wf.settings().trunk {
        return Err(FlowError::BranchProtected { branch });
    }

    let state_prefix = wf.paths().state_prefix();
    let work = git.dirty_entries(&[state_prefix.as_str()])?;
    let active = tracker.active_task().cloned();
    let mode = match (&active, work.is_empty()) {
        (Some(_), false) => CommitMode::Task,
        (Some(_), true) => CommitMode::TaskOnly,
        (None, false) => CommitMode::Fallback,
        (None, true) => return Err(FlowError::NoActiveTask),
    };
    debug!(?mode, branch, changed = work.len(), "commit mode");

    // A task branch only ever carries its own task's commit.
    if let Some(active) = &active {
        if let Some(branch_task) = task_id_from_branch(&branch) {
            if branch_task != active.id {
                return Err(FlowError::TaskBranchMismatch {
                    branch,
                    branch_task,
                    task_id: active.id.clone(),
                });
            }
        }
    }

    let ctx = wf
        .hook_context(Action::Commit)?
        .with_tests(tests, wf.test_request());
    Pipeline::standard().run(Phase::Post, &ctx).into_result()?;

    let Some(active) = active else {
        let task = task_id_from_branch(&branch).and_then(|id| tracker.find(&id).cloned());
        return finalize(wf, CommitMode::Fallback, task, branch);
    };

    // Issue notification waits until the pull request exists.
    let lifecycle = TaskLifecycle::new(store, IssueSync::disabled(), None);
    let completed = lifecycle.complete(&active.id, now)?;
    info!(task_id = %completed.id, "task completed, finalizing");

    let task_id = completed.id.clone();
    let outcome = finalize(wf, mode, Some(completed), branch).map_err(|err| match err {
        FlowError::FinalizeFailed { .. } => err,
        other => FlowError::FinalizeFailed {
            stage: FinalizeStage::Commit,
            task_id,
            commit: None,
            message: other.to_string(),
        },
    })?;

    if let Some(task) = &outcome.task {
        wf.issue_sync().notify(
            task,
            &TaskEvent::Completed {
                pull_request_url: outcome.pull_request.as_ref().map(|pr| pr.url.clone()),
            },
        );
    }
    Ok(outcome)
}

/// Stage, commit, push and open the pull request.
///
/// In task modes every error is a `FinalizeFailed` for the stage it hit.
fn finalize(
    wf: &Workflow,
    mode: CommitMode,
    task: Option<Task>,
    branch: String,
) -> Result<CommitOutcome> {
    let git = wf.git();
    let settings = wf.settings();
    let templates = Templates::new();
    let completing = mode != CommitMode::Fallback;
    let fail = |stage: FinalizeStage, commit: Option<&str>| {
        let task_id = task.as_ref().map(|t| t.id.clone()).unwrap_or_default();
        let commit = commit.map(str::to_string);
        move |err: FlowError| {
            if completing {
                FlowError::FinalizeFailed {
                    stage,
                    task_id,
                    commit,
                    message: err.to_string(),
                }
            } else {
                err
            }
        }
    };

    let state_prefix = wf.paths().state_prefix();
    let entries = git.status_porcelain().map_err(fail(FinalizeStage::Commit, None))?;
    let work: Vec<_> = entries
        .into_iter()
        .filter(|entry| !entry.path.starts_with(&state_prefix))
        .collect();
    let changes = ChangeSummary::from_entries(&work);

    let subject = match &task {
        Some(task) => issue_title(task),
        None => format!("Update {branch}"),
    };
    let message = templates
        .commit_message(&subject, &changes)
        .map_err(|err| fail(FinalizeStage::Commit, None)(FlowError::Internal(err)))?;

    git.add_all().map_err(fail(FinalizeStage::Commit, None))?;
    let committed = git
        .commit_staged(&message)
        .map_err(fail(FinalizeStage::Commit, None))?;
    let commit = if committed {
        Some(git.head_sha(true).map_err(fail(FinalizeStage::Commit, None))?)
    } else {
        warn!("nothing staged, no commit created");
        None
    };

    let has_remote = git
        .has_remote(&settings.remote)
        .map_err(fail(FinalizeStage::Push, commit.as_deref()))?;
    if !has_remote {
        warn!(remote = %settings.remote, "remote not configured, skipping push");
        return Ok(CommitOutcome {
            mode,
            task,
            branch,
            commit,
            pushed: false,
            pull_request: None,
        });
    }
    git.push_upstream(&settings.remote, &branch)
        .map_err(fail(FinalizeStage::Push, commit.as_deref()))?;
    info!(branch, "pushed");

    let pull_request = match (&task, wf.hosting()) {
        (Some(task), Some(client)) => {
            let existing = client.find_pull_request(&branch).map_err(|err| {
                fail(FinalizeStage::PullRequest, commit.as_deref())(FlowError::Internal(err.into()))
            })?;
            match existing {
                Some(pr) if pr.state == PullRequestState::Open => {
                    debug!(number = pr.number, "reusing open pull request");
                    Some(pr)
                }
                _ => {
                    let body = templates
                        .pull_request_body(task, &changes, task.github_issue.as_ref())
                        .map_err(|err| {
                            fail(FinalizeStage::PullRequest, commit.as_deref())(FlowError::Internal(err))
                        })?;
                    let request = NewPullRequest {
                        head: branch.clone(),
                        base: settings.trunk.clone(),
                        title: issue_title(task),
                        body,
                    };
                    let pr = client.create_pull_request(&request).map_err(|err| {
                        fail(FinalizeStage::PullRequest, commit.as_deref())(FlowError::Internal(
                            err.into(),
                        ))
                    })?;
                    info!(number = pr.number, url = %pr.url, "opened pull request");
                    Some(pr)
                }
            }
        }
        (Some(_), None) => {
            info!("no hosting client configured, open the pull request manually");
            None
        }
        (None, _) => None,
    };

    Ok(CommitOutcome {
        mode,
        task,
        branch,
        commit,
        pushed: true,
        pull_request,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GuardOutcome;
    use crate::io::config::Settings;
    use crate::plan::{generate_plan, lock_plan};
    use crate::test_support::{FakeHosting, ScriptedTestRunner, TestRepo, plan_spec, plan_task};
    use crate::tracker::TaskStatus;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
    }

    /// Locked two-task plan with TASK-001 started on its feature branch.
    fn started(wf: &Workflow) {
        let plans = wf.plans();
        let generated = generate_plan(&plans, "Build a demo", now()).expect("generate");
        plans
            .write_spec(
                &generated.plan_id,
                &plan_spec(vec![
                    plan_task("TASK-001", &[]),
                    plan_task("TASK-002", &["TASK-001"]),
                ]),
            )
            .expect("spec");
        lock_plan(&plans, None, "demo", now()).expect("lock");
        wf.lifecycle()
            .expect("lifecycle")
            .start("TASK-001", now())
            .expect("start");
    }

    fn task_status(wf: &Workflow, id: &str) -> TaskStatus {
        let tracker = wf.tracker_store().expect("store").load().expect("load");
        tracker.find(id).expect("task").status
    }

    #[test]
    fn completes_commits_pushes_and_opens_pull_request() {
        let repo = TestRepo::with_remote().expect("repo");
        let fake = FakeHosting::new();
        let wf = Workflow::new(repo.root(), Settings::default(), Some(Box::new(fake.clone())));
        started(&wf);
        repo.write("src/lib.rs", "pub fn demo() {}\n").expect("write");

        let runner = ScriptedTestRunner::new(GuardOutcome::Pass);
        let outcome = run_commit(&wf, &runner, now()).expect("commit");
        assert_eq!(outcome.mode, CommitMode::Task);
        assert_eq!(outcome.branch, "feature/task-001");
        assert!(outcome.pushed);
        assert_eq!(runner.runs(), 1);

        let pr = outcome.pull_request.expect("pull request");
        assert_eq!(pr.state, PullRequestState::Open);
        assert_eq!(task_status(&wf, "TASK-001"), TaskStatus::Completed);

        let message = repo.git(&["log", "-1", "--pretty=%B"]).expect("log");
        assert!(message.starts_with("[TASK-001] TASK-001 title"), "{message}");
        assert!(message.contains("- added: src/lib.rs"), "{message}");
        assert_eq!(repo.git(&["status", "--porcelain"]).expect("status"), "");

        let remote_sha = repo
            .git(&["rev-parse", "origin/feature/task-001"])
            .expect("remote branch");
        assert_eq!(remote_sha, repo.git(&["rev-parse", "HEAD"]).expect("head"));
        assert!(
            fake.calls()
                .iter()
                .any(|call| call.starts_with("create_pull_request feature/task-001 -> main"))
        );
    }

    #[test]
    fn failing_tests_block_without_mutation() {
        let repo = TestRepo::new().expect("repo");
        let wf = Workflow::new(repo.root(), Settings::default(), None);
        started(&wf);
        repo.write("src/lib.rs", "broken\n").expect("write");
        let head = repo.git(&["rev-parse", "HEAD"]).expect("head");

        let runner = ScriptedTestRunner::new(GuardOutcome::Fail);
        let err = run_commit(&wf, &runner, now()).expect_err("blocked");
        assert!(matches!(err, FlowError::HookBlocked { .. }), "{err:?}");
        assert_eq!(task_status(&wf, "TASK-001"), TaskStatus::InProgress);
        assert_eq!(repo.git(&["rev-parse", "HEAD"]).expect("head"), head);
    }

    #[test]
    fn trunk_is_protected() {
        let repo = TestRepo::new().expect("repo");
        let wf = Workflow::new(repo.root(), Settings::default(), None);
        started(&wf);
        repo.git(&["checkout", "main"]).expect("checkout");

        let runner = ScriptedTestRunner::new(GuardOutcome::Pass);
        assert!(matches!(
            run_commit(&wf, &runner, now()),
            Err(FlowError::BranchProtected { .. })
        ));
        assert_eq!(runner.runs(), 0);
    }

    #[test]
    fn active_task_on_another_tasks_branch_is_refused() {
        let repo = TestRepo::new().expect("repo");
        let wf = Workflow::new(repo.root(), Settings::default(), None);
        started(&wf);
        repo.git(&["checkout", "-b", "feature/task-002"]).expect("branch");
        repo.write("src/lib.rs", "pub fn demo() {}\n").expect("write");
        let head = repo.git(&["rev-parse", "HEAD"]).expect("head");

        let runner = ScriptedTestRunner::new(GuardOutcome::Pass);
        match run_commit(&wf, &runner, now()) {
            Err(FlowError::TaskBranchMismatch {
                branch,
                branch_task,
                task_id,
            }) => {
                assert_eq!(branch, "feature/task-002");
                assert_eq!(branch_task, "TASK-002");
                assert_eq!(task_id, "TASK-001");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(runner.runs(), 0);
        assert_eq!(task_status(&wf, "TASK-001"), TaskStatus::InProgress);
        assert_eq!(repo.git(&["rev-parse", "HEAD"]).expect("head"), head);
    }

    #[test]
    fn nothing_to_commit_without_active_task() {
        let repo = TestRepo::new().expect("repo");
        let wf = Workflow::new(repo.root(), Settings::default(), None);
        started(&wf);
        let runner = ScriptedTestRunner::new(GuardOutcome::Pass);
        run_commit(&wf, &runner, now()).expect("first commit");

        assert!(matches!(
            run_commit(&wf, &runner, now()),
            Err(FlowError::NoActiveTask)
        ));
    }

    #[test]
    fn fallback_mode_commits_without_completing() {
        let repo = TestRepo::new().expect("repo");
        let wf = Workflow::new(repo.root(), Settings::default(), None);
        started(&wf);
        let runner = ScriptedTestRunner::new(GuardOutcome::Pass);
        run_commit(&wf, &runner, now()).expect("task commit");

        repo.write("src/fix.rs", "// follow-up\n").expect("write");
        let outcome = run_commit(&wf, &runner, now()).expect("fallback commit");
        assert_eq!(outcome.mode, CommitMode::Fallback);
        assert!(!outcome.pushed);
        assert_eq!(
            outcome.task.map(|t| t.status),
            Some(TaskStatus::Completed)
        );
        let subject = repo.git(&["log", "-1", "--pretty=%s"]).expect("log");
        assert_eq!(subject, "[TASK-001] TASK-001 title");
    }

    #[test]
    fn missing_remote_skips_push_but_completes() {
        let repo = TestRepo::new().expect("repo");
        let wf = Workflow::new(repo.root(), Settings::default(), None);
        started(&wf);

        let runner = ScriptedTestRunner::new(GuardOutcome::Skipped);
        let outcome = run_commit(&wf, &runner, now()).expect("commit");
        assert_eq!(outcome.mode, CommitMode::TaskOnly);
        assert!(!outcome.pushed);
        assert!(outcome.commit.is_some());
        assert_eq!(task_status(&wf, "TASK-001"), TaskStatus::Completed);
    }

    #[test]
    fn pull_request_failure_reports_stage_after_completion() {
        let repo = TestRepo::with_remote().expect("repo");
        let fake = FakeHosting::failing();
        let wf = Workflow::new(repo.root(), Settings::default(), Some(Box::new(fake)));
        started(&wf);
        repo.write("src/lib.rs", "pub fn demo() {}\n").expect("write");

        let runner = ScriptedTestRunner::new(GuardOutcome::Pass);
        match run_commit(&wf, &runner, now()) {
            Err(FlowError::FinalizeFailed {
                stage,
                task_id,
                commit,
                ..
            }) => {
                assert_eq!(stage, FinalizeStage::PullRequest);
                assert_eq!(task_id, "TASK-001");
                assert!(commit.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(task_status(&wf, "TASK-001"), TaskStatus::Completed);
    }
}
