//! Test-only helpers: deterministic builders, temporary git repositories and
//! scripted stand-ins for the hosting platform and the test command.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::core::types::{GuardOutcome, PlanSpec, PlanTask};
use crate::io::guards::{TestRequest, TestRunner};
use crate::io::hosting::{
    HostingClient, HostingError, HostingResult, NewIssue, NewPullRequest, PullRequest,
    PullRequestState,
};
use crate::tracker::{IssueRef, Task, TaskStatus, TaskTracker};

/// Create a pending task with deterministic defaults.
pub fn task(id: &str, dependencies: &[&str]) -> Task {
    Task::from_plan(&plan_task(id, dependencies))
}

/// Create a task with an explicit status.
pub fn task_with_status(id: &str, dependencies: &[&str], status: TaskStatus) -> Task {
    let mut task = task(id, dependencies);
    task.status = status;
    task
}

/// Tracker for plan `plan-test`. The active task id is left unset.
pub fn tracker(tasks: Vec<Task>) -> TaskTracker {
    TaskTracker {
        plan_id: "plan-test".to_string(),
        project_name: "demo".to_string(),
        active_task_id: None,
        task_files: tasks,
    }
}

/// Create a plan task entry with deterministic defaults.
pub fn plan_task(id: &str, dependencies: &[&str]) -> PlanTask {
    PlanTask {
        id: id.to_string(),
        title: format!("{id} title"),
        phase: "implementation".to_string(),
        description: None,
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        completion_criteria: vec![format!("{id} works")],
    }
}

pub fn plan_spec(tasks: Vec<PlanTask>) -> PlanSpec {
    PlanSpec {
        project_name: Some("demo".to_string()),
        tasks,
    }
}

/// A throwaway git repository on `main` with one commit, optionally wired to
/// a bare `origin`.
pub struct TestRepo {
    dir: TempDir,
    remote: Option<TempDir>,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("tempdir")?;
        let repo = Self { dir, remote: None };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git(&["config", "user.email", "devflow@example.com"])?;
        repo.git(&["config", "user.name", "devflow tests"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write("README.md", "# demo\n")?;
        repo.commit_all("initial commit")?;
        Ok(repo)
    }

    /// Like [`TestRepo::new`], plus a bare `origin` that `main` tracks.
    pub fn with_remote() -> Result<Self> {
        let mut repo = Self::new()?;
        let remote = tempfile::tempdir().context("remote tempdir")?;
        run_git(remote.path(), &["init", "--quiet", "--bare"])?;
        run_git(remote.path(), &["symbolic-ref", "HEAD", "refs/heads/main"])?;
        let url = remote.path().to_string_lossy().to_string();
        repo.git(&["remote", "add", "origin", &url])?;
        repo.git(&["push", "--quiet", "-u", "origin", "main"])?;
        repo.remote = Some(remote);
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn remote_path(&self) -> Option<&Path> {
        self.remote.as_ref().map(TempDir::path)
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Run git in the repository and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(self.root(), args)
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "-m", message])?;
        Ok(())
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[derive(Debug, Default)]
struct FakeHostingState {
    calls: Vec<String>,
    next_number: u64,
    pull_requests: Vec<(String, PullRequest)>,
    failing: bool,
}

/// In-memory hosting platform. Clones share one call log.
#[derive(Debug, Clone, Default)]
pub struct FakeHosting {
    state: Rc<RefCell<FakeHostingState>>,
}

impl FakeHosting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a server error (after being recorded).
    pub fn failing() -> Self {
        let fake = Self::new();
        fake.state.borrow_mut().failing = true;
        fake
    }

    /// Calls so far, rendered as `op #number detail`.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Force the state of every pull request opened from `head`, creating one
    /// if none exists.
    pub fn set_pull_request_state(&self, head: &str, state: PullRequestState) {
        let mut inner = self.state.borrow_mut();
        if let Some((_, pr)) = inner.pull_requests.iter_mut().find(|(h, _)| h == head) {
            pr.state = state;
            return;
        }
        inner.next_number += 1;
        let number = inner.next_number;
        inner.pull_requests.push((
            head.to_string(),
            PullRequest {
                number,
                url: format!("https://example.com/pull/{number}"),
                state,
            },
        ));
    }

    fn record(&self, call: String) -> HostingResult<()> {
        let mut inner = self.state.borrow_mut();
        inner.calls.push(call);
        if inner.failing {
            return Err(HostingError::Api {
                status: 500,
                message: "fake outage".to_string(),
            });
        }
        Ok(())
    }

    fn next_number(&self) -> u64 {
        let mut inner = self.state.borrow_mut();
        inner.next_number += 1;
        inner.next_number
    }
}

impl HostingClient for FakeHosting {
    fn create_issue(&self, issue: &NewIssue) -> HostingResult<IssueRef> {
        self.record(format!("create_issue {} [{}]", issue.title, issue.labels.join(", ")))?;
        let number = self.next_number();
        Ok(IssueRef {
            number,
            url: format!("https://example.com/issues/{number}"),
        })
    }

    fn set_labels(&self, issue: &IssueRef, labels: &[String]) -> HostingResult<()> {
        self.record(format!("set_labels #{} [{}]", issue.number, labels.join(", ")))
    }

    fn add_comment(&self, issue: &IssueRef, body: &str) -> HostingResult<()> {
        self.record(format!("add_comment #{} {}", issue.number, body))
    }

    fn close_issue(&self, issue: &IssueRef) -> HostingResult<()> {
        self.record(format!("close_issue #{}", issue.number))
    }

    fn create_pull_request(&self, request: &NewPullRequest) -> HostingResult<PullRequest> {
        self.record(format!(
            "create_pull_request {} -> {} {}",
            request.head, request.base, request.title
        ))?;
        let number = self.next_number();
        let pr = PullRequest {
            number,
            url: format!("https://example.com/pull/{number}"),
            state: PullRequestState::Open,
        };
        self.state
            .borrow_mut()
            .pull_requests
            .push((request.head.clone(), pr.clone()));
        Ok(pr)
    }

    fn find_pull_request(&self, head: &str) -> HostingResult<Option<PullRequest>> {
        self.record(format!("find_pull_request {head}"))?;
        Ok(self
            .state
            .borrow()
            .pull_requests
            .iter()
            .rev()
            .find(|(h, _)| h == head)
            .map(|(_, pr)| pr.clone()))
    }
}

/// Test runner that returns a fixed outcome and counts invocations.
#[derive(Debug)]
pub struct ScriptedTestRunner {
    outcome: GuardOutcome,
    runs: Cell<usize>,
}

impl ScriptedTestRunner {
    pub fn new(outcome: GuardOutcome) -> Self {
        Self {
            outcome,
            runs: Cell::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.get()
    }
}

impl TestRunner for ScriptedTestRunner {
    fn run(&self, _request: &TestRequest) -> Result<GuardOutcome> {
        self.runs.set(self.runs.get() + 1);
        Ok(self.outcome)
    }
}
