//! Closed error taxonomy for devflow operations.
//!
//! Every user-facing failure is a [`FlowError`] variant with its own payload.
//! The CLI renders them through [`FlowError::report`], which matches
//! exhaustively, so adding a variant forces a title, detail and suggestion.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::transitions::TransitionError;
use crate::tracker::TaskStatus;

pub type Result<T, E = FlowError> = std::result::Result<T, E>;

/// Coarse classification of a [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A precondition was not met; nothing was mutated.
    Validation,
    /// Repository state prevents the operation (or a git subprocess failed).
    GitOperation,
    /// Persisted state is malformed; no repair is attempted.
    Schema,
    /// Unexpected failure (I/O, templates, programming errors).
    Internal,
}

/// The step of task finalization that failed after the tracker was updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStage {
    Commit,
    Push,
    PullRequest,
}

impl fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FinalizeStage::Commit => "commit",
            FinalizeStage::Push => "push",
            FinalizeStage::PullRequest => "pull request",
        })
    }
}

/// Title/detail/suggestion triple shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub title: String,
    pub detail: String,
    pub suggestion: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.title)?;
        for line in self.detail.lines() {
            writeln!(f, "  {line}")?;
        }
        write!(f, "hint: {}", self.suggestion)
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("requirements text is empty")]
    NoRequirements,
    #[error("plan '{plan_id}' is active and not locked")]
    ActivePlanExists { plan_id: String },
    #[error("plan '{plan_id}' is already locked")]
    AlreadyLocked { plan_id: String },
    #[error("plan specification for '{plan_id}' not found at {}", path.display())]
    PlanFileMissing { plan_id: String, path: PathBuf },
    #[error("plan specification for '{plan_id}' is invalid")]
    SchemaInvalid { plan_id: String, errors: Vec<String> },
    #[error("no active plan")]
    NoActivePlan,
    #[error("task tracker for plan '{plan_id}' not found at {}", path.display())]
    TaskTrackerNotFound { plan_id: String, path: PathBuf },
    #[error("'{value}' is not a valid task id")]
    InvalidTaskId { value: String },
    #[error("task '{task_id}' not found")]
    TaskNotFound { task_id: String },
    #[error("task '{active}' is already in progress")]
    TaskAlreadyInProgress {
        requested: Option<String>,
        active: String,
    },
    #[error("task '{task_id}' has unmet dependencies")]
    DependencyNotSatisfied { task_id: String, pending: Vec<String> },
    #[error("task '{task_id}' is not the active task")]
    TaskNotActive {
        task_id: String,
        active: Option<String>,
    },
    #[error("task '{task_id}' is {status} and cannot be started")]
    TaskNotStartable { task_id: String, status: TaskStatus },
    #[error("task '{task_id}' is {status}, not blocked")]
    TaskNotBlocked { task_id: String, status: TaskStatus },
    #[error("no pending tasks are ready")]
    NoPendingTasks { waiting: usize },
    #[error("no active task and no changes to commit")]
    NoActiveTask,
    #[error("refusing to commit on protected branch '{branch}'")]
    BranchProtected { branch: String },
    #[error("blocked by {validator}: {reason}")]
    HookBlocked { validator: String, reason: String },
    #[error("{} is not a git repository", path.display())]
    NotARepository { path: PathBuf },
    #[error("HEAD is detached")]
    DetachedHead,
    #[error("working tree has uncommitted changes")]
    DirtyWorkingTree { entries: Vec<String> },
    #[error("uncommitted changes on the current branch")]
    UncommittedChanges { entries: Vec<String> },
    #[error("pulling '{branch}' failed")]
    PullFailed { branch: String, stderr: String },
    #[error("pull request for '{branch}' is not merged")]
    PrNotMerged {
        branch: String,
        state: Option<String>,
    },
    #[error("could not determine merge status of '{branch}'")]
    MergeStatusUnavailable { branch: String, message: String },
    #[error("on '{branch}', not trunk '{trunk}'")]
    NotOnTrunk { branch: String, trunk: String },
    #[error("branch '{branch}' belongs to '{branch_task}', not active task '{task_id}'")]
    TaskBranchMismatch {
        branch: String,
        branch_task: String,
        task_id: String,
    },
    #[error("branch '{branch}' is not a task, plan, admin or trunk branch")]
    UnsupportedBranch { branch: String },
    #[error("git {command} failed: {stderr}")]
    GitCommand { command: String, stderr: String },
    #[error("{stage} failed after completing '{task_id}'")]
    FinalizeFailed {
        stage: FinalizeStage,
        task_id: String,
        commit: Option<String>,
        message: String,
    },
    #[error("{} is corrupt", path.display())]
    CorruptState { path: PathBuf, message: String },
    #[error("invalid settings in {}", path.display())]
    InvalidSettings { path: PathBuf, message: String },
    #[error("task '{task_id}' is completed; transition to {attempted} rejected")]
    TerminalState {
        task_id: String,
        attempted: TaskStatus,
    },
    #[error("tracker update violates invariants")]
    InvariantViolation { errors: Vec<String> },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl FlowError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        FlowError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::NoRequirements
            | FlowError::ActivePlanExists { .. }
            | FlowError::AlreadyLocked { .. }
            | FlowError::PlanFileMissing { .. }
            | FlowError::NoActivePlan
            | FlowError::TaskTrackerNotFound { .. }
            | FlowError::InvalidTaskId { .. }
            | FlowError::TaskNotFound { .. }
            | FlowError::TaskAlreadyInProgress { .. }
            | FlowError::DependencyNotSatisfied { .. }
            | FlowError::TaskNotActive { .. }
            | FlowError::TaskNotStartable { .. }
            | FlowError::TaskNotBlocked { .. }
            | FlowError::NoPendingTasks { .. }
            | FlowError::NoActiveTask
            | FlowError::BranchProtected { .. }
            | FlowError::HookBlocked { .. }
            | FlowError::UnsupportedBranch { .. }
            | FlowError::TaskBranchMismatch { .. }
            | FlowError::InvalidSettings { .. } => ErrorKind::Validation,
            FlowError::NotARepository { .. }
            | FlowError::DetachedHead
            | FlowError::DirtyWorkingTree { .. }
            | FlowError::NotOnTrunk { .. }
            | FlowError::UncommittedChanges { .. }
            | FlowError::PullFailed { .. }
            | FlowError::PrNotMerged { .. }
            | FlowError::MergeStatusUnavailable { .. }
            | FlowError::GitCommand { .. }
            | FlowError::FinalizeFailed { .. } => ErrorKind::GitOperation,
            FlowError::SchemaInvalid { .. }
            | FlowError::CorruptState { .. }
            | FlowError::InvariantViolation { .. } => ErrorKind::Schema,
            FlowError::TerminalState { .. } | FlowError::Io { .. } | FlowError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Structured rendering for the CLI boundary.
    pub fn report(&self) -> ErrorReport {
        let (title, detail, suggestion) = match self {
            FlowError::NoRequirements => (
                "No requirements".to_string(),
                "The requirements text is empty or only whitespace.".to_string(),
                "Describe what should be built, e.g. `devflow plan generate \"...\"`.".to_string(),
            ),
            FlowError::ActivePlanExists { plan_id } => (
                "Active plan exists".to_string(),
                format!("Plan '{plan_id}' is active and has not been locked."),
                "Lock it with `devflow plan lock` before generating a new plan.".to_string(),
            ),
            FlowError::AlreadyLocked { plan_id } => (
                "Plan already locked".to_string(),
                format!("Plan '{plan_id}' is frozen; its task list cannot change."),
                "Work through its tasks with `devflow task next`.".to_string(),
            ),
            FlowError::PlanFileMissing { plan_id, path } => (
                "Plan specification missing".to_string(),
                format!(
                    "Plan '{plan_id}' has no specification at {}.",
                    path.display()
                ),
                "Produce the plan specification, then run `devflow plan lock`.".to_string(),
            ),
            FlowError::SchemaInvalid { plan_id, errors } => (
                "Plan specification invalid".to_string(),
                format!("Plan '{plan_id}':\n- {}", errors.join("\n- ")),
                "Fix the listed problems in plan.json and lock again.".to_string(),
            ),
            FlowError::NoActivePlan => (
                "No active plan".to_string(),
                "No plan has been generated in this repository.".to_string(),
                "Start with `devflow plan generate <requirements>`.".to_string(),
            ),
            FlowError::TaskTrackerNotFound { plan_id, path } => (
                "Task tracker not found".to_string(),
                format!(
                    "Plan '{plan_id}' has no tracker at {}.",
                    path.display()
                ),
                "Lock the plan with `devflow plan lock` to create it.".to_string(),
            ),
            FlowError::InvalidTaskId { value } => (
                "Invalid task id".to_string(),
                format!("'{value}' is not of the form TASK-NNN."),
                "Use an id from `devflow status`, e.g. TASK-001.".to_string(),
            ),
            FlowError::TaskNotFound { task_id } => (
                "Task not found".to_string(),
                format!("The tracker has no task '{task_id}'."),
                "List tasks with `devflow status`.".to_string(),
            ),
            FlowError::TaskAlreadyInProgress { requested, active } => (
                "Task already in progress".to_string(),
                match requested {
                    Some(requested) => format!(
                        "Cannot start '{requested}' while '{active}' is in progress."
                    ),
                    None => format!("Task '{active}' is in progress."),
                },
                format!("Finish '{active}' with `devflow commit` or block it first."),
            ),
            FlowError::DependencyNotSatisfied { task_id, pending } => (
                "Dependencies not satisfied".to_string(),
                format!(
                    "Task '{task_id}' depends on unfinished tasks: {}.",
                    pending.join(", ")
                ),
                "Complete those tasks first, or run `devflow task next`.".to_string(),
            ),
            FlowError::TaskNotActive { task_id, active } => (
                "Task not active".to_string(),
                match active {
                    Some(active) => {
                        format!("'{task_id}' is not the active task ('{active}' is).")
                    }
                    None => format!("'{task_id}' is not the active task; none is active."),
                },
                "Only the active task can be completed.".to_string(),
            ),
            FlowError::TaskNotStartable { task_id, status } => (
                "Task cannot be started".to_string(),
                format!("Task '{task_id}' is {status}; only pending tasks can start."),
                "Unblock it with `devflow task unblock` if it is blocked.".to_string(),
            ),
            FlowError::TaskNotBlocked { task_id, status } => (
                "Task not blocked".to_string(),
                format!("Task '{task_id}' is {status}."),
                "Only blocked tasks can be unblocked.".to_string(),
            ),
            FlowError::NoPendingTasks { waiting } => (
                "No pending tasks".to_string(),
                if *waiting == 0 {
                    "Every task is completed or blocked.".to_string()
                } else {
                    format!("{waiting} pending task(s) are waiting on dependencies.")
                },
                "Check `devflow status` for blocked tasks.".to_string(),
            ),
            FlowError::NoActiveTask => (
                "Nothing to commit".to_string(),
                "There is no active task and the working tree is clean.".to_string(),
                "Start a task with `devflow task next`.".to_string(),
            ),
            FlowError::BranchProtected { branch } => (
                "Protected branch".to_string(),
                format!("Direct commits to '{branch}' are not allowed for task work."),
                "Start a task to get a feature branch: `devflow task next`.".to_string(),
            ),
            FlowError::HookBlocked { validator, reason } => (
                "Blocked by hook".to_string(),
                format!("{validator}: {reason}"),
                "Resolve the reported problem and try again.".to_string(),
            ),
            FlowError::NotARepository { path } => (
                "Not a git repository".to_string(),
                format!("{} is not inside a git working tree.", path.display()),
                "Run devflow from the repository root, or `git init` first.".to_string(),
            ),
            FlowError::DetachedHead => (
                "Detached HEAD".to_string(),
                "HEAD does not point at a branch.".to_string(),
                "Check out a branch, e.g. `git checkout main`.".to_string(),
            ),
            FlowError::DirtyWorkingTree { entries } => (
                "Working tree not clean".to_string(),
                entries.join("\n"),
                "Commit or stash these changes before starting a task.".to_string(),
            ),
            FlowError::UncommittedChanges { entries } => (
                "Uncommitted changes".to_string(),
                entries.join("\n"),
                "Commit them with `devflow commit` or stash them before syncing.".to_string(),
            ),
            FlowError::PullFailed { branch, stderr } => (
                "Pull failed".to_string(),
                format!("Pulling '{branch}' failed: {stderr}"),
                format!("Resolve the divergence on '{branch}' manually, then retry."),
            ),
            FlowError::PrNotMerged { branch, state } => (
                "Pull request not merged".to_string(),
                match state {
                    Some(state) => format!("The pull request for '{branch}' is {state}."),
                    None => format!("No merged pull request exists for '{branch}'."),
                },
                "Merge the pull request first; sync never discards unmerged work.".to_string(),
            ),
            FlowError::MergeStatusUnavailable { branch, message } => (
                "Merge status unavailable".to_string(),
                format!("Could not check the pull request for '{branch}': {message}"),
                "Check hosting credentials and network access, then retry.".to_string(),
            ),
            FlowError::NotOnTrunk { branch, trunk } => (
                "Not on trunk".to_string(),
                format!("Tasks start from '{trunk}', but '{branch}' is checked out."),
                format!("Run `devflow sync` once '{branch}' is merged, or `git checkout {trunk}`."),
            ),
            FlowError::TaskBranchMismatch {
                branch,
                branch_task,
                task_id,
            } => (
                "Wrong task branch".to_string(),
                format!("'{branch}' holds work for '{branch_task}', but '{task_id}' is active."),
                format!("Check out the branch for '{task_id}' before committing."),
            ),
            FlowError::UnsupportedBranch { branch } => (
                "Unsupported branch".to_string(),
                format!("'{branch}' is not a feature/, plan/, admin/ or trunk branch."),
                "Switch to a task branch or the trunk before syncing.".to_string(),
            ),
            FlowError::GitCommand { command, stderr } => (
                "Git command failed".to_string(),
                format!("git {command}: {stderr}"),
                "Inspect the repository state and retry.".to_string(),
            ),
            FlowError::FinalizeFailed {
                stage,
                task_id,
                commit,
                message,
            } => (
                format!("Task finalization failed at {stage}"),
                message.clone(),
                match (stage, commit) {
                    (FinalizeStage::Commit, _) => format!(
                        "'{task_id}' is already marked completed in the tracker; commit the staged changes manually."
                    ),
                    (_, Some(commit)) => format!(
                        "'{task_id}' is completed and committed locally as {commit}; push and open the pull request manually."
                    ),
                    (_, None) => format!(
                        "'{task_id}' is completed locally; push and open the pull request manually."
                    ),
                },
            ),
            FlowError::CorruptState { path, message } => (
                "Corrupt state file".to_string(),
                format!("{}: {message}", path.display()),
                "Restore the file from git history; devflow does not repair state.".to_string(),
            ),
            FlowError::InvalidSettings { path, message } => (
                "Invalid settings".to_string(),
                format!("{}: {message}", path.display()),
                "Fix the settings file and retry.".to_string(),
            ),
            FlowError::TerminalState { task_id, attempted } => (
                "Completed task is terminal".to_string(),
                format!("Task '{task_id}' is completed; cannot move it to {attempted}."),
                "Completed tasks never change status.".to_string(),
            ),
            FlowError::InvariantViolation { errors } => (
                "Tracker invariant violated".to_string(),
                format!("- {}", errors.join("\n- ")),
                "This update was not written; report the sequence that caused it.".to_string(),
            ),
            FlowError::Io { path, source } => (
                "I/O error".to_string(),
                format!("{}: {source}", path.display()),
                "Check file permissions and disk space.".to_string(),
            ),
            FlowError::Internal(err) => (
                "Internal error".to_string(),
                format!("{err:#}"),
                "Re-run with RUST_LOG=devflow=debug for details.".to_string(),
            ),
        };
        ErrorReport {
            title,
            detail,
            suggestion,
        }
    }
}

impl From<TransitionError> for FlowError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::UnknownTask(task_id) => FlowError::TaskNotFound { task_id },
            TransitionError::AlreadyInProgress { requested, active } => {
                FlowError::TaskAlreadyInProgress {
                    requested: Some(requested),
                    active,
                }
            }
            TransitionError::DependencyNotSatisfied { task_id, pending } => {
                FlowError::DependencyNotSatisfied { task_id, pending }
            }
            TransitionError::NotActive { task_id, active } => {
                FlowError::TaskNotActive { task_id, active }
            }
            TransitionError::NotStartable { task_id, status } => {
                FlowError::TaskNotStartable { task_id, status }
            }
            TransitionError::NotBlocked { task_id, status } => {
                FlowError::TaskNotBlocked { task_id, status }
            }
            TransitionError::Terminal { task_id, attempted } => {
                FlowError::TerminalState { task_id, attempted }
            }
        }
    }
}
