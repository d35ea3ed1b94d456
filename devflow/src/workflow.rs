//! Per-invocation context shared by the orchestration modules.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::branch::BranchCoordinator;
use crate::error::{FlowError, Result};
use crate::hooks::{Action, HookContext, relative_to};
use crate::io::config::{Settings, load_settings};
use crate::io::git::Git;
use crate::io::guards::TestRequest;
use crate::io::hosting::{HostingClient, build_client};
use crate::io::paths::FlowPaths;
use crate::io::plan_store::PlanStore;
use crate::io::platform::{RepoIdentity, resolve_identity, resolve_token};
use crate::io::tracker_store::{FileTrackerStore, TrackerStore};
use crate::issue_sync::IssueSync;
use crate::task::TaskLifecycle;

/// Paths, settings, git handle and (optionally) a hosting client for one
/// repository. Built once at startup and passed down explicitly.
pub struct Workflow {
    paths: FlowPaths,
    settings: Settings,
    git: Git,
    identity: Option<RepoIdentity>,
    hosting: Option<Box<dyn HostingClient>>,
}

impl Workflow {
    /// Load settings from disk and the process environment.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        Self::load_with_env(root, &|key| std::env::var(key).ok())
    }

    /// Load settings and resolve the hosting platform.
    ///
    /// A missing token or unknown platform disables hosting; it is not an error.
    pub fn load_with_env(
        root: impl Into<PathBuf>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let paths = FlowPaths::new(root);
        let settings = load_settings(&paths, env)?;
        let git = Git::new(&paths.root);

        let remote_url = git.remote_url(&settings.remote)?;
        let identity = resolve_identity(&settings.hosting, remote_url.as_deref());
        let hosting = match &identity {
            None => {
                debug!("no hosting platform resolved");
                None
            }
            Some(identity) => {
                let token = resolve_token(&settings.hosting, identity.platform, env);
                match build_client(identity, &settings.hosting, token) {
                    Ok(client) => Some(client),
                    Err(err) => {
                        warn!(error = %err, platform = %identity.platform, "hosting disabled");
                        None
                    }
                }
            }
        };

        Ok(Self {
            paths,
            settings,
            git,
            identity,
            hosting,
        })
    }

    /// Context with explicit settings and hosting client.
    pub fn new(
        root: impl Into<PathBuf>,
        settings: Settings,
        hosting: Option<Box<dyn HostingClient>>,
    ) -> Self {
        let paths = FlowPaths::new(root);
        let git = Git::new(&paths.root);
        Self {
            paths,
            settings,
            git,
            identity: None,
            hosting,
        }
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn paths(&self) -> &FlowPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn identity(&self) -> Option<&RepoIdentity> {
        self.identity.as_ref()
    }

    pub fn hosting(&self) -> Option<&dyn HostingClient> {
        self.hosting.as_deref()
    }

    pub fn plans(&self) -> PlanStore {
        PlanStore::new(self.paths.clone())
    }

    /// Configured project name, else the repository directory name.
    pub fn project_name(&self) -> String {
        self.settings
            .project_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                self.paths
                    .root
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "project".to_string())
    }

    /// Tracker store of the active plan.
    ///
    /// Fails `NoActivePlan` without a pointer and `TaskTrackerNotFound` when
    /// the plan has not been locked.
    pub fn tracker_store(&self) -> Result<FileTrackerStore> {
        let plan_id = self.plans().require_active()?;
        let path = self.paths.tracker_path(&plan_id);
        let store = FileTrackerStore::new(plan_id.clone(), path.clone());
        if !store.exists() {
            return Err(FlowError::TaskTrackerNotFound { plan_id, path });
        }
        Ok(store)
    }

    pub fn issue_sync(&self) -> IssueSync<'_> {
        IssueSync::new(self.hosting(), &self.settings.issues)
    }

    pub fn branches(&self) -> BranchCoordinator<'_> {
        BranchCoordinator::new(&self.git, &self.settings)
    }

    /// Lifecycle over the active plan's tracker, with branching as configured.
    pub fn lifecycle(&self) -> Result<TaskLifecycle<'_, FileTrackerStore>> {
        Ok(self.lifecycle_with(self.tracker_store()?, self.issue_sync()))
    }

    pub fn lifecycle_with<'a, S: TrackerStore>(
        &'a self,
        store: S,
        issues: IssueSync<'a>,
    ) -> TaskLifecycle<'a, S> {
        let branches = self.settings.create_branches.then(|| self.branches());
        TaskLifecycle::new(store, issues, branches)
    }

    /// Test-command request built from the hook settings.
    pub fn test_request(&self) -> TestRequest {
        TestRequest {
            command: self.settings.hooks.test_command.clone(),
            workdir: self.paths.root.clone(),
            log_path: self.paths.test_log_path.clone(),
            timeout: self.settings.hooks.test_timeout(),
            output_limit_bytes: self.settings.hooks.output_limit_bytes,
        }
    }

    /// Gather the validator context for `action`.
    ///
    /// A missing plan or tracker means no active task; outside a git
    /// repository there is no branch and no changed files.
    pub fn hook_context(&self, action: Action) -> Result<HookContext<'_>> {
        let action = match action {
            Action::EditFile { path } => Action::EditFile {
                path: relative_to(&self.paths.root, &path),
            },
            other => other,
        };

        let active_task = match self.tracker_store() {
            Ok(store) => store.load()?.active_task().cloned(),
            Err(FlowError::NoActivePlan | FlowError::TaskTrackerNotFound { .. }) => None,
            Err(err) => return Err(err),
        };

        let branch = match self.git.current_branch() {
            Ok(branch) => Some(branch),
            Err(FlowError::DetachedHead | FlowError::NotARepository { .. }) => None,
            Err(err) => return Err(err),
        };

        let changed_files = if action == Action::Commit {
            self.git
                .status_porcelain()?
                .into_iter()
                .map(|entry| entry.path)
                .collect()
        } else {
            Vec::new()
        };

        Ok(HookContext::new(action, &self.paths.root, &self.settings)
            .with_active_task(active_task)
            .with_branch(branch)
            .with_changed_files(changed_files))
    }
}
