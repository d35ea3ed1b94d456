//! Branch coordination around the task lifecycle.
//!
//! Starting a task moves the repository onto the task's feature branch, cut
//! from an up-to-date trunk. `sync` goes the other way once the work has been
//! merged: back to trunk, pull, delete the topic branch.

use tracing::{debug, info, instrument, warn};

use crate::core::task_id::{BranchKind, branch_name_for, classify_branch};
use crate::error::{FlowError, Result};
use crate::io::config::Settings;
use crate::io::git::Git;
use crate::io::hosting::{HostingClient, PullRequestState};
use crate::io::paths::STATE_DIR;

/// Branch name for `task_id`, or `InvalidTaskId`.
pub fn task_branch(task_id: &str) -> Result<String> {
    branch_name_for(task_id).ok_or_else(|| FlowError::InvalidTaskId {
        value: task_id.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Branch `sync` was invoked on.
    pub from: String,
    pub trunk: String,
    /// Topic branch deleted after its merge was confirmed.
    pub deleted: Option<String>,
    /// False when no remote is configured.
    pub pulled: bool,
}

pub struct BranchCoordinator<'a> {
    git: &'a Git,
    trunk: &'a str,
    remote: &'a str,
    state_prefix: String,
}

impl<'a> BranchCoordinator<'a> {
    pub fn new(git: &'a Git, settings: &'a Settings) -> Self {
        Self {
            git,
            trunk: &settings.trunk,
            remote: &settings.remote,
            state_prefix: format!("{STATE_DIR}/"),
        }
    }

    pub fn trunk(&self) -> &str {
        self.trunk
    }

    /// Fail with `DirtyWorkingTree` if anything outside the state directory
    /// is modified or untracked.
    pub fn ensure_clean(&self) -> Result<()> {
        let dirty = self.git.dirty_entries(&[self.state_prefix.as_str()])?;
        if dirty.is_empty() {
            return Ok(());
        }
        Err(FlowError::DirtyWorkingTree {
            entries: dirty.iter().map(|e| e.render()).collect(),
        })
    }

    /// Fast-forward trunk from the remote. Returns false when there is no
    /// remote to pull from.
    fn pull_trunk(&self) -> Result<bool> {
        if !self.git.has_remote(self.remote)? {
            debug!(remote = self.remote, "remote not configured, skipping pull");
            return Ok(false);
        }
        self.git.pull_ff(self.remote, self.trunk)?;
        Ok(true)
    }

    /// Move to the feature branch for `task_id`, creating it from the latest
    /// trunk when it does not exist yet.
    ///
    /// Must be called from trunk (or the task's own branch). Any other branch
    /// fails `NotOnTrunk` before anything is checked out.
    #[instrument(skip_all, fields(task_id))]
    pub fn start_task_branch(&self, task_id: &str) -> Result<String> {
        let branch = task_branch(task_id)?;
        self.ensure_clean()?;

        let current = self.git.current_branch()?;
        if current == branch {
            debug!(branch, "already on task branch");
            return Ok(branch);
        }
        if current != self.trunk {
            return Err(FlowError::NotOnTrunk {
                branch: current,
                trunk: self.trunk.to_string(),
            });
        }
        self.pull_trunk()?;

        if self.git.branch_exists(&branch)? {
            warn!(branch, "task branch already exists, reusing it");
            self.git.checkout_branch(&branch)?;
        } else {
            self.git.checkout_new_branch(&branch)?;
        }
        info!(branch, "on task branch");
        Ok(branch)
    }

    /// Return to trunk after a topic branch has been merged.
    ///
    /// Merge status comes from the hosting platform when a client is given,
    /// otherwise from git ancestry against the remote (or local) trunk.
    #[instrument(skip_all)]
    pub fn sync(&self, hosting: Option<&dyn HostingClient>) -> Result<SyncOutcome> {
        let branch = self.git.current_branch()?;
        let kind = classify_branch(&branch, self.trunk);
        if kind == BranchKind::Other {
            return Err(FlowError::UnsupportedBranch { branch });
        }

        let dirty = self.git.status_porcelain()?;
        if !dirty.is_empty() {
            return Err(FlowError::UncommittedChanges {
                entries: dirty.iter().map(|e| e.render()).collect(),
            });
        }

        if !kind.is_topic() {
            let pulled = self.pull_trunk()?;
            return Ok(SyncOutcome {
                from: branch,
                trunk: self.trunk.to_string(),
                deleted: None,
                pulled,
            });
        }

        self.ensure_merged(&branch, hosting)?;
        self.git.checkout_branch(self.trunk)?;
        let pulled = self.pull_trunk()?;
        self.git.delete_branch(&branch)?;
        info!(branch, trunk = self.trunk, "synced to trunk");
        Ok(SyncOutcome {
            from: branch.clone(),
            trunk: self.trunk.to_string(),
            deleted: Some(branch),
            pulled,
        })
    }

    fn ensure_merged(&self, branch: &str, hosting: Option<&dyn HostingClient>) -> Result<()> {
        if let Some(client) = hosting {
            let pr = client
                .find_pull_request(branch)
                .map_err(|err| FlowError::MergeStatusUnavailable {
                    branch: branch.to_string(),
                    message: err.to_string(),
                })?;
            return match pr {
                Some(pr) if pr.state == PullRequestState::Merged => Ok(()),
                Some(pr) => Err(FlowError::PrNotMerged {
                    branch: branch.to_string(),
                    state: Some(pr.state.as_str().to_string()),
                }),
                None => Err(FlowError::PrNotMerged {
                    branch: branch.to_string(),
                    state: None,
                }),
            };
        }

        let target = if self.git.has_remote(self.remote)? {
            self.git.fetch(self.remote)?;
            let remote_trunk = format!("{}/{}", self.remote, self.trunk);
            if self.git.ref_exists(&remote_trunk)? {
                remote_trunk
            } else {
                self.trunk.to_string()
            }
        } else {
            self.trunk.to_string()
        };
        debug!(branch, target, "checking merge by ancestry");
        if self.git.is_ancestor(branch, &target)? {
            Ok(())
        } else {
            Err(FlowError::PrNotMerged {
                branch: branch.to_string(),
                state: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeHosting, TestRepo};

    fn coordinator_parts() -> (TestRepo, Git, Settings) {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        (repo, git, Settings::default())
    }

    #[test]
    fn task_branch_rejects_bad_ids() {
        assert_eq!(task_branch("TASK-003").expect("branch"), "feature/task-003");
        assert!(matches!(
            task_branch("TASK-3"),
            Err(FlowError::InvalidTaskId { .. })
        ));
    }

    #[test]
    fn start_creates_branch_from_trunk_ignoring_state_dir() {
        let (repo, git, settings) = coordinator_parts();
        repo.write(".devflow/active_plan", "plan-1\n").expect("write");
        let branches = BranchCoordinator::new(&git, &settings);

        let branch = branches.start_task_branch("TASK-001").expect("start");
        assert_eq!(branch, "feature/task-001");
        assert_eq!(git.current_branch().expect("current"), "feature/task-001");
    }

    #[test]
    fn start_refuses_dirty_tree() {
        let (repo, git, settings) = coordinator_parts();
        repo.write("src/lib.rs", "fn main() {}\n").expect("write");
        let branches = BranchCoordinator::new(&git, &settings);

        let err = branches.start_task_branch("TASK-001").expect_err("dirty");
        match err {
            FlowError::DirtyWorkingTree { entries } => {
                assert_eq!(entries, vec!["?? src/lib.rs".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(git.current_branch().expect("current"), "main");
    }

    #[test]
    fn start_refuses_other_branch_without_checkout() {
        let (repo, git, settings) = coordinator_parts();
        repo.git(&["checkout", "-b", "feature/task-001"]).expect("branch");
        repo.write("a.txt", "a\n").expect("write");
        repo.commit_all("work").expect("commit");
        let branches = BranchCoordinator::new(&git, &settings);

        match branches.start_task_branch("TASK-002") {
            Err(FlowError::NotOnTrunk { branch, trunk }) => {
                assert_eq!(branch, "feature/task-001");
                assert_eq!(trunk, "main");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(git.current_branch().expect("current"), "feature/task-001");
        assert!(!git.branch_exists("feature/task-002").expect("exists"));
        assert!(repo.root().join("a.txt").is_file());
    }

    #[test]
    fn start_reuses_existing_branch() {
        let (repo, git, settings) = coordinator_parts();
        repo.git(&["branch", "feature/task-002"]).expect("branch");
        let branches = BranchCoordinator::new(&git, &settings);
        branches.start_task_branch("TASK-002").expect("start");
        assert_eq!(git.current_branch().expect("current"), "feature/task-002");
    }

    #[test]
    fn sync_rejects_unsupported_branch() {
        let (repo, git, settings) = coordinator_parts();
        repo.git(&["checkout", "-b", "experiment"]).expect("branch");
        let branches = BranchCoordinator::new(&git, &settings);
        assert!(matches!(
            branches.sync(None),
            Err(FlowError::UnsupportedBranch { .. })
        ));
    }

    #[test]
    fn sync_keeps_unmerged_branch() {
        let (repo, git, settings) = coordinator_parts();
        repo.git(&["checkout", "-b", "feature/task-001"]).expect("branch");
        repo.write("a.txt", "a\n").expect("write");
        repo.commit_all("work").expect("commit");
        let branches = BranchCoordinator::new(&git, &settings);

        assert!(matches!(
            branches.sync(None),
            Err(FlowError::PrNotMerged { state: None, .. })
        ));
        assert_eq!(git.current_branch().expect("current"), "feature/task-001");
    }

    #[test]
    fn sync_deletes_branch_merged_locally() {
        let (repo, git, settings) = coordinator_parts();
        repo.git(&["checkout", "-b", "feature/task-001"]).expect("branch");
        repo.write("a.txt", "a\n").expect("write");
        repo.commit_all("work").expect("commit");
        repo.git(&["checkout", "main"]).expect("checkout");
        repo.git(&["merge", "--quiet", "--ff-only", "feature/task-001"])
            .expect("merge");
        repo.git(&["checkout", "feature/task-001"]).expect("checkout");

        let branches = BranchCoordinator::new(&git, &settings);
        let outcome = branches.sync(None).expect("sync");
        assert_eq!(outcome.deleted.as_deref(), Some("feature/task-001"));
        assert!(!outcome.pulled);
        assert_eq!(git.current_branch().expect("current"), "main");
        assert!(!git.branch_exists("feature/task-001").expect("exists"));
    }

    #[test]
    fn sync_consults_hosting_for_merge_state() {
        let (repo, git, settings) = coordinator_parts();
        repo.git(&["checkout", "-b", "feature/task-001"]).expect("branch");
        let fake = FakeHosting::new();
        fake.set_pull_request_state("feature/task-001", PullRequestState::Open);
        let branches = BranchCoordinator::new(&git, &settings);

        match branches.sync(Some(&fake)) {
            Err(FlowError::PrNotMerged { state, .. }) => assert_eq!(state.as_deref(), Some("open")),
            other => panic!("unexpected {other:?}"),
        }

        fake.set_pull_request_state("feature/task-001", PullRequestState::Merged);
        let outcome = branches.sync(Some(&fake)).expect("sync");
        assert_eq!(outcome.deleted.as_deref(), Some("feature/task-001"));
    }

    #[test]
    fn sync_reports_unreachable_hosting() {
        let (repo, git, settings) = coordinator_parts();
        repo.git(&["checkout", "-b", "feature/task-001"]).expect("branch");
        let fake = FakeHosting::failing();
        let branches = BranchCoordinator::new(&git, &settings);
        assert!(matches!(
            branches.sync(Some(&fake)),
            Err(FlowError::MergeStatusUnavailable { .. })
        ));
    }
}
