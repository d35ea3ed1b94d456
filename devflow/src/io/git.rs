//! Git adapter for devflow commands.
//!
//! devflow drives branches, commits and pushes around the task lifecycle, so we
//! keep a small, explicit wrapper around `git` subprocess calls. Failures carry
//! the git command and its stderr.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context;
use tracing::{debug, instrument, warn};

use crate::core::types::StatusEntry;
use crate::error::{FlowError, Result};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let output = self.run(&["symbolic-ref", "--short", "-q", "HEAD"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.trim().is_empty() {
                warn!("detached HEAD detected");
                return Err(FlowError::DetachedHead);
            }
            return Err(self.command_error(&["symbolic-ref", "HEAD"], &stderr));
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Return the HEAD commit SHA, abbreviated when `short` is set.
    pub fn head_sha(&self, short: bool) -> Result<String> {
        let args: &[&str] = if short {
            &["rev-parse", "--short", "HEAD"]
        } else {
            &["rev-parse", "HEAD"]
        };
        Ok(self.run_capture(args)?.trim().to_string())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Status entries outside the given path prefixes.
    #[instrument(skip_all)]
    pub fn dirty_entries(&self, allowed_prefixes: &[&str]) -> Result<Vec<StatusEntry>> {
        let entries = self.status_porcelain()?;
        let disallowed: Vec<StatusEntry> = entries
            .into_iter()
            .filter(|entry| {
                !allowed_prefixes
                    .iter()
                    .any(|prefix| entry.path.starts_with(prefix))
            })
            .collect();
        if disallowed.is_empty() {
            debug!("worktree is clean");
        } else {
            debug!(disallowed_count = disallowed.len(), "worktree not clean");
        }
        Ok(disallowed)
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Check whether any ref (`origin/main`, a SHA, ...) resolves.
    pub fn ref_exists(&self, reference: &str) -> Result<bool> {
        let arg = format!("{reference}^{{commit}}");
        let status = self.run(&["rev-parse", "--verify", "--quiet", &arg])?.status;
        Ok(status.success())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Force-delete a local branch (merge state is checked by the caller).
    #[instrument(skip_all, fields(branch))]
    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "deleting local branch");
        self.run_checked(&["branch", "-D", branch])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run_capture(&["diff", "--cached", "--name-only"])?;
        Ok(!out.trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    pub fn has_remote(&self, remote: &str) -> Result<bool> {
        Ok(self.remote_url(remote)?.is_some())
    }

    /// Fetch URL of `remote`, or `None` when it is not configured.
    pub fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let output = self.run(&["remote", "get-url", remote])?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }

    /// Fast-forward `branch` from `remote`.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn pull_ff(&self, remote: &str, branch: &str) -> Result<()> {
        debug!(remote, branch, "pulling (fast-forward only)");
        let output = self.run(&["pull", "--ff-only", remote, branch])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(branch, "pull failed");
            return Err(FlowError::PullFailed {
                branch: branch.to_string(),
                stderr,
            });
        }
        Ok(())
    }

    /// Push `branch` to `remote` and set it as upstream.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn push_upstream(&self, remote: &str, branch: &str) -> Result<()> {
        debug!(remote, branch, "pushing");
        self.run_checked(&["push", "-u", remote, branch])?;
        Ok(())
    }

    pub fn fetch(&self, remote: &str) -> Result<()> {
        self.run_checked(&["fetch", "--quiet", remote])?;
        Ok(())
    }

    /// True if `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let args = ["merge-base", "--is-ancestor", ancestor, descendant];
        let output = self.run(&args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.command_error(&args, &String::from_utf8_lossy(&output.stderr))),
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.command_error(args, &stderr));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        Ok(output)
    }

    fn command_error(&self, args: &[&str], stderr: &str) -> FlowError {
        let stderr = stderr.trim();
        if stderr.contains("not a git repository") {
            return FlowError::NotARepository {
                path: self.workdir.clone(),
            };
        }
        FlowError::GitCommand {
            command: args.join(" "),
            stderr: stderr.to_string(),
        }
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: unquote(path.trim()),
        });
    }
    if line.len() < 4 || !line.is_char_boundary(2) || !line.is_char_boundary(3) {
        return Err(FlowError::GitCommand {
            command: "status --porcelain".to_string(),
            stderr: format!("unexpected porcelain line: '{line}'"),
        });
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once(" -> ") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry {
        code,
        path: unquote(&path),
    })
}

fn unquote(path: &str) -> String {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_modified_line() {
        let e = parse_status_line(" M src/main.rs").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: " M".to_string(),
                path: "src/main.rs".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn parses_quoted_path() {
        let e = parse_status_line("?? \"with space.txt\"").expect("parse");
        assert_eq!(e.path, "with space.txt");
    }

    #[test]
    fn detached_head_is_reported() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        assert_eq!(git.current_branch().expect("branch"), "main");

        let sha = git.head_sha(false).expect("sha");
        repo.git(&["checkout", "--detach", &sha]).expect("detach");
        assert!(matches!(git.current_branch(), Err(FlowError::DetachedHead)));
    }

    #[test]
    fn not_a_repository_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        assert!(matches!(
            git.status_porcelain(),
            Err(FlowError::NotARepository { .. })
        ));
    }

    #[test]
    fn dirty_entries_skip_allowed_prefixes() {
        let repo = TestRepo::new().expect("repo");
        repo.write(".devflow/active_plan", "plan-1\n").expect("write");
        repo.write("src/lib.rs", "// change\n").expect("write");

        let git = Git::new(repo.root());
        let dirty = git.dirty_entries(&[".devflow/"]).expect("dirty");
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].path, "src/lib.rs");
    }

    #[test]
    fn ancestry_and_branch_deletion() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        git.checkout_new_branch("feature/task-001").expect("branch");
        repo.write("a.txt", "a\n").expect("write");
        git.add_all().expect("add");
        assert!(git.commit_staged("add a").expect("commit"));
        assert!(!git.is_ancestor("feature/task-001", "main").expect("ancestor"));
        assert!(git.is_ancestor("main", "feature/task-001").expect("ancestor"));

        git.checkout_branch("main").expect("checkout");
        git.delete_branch("feature/task-001").expect("delete");
        assert!(!git.branch_exists("feature/task-001").expect("exists"));
        assert!(!git.has_remote("origin").expect("remote"));
    }
}
