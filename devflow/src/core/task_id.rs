//! Task identifiers and the branch names derived from them.
//!
//! Task ids have the canonical form `TASK-NNN` (three zero-padded digits).
//! Branch names are a pure function of the id, so the mapping is stable across
//! runs and two distinct tasks never share a branch.

use std::sync::LazyLock;

use regex::Regex;

static CANONICAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^TASK-[0-9]{3}$").expect("canonical task id regex"));
static ANY_CASE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^task-([0-9]{3})$").expect("task id regex"));

pub const FEATURE_PREFIX: &str = "feature/";
pub const PLAN_PREFIX: &str = "plan/";
pub const ADMIN_PREFIX: &str = "admin/";

/// True if `value` is exactly `TASK-NNN`.
pub fn is_canonical_task_id(value: &str) -> bool {
    CANONICAL_ID.is_match(value)
}

/// Normalize user input (`task-007`, ` TASK-007 `) to `TASK-007`.
pub fn normalize_task_id(value: &str) -> Option<String> {
    let caps = ANY_CASE_ID.captures(value.trim())?;
    Some(format!("TASK-{}", &caps[1]))
}

/// Deterministic branch name for a task: `TASK-NNN → feature/task-NNN`.
pub fn branch_name_for(task_id: &str) -> Option<String> {
    let canonical = normalize_task_id(task_id)?;
    Some(format!("{FEATURE_PREFIX}{}", canonical.to_ascii_lowercase()))
}

/// Inverse of [`branch_name_for`], for branches devflow created.
pub fn task_id_from_branch(branch: &str) -> Option<String> {
    let rest = branch.strip_prefix(FEATURE_PREFIX)?;
    normalize_task_id(rest)
}

/// Branch categories that `sync` knows how to clean up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Trunk,
    Feature,
    Plan,
    Admin,
    Other,
}

impl BranchKind {
    /// Topic branches are merged through a pull request and deleted afterward.
    pub fn is_topic(self) -> bool {
        matches!(self, BranchKind::Feature | BranchKind::Plan | BranchKind::Admin)
    }
}

pub fn classify_branch(branch: &str, trunk: &str) -> BranchKind {
    if branch == trunk {
        BranchKind::Trunk
    } else if branch.starts_with(FEATURE_PREFIX) {
        BranchKind::Feature
    } else if branch.starts_with(PLAN_PREFIX) {
        BranchKind::Plan
    } else if branch.starts_with(ADMIN_PREFIX) {
        BranchKind::Admin
    } else {
        BranchKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn branch_name_is_stable_lowercase_feature_branch() {
        assert_eq!(
            branch_name_for("TASK-007").as_deref(),
            Some("feature/task-007")
        );
        assert_eq!(branch_name_for("TASK-007"), branch_name_for("TASK-007"));
        assert_eq!(
            branch_name_for("task-007").as_deref(),
            Some("feature/task-007")
        );
    }

    #[test]
    fn branch_name_is_injective_over_ids() {
        let branches: HashSet<String> = (0..1000)
            .map(|n| branch_name_for(&format!("TASK-{n:03}")).expect("valid id"))
            .collect();
        assert_eq!(branches.len(), 1000);
    }

    #[test]
    fn rejects_malformed_ids() {
        for value in ["TASK-7", "TASK-0007", "TSK-001", "TASK-00a", ""] {
            assert_eq!(branch_name_for(value), None, "{value}");
        }
        assert!(!is_canonical_task_id("task-001"));
        assert!(is_canonical_task_id("TASK-001"));
    }

    #[test]
    fn task_id_round_trips_through_branch() {
        assert_eq!(
            task_id_from_branch("feature/task-042").as_deref(),
            Some("TASK-042")
        );
        assert_eq!(task_id_from_branch("feature/login"), None);
        assert_eq!(task_id_from_branch("main"), None);
    }

    #[test]
    fn classifies_branches() {
        assert_eq!(classify_branch("main", "main"), BranchKind::Trunk);
        assert_eq!(
            classify_branch("feature/task-001", "main"),
            BranchKind::Feature
        );
        assert_eq!(classify_branch("plan/v2", "main"), BranchKind::Plan);
        assert_eq!(classify_branch("admin/ci", "main"), BranchKind::Admin);
        assert_eq!(classify_branch("hotfix", "main"), BranchKind::Other);
        assert!(!BranchKind::Trunk.is_topic());
        assert!(BranchKind::Admin.is_topic());
    }
}
