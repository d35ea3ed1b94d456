//! Canonical locations within `.devflow/` for a project root.

use std::path::{Path, PathBuf};

/// Name of the state directory at the repository root.
pub const STATE_DIR: &str = ".devflow";

/// All canonical paths within `.devflow/` for a project root.
#[derive(Debug, Clone)]
pub struct FlowPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub plans_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub active_plan_path: PathBuf,
    pub settings_path: PathBuf,
    pub local_settings_path: PathBuf,
    pub test_log_path: PathBuf,
}

impl FlowPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR);
        let logs_dir = state_dir.join("logs");
        Self {
            root: root.clone(),
            plans_dir: state_dir.join("plans"),
            gitignore_path: state_dir.join(".gitignore"),
            active_plan_path: state_dir.join("active_plan"),
            settings_path: state_dir.join("settings.toml"),
            local_settings_path: state_dir.join("settings.local.toml"),
            test_log_path: logs_dir.join("tests.log"),
            logs_dir,
            state_dir,
        }
    }

    pub fn plan_dir(&self, plan_id: &str) -> PathBuf {
        self.plans_dir.join(plan_id)
    }

    pub fn requirements_path(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("requirements.md")
    }

    pub fn plan_spec_path(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("plan.json")
    }

    pub fn lock_path(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("plan.lock")
    }

    pub fn tracker_path(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("tasks.json")
    }

    /// Path relative to the repository root, with `/` separators, for git.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Git status prefix that matches every devflow-owned file.
    pub fn state_prefix(&self) -> String {
        format!("{STATE_DIR}/")
    }
}
