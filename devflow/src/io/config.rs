//! Layered devflow settings.
//!
//! Settings come from `.devflow/settings.toml` (shared, committed), overlaid by
//! `.devflow/settings.local.toml` (git-ignored), overlaid by environment
//! variables. Missing fields default to values that work for a plain GitHub
//! repository on `main`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::io::paths::FlowPaths;
use crate::io::platform::Platform;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Display name; defaults to the repository directory name.
    pub project_name: Option<String>,

    /// Integration branch that task branches start from and merge into.
    pub trunk: String,

    /// Remote used for pull, push and platform detection.
    pub remote: String,

    /// Create a feature branch when a task starts.
    pub create_branches: bool,

    pub hosting: HostingSettings,
    pub issues: IssueSettings,
    pub hooks: HookSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostingSettings {
    /// Forced platform; auto-detected from the remote URL when unset.
    pub platform: Option<Platform>,
    /// GitHub owner or Azure DevOps organization.
    pub owner: Option<String>,
    /// Azure DevOps project (unused for GitHub).
    pub project: Option<String>,
    pub repo: Option<String>,
    /// API token. Prefer the environment for secrets.
    pub token: Option<String>,
    /// Override for the API base URL (GitHub Enterprise, tests).
    pub api_url: Option<String>,
    /// Azure work item type used for task issues.
    pub work_item_type: String,
    /// Azure state used when closing work items.
    pub closed_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IssueSettings {
    pub enabled: bool,
    pub close_on_complete: bool,
    pub phase_labels: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookSettings {
    /// Paths (prefixes) that may be edited without an active task.
    pub exempt_paths: Vec<String>,
    /// When non-empty, edits are restricted to these directories.
    pub allowed_dirs: Vec<String>,
    /// Command run before a commit is accepted (e.g. `["cargo","test"]`).
    pub test_command: Vec<String>,
    pub test_timeout_secs: u64,
    /// Truncate the test log beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Directories whose component files need test and story companions.
    pub ui_component_dirs: Vec<String>,
    pub ui_extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: None,
            trunk: "main".to_string(),
            remote: "origin".to_string(),
            create_branches: true,
            hosting: HostingSettings::default(),
            issues: IssueSettings::default(),
            hooks: HookSettings::default(),
        }
    }
}

impl Default for HostingSettings {
    fn default() -> Self {
        Self {
            platform: None,
            owner: None,
            project: None,
            repo: None,
            token: None,
            api_url: None,
            work_item_type: "Task".to_string(),
            closed_state: "Done".to_string(),
        }
    }
}

impl Default for IssueSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            close_on_complete: true,
            phase_labels: true,
        }
    }
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            exempt_paths: vec![
                ".devflow/".to_string(),
                "docs/".to_string(),
                "README.md".to_string(),
                "CLAUDE.md".to_string(),
            ],
            allowed_dirs: Vec::new(),
            test_command: Vec::new(),
            test_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            ui_component_dirs: vec!["src/components".to_string()],
            ui_extensions: ["tsx", "jsx", "vue", "svelte"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl HookSettings {
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

impl Settings {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trunk.trim().is_empty() {
            return Err("trunk must not be empty".to_string());
        }
        if self.remote.trim().is_empty() {
            return Err("remote must not be empty".to_string());
        }
        if self.hooks.test_timeout_secs == 0 {
            return Err("hooks.test_timeout_secs must be > 0".to_string());
        }
        if self.hooks.output_limit_bytes == 0 {
            return Err("hooks.output_limit_bytes must be > 0".to_string());
        }
        if self
            .hooks
            .test_command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err("hooks.test_command must start with a program".to_string());
        }
        Ok(())
    }
}

/// Environment variables consulted by [`load_settings`].
pub const ENV_TOKEN: &str = "DEVFLOW_TOKEN";
pub const ENV_PLATFORM: &str = "DEVFLOW_PLATFORM";
pub const ENV_OWNER: &str = "DEVFLOW_REPO_OWNER";
pub const ENV_PROJECT: &str = "DEVFLOW_REPO_PROJECT";
pub const ENV_REPO: &str = "DEVFLOW_REPO_NAME";

/// Load layered settings: environment > local file > shared file > defaults.
///
/// `env` is injected so tests never depend on the process environment.
pub fn load_settings(paths: &FlowPaths, env: &dyn Fn(&str) -> Option<String>) -> Result<Settings> {
    let mut merged = toml::Table::new();
    for path in [&paths.settings_path, &paths.local_settings_path] {
        if let Some(table) = read_table(path)? {
            debug!(path = %path.display(), "merging settings layer");
            merge_tables(&mut merged, table);
        }
    }

    let invalid = |message: String| FlowError::InvalidSettings {
        path: paths.settings_path.clone(),
        message,
    };
    let merged = toml::to_string(&merged).map_err(|err| invalid(err.to_string()))?;
    let mut settings: Settings =
        toml::from_str(&merged).map_err(|err| invalid(err.to_string()))?;

    apply_env(&mut settings, env).map_err(invalid)?;
    settings.validate().map_err(invalid)?;
    Ok(settings)
}

fn read_table(path: &Path) -> Result<Option<toml::Table>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|err| FlowError::io(path, err))?;
    let table = contents
        .parse::<toml::Table>()
        .map_err(|err| FlowError::InvalidSettings {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    Ok(Some(table))
}

/// Deep-merge `overlay` into `base`; nested tables merge, other values replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env(
    settings: &mut Settings,
    env: &dyn Fn(&str) -> Option<String>,
) -> std::result::Result<(), String> {
    let non_empty = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    if let Some(value) = non_empty(ENV_PLATFORM) {
        settings.hosting.platform = Some(value.parse()?);
    }
    if let Some(value) = non_empty(ENV_OWNER) {
        settings.hosting.owner = Some(value);
    }
    if let Some(value) = non_empty(ENV_PROJECT) {
        settings.hosting.project = Some(value);
    }
    if let Some(value) = non_empty(ENV_REPO) {
        settings.hosting.repo = Some(value);
    }
    if let Some(value) = non_empty(ENV_TOKEN) {
        settings.hosting.token = Some(value);
    }
    Ok(())
}
