//! Plan generation and locking.
//!
//! `generate` records the requirements and makes a fresh plan active. The plan
//! specification (`plan.json`) is produced outside devflow; `lock` validates
//! it, freezes its task list into the tracker and writes the lock marker.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::error::{FlowError, Result};
use crate::io::atomic::write_atomic;
use crate::io::paths::FlowPaths;
use crate::io::plan_store::PlanStore;
use crate::io::tracker_store::FileTrackerStore;
use crate::tracker::TaskTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOutcome {
    pub plan_id: String,
    pub requirements_path: PathBuf,
    /// Where the plan specification is expected before locking.
    pub spec_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOutcome {
    pub plan_id: String,
    pub project_name: String,
    pub task_count: usize,
    pub tracker_path: PathBuf,
}

/// Plan id for `now`: `plan-YYYYMMDD-HHMMSS`, suffixed `-2`, `-3`, ... while
/// taken.
fn new_plan_id(store: &PlanStore, now: DateTime<Utc>) -> String {
    let base = format!("plan-{}", now.format("%Y%m%d-%H%M%S"));
    if !store.plan_exists(&base) {
        return base;
    }
    (2u32..)
        .map(|n| format!("{base}-{n}"))
        .find(|id| !store.plan_exists(id))
        .unwrap_or(base)
}

/// Record `requirements` under a fresh plan id and make that plan active.
#[instrument(skip_all)]
pub fn generate_plan(
    store: &PlanStore,
    requirements: &str,
    now: DateTime<Utc>,
) -> Result<GenerateOutcome> {
    if requirements.trim().is_empty() {
        return Err(FlowError::NoRequirements);
    }
    if let Some(active) = store.active_plan_id()? {
        if !store.is_locked(&active) {
            return Err(FlowError::ActivePlanExists { plan_id: active });
        }
    }

    let plan_id = new_plan_id(store, now);
    store.write_requirements(&plan_id, requirements)?;
    ensure_state_gitignore(store.paths())?;
    store.set_active_plan(&plan_id)?;

    let paths = store.paths();
    info!(plan_id, "plan generated");
    Ok(GenerateOutcome {
        requirements_path: paths.requirements_path(&plan_id),
        spec_path: paths.plan_spec_path(&plan_id),
        plan_id,
    })
}

/// Validate and lock `plan_id` (default: the active plan), creating its
/// tracker. The locked plan becomes the active plan.
#[instrument(skip_all)]
pub fn lock_plan(
    store: &PlanStore,
    plan_id: Option<&str>,
    default_project: &str,
    now: DateTime<Utc>,
) -> Result<LockOutcome> {
    let plan_id = match plan_id {
        Some(id) => id.trim().to_string(),
        None => store.require_active()?,
    };
    if store.is_locked(&plan_id) {
        return Err(FlowError::AlreadyLocked { plan_id });
    }

    let spec = store.load_spec(&plan_id)?;
    let project_name = spec
        .project_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| default_project.to_string());
    let tracker = TaskTracker::from_plan(&plan_id, &project_name, &spec.tasks);

    let tracker_path = store.paths().tracker_path(&plan_id);
    FileTrackerStore::new(plan_id.clone(), tracker_path.clone()).create(&tracker)?;
    store.write_lock_marker(&plan_id, now)?;
    store.set_active_plan(&plan_id)?;

    info!(plan_id, tasks = tracker.task_files.len(), "plan locked");
    Ok(LockOutcome {
        task_count: tracker.task_files.len(),
        plan_id,
        project_name,
        tracker_path,
    })
}

/// Keep machine-local state (test logs, local settings) out of git.
fn ensure_state_gitignore(paths: &FlowPaths) -> Result<()> {
    const REQUIRED_LINES: [&str; 2] = ["logs/", "settings.local.toml"];

    let path = &paths.gitignore_path;
    let existing = if path.exists() {
        fs::read_to_string(path).map_err(|err| FlowError::io(path, err))?
    } else {
        String::new()
    };

    let mut lines: Vec<String> = existing
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    for required in REQUIRED_LINES {
        if !lines.iter().any(|line| line == required) {
            lines.push(required.to_string());
        }
    }
    lines.sort();
    lines.dedup();

    let mut out = lines.join("\n");
    out.push('\n');
    if out != existing {
        debug!(path = %path.display(), "updating state .gitignore");
        write_atomic(path, &out)?;
    }
    Ok(())
}
