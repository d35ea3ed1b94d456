//! Plan artifacts on disk: requirements, specification, lock marker and the
//! active-plan pointer.

use std::fs;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

use crate::core::plan_validator::validate_plan_spec;
use crate::core::types::{Plan, PlanSpec};
use crate::error::{FlowError, Result};
use crate::io::atomic::{write_atomic, write_json_atomic};
use crate::io::paths::FlowPaths;
use crate::io::schema::{PLAN_SCHEMA, schema_errors};

#[derive(Debug, Clone)]
pub struct PlanStore {
    paths: FlowPaths,
}

impl PlanStore {
    pub fn new(paths: FlowPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &FlowPaths {
        &self.paths
    }

    /// Plan id from the active-plan pointer, if one is set.
    pub fn active_plan_id(&self) -> Result<Option<String>> {
        let path = &self.paths.active_plan_path;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path).map_err(|err| FlowError::io(path, err))?;
        let id = contents.trim();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }

    /// Active plan id, or `NoActivePlan`.
    pub fn require_active(&self) -> Result<String> {
        self.active_plan_id()?.ok_or(FlowError::NoActivePlan)
    }

    pub fn set_active_plan(&self, plan_id: &str) -> Result<()> {
        debug!(plan_id, "setting active plan");
        write_atomic(&self.paths.active_plan_path, &format!("{plan_id}\n"))
    }

    pub fn plan_exists(&self, plan_id: &str) -> bool {
        self.paths.plan_dir(plan_id).is_dir()
    }

    pub fn is_locked(&self, plan_id: &str) -> bool {
        self.paths.lock_path(plan_id).is_file()
    }

    /// Timestamp stored in the lock marker.
    pub fn locked_at(&self, plan_id: &str) -> Result<Option<DateTime<Utc>>> {
        let path = self.paths.lock_path(plan_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|err| FlowError::io(&path, err))?;
        let at = DateTime::parse_from_rfc3339(contents.trim()).map_err(|err| {
            FlowError::CorruptState {
                path: path.clone(),
                message: format!("lock marker is not an RFC 3339 timestamp: {err}"),
            }
        })?;
        Ok(Some(at.with_timezone(&Utc)))
    }

    pub fn write_requirements(&self, plan_id: &str, text: &str) -> Result<()> {
        let mut contents = text.trim_end().to_string();
        contents.push('\n');
        write_atomic(&self.paths.requirements_path(plan_id), &contents)
    }

    pub fn read_requirements(&self, plan_id: &str) -> Result<String> {
        let path = self.paths.requirements_path(plan_id);
        fs::read_to_string(&path).map_err(|err| FlowError::io(&path, err))
    }

    /// Write a plan specification (the AI normally produces this file).
    pub fn write_spec(&self, plan_id: &str, spec: &PlanSpec) -> Result<()> {
        write_json_atomic(&self.paths.plan_spec_path(plan_id), spec)
    }

    /// Load and validate the plan specification (schema + semantic rules).
    pub fn load_spec(&self, plan_id: &str) -> Result<PlanSpec> {
        let path = self.paths.plan_spec_path(plan_id);
        if !path.is_file() {
            return Err(FlowError::PlanFileMissing {
                plan_id: plan_id.to_string(),
                path,
            });
        }
        let invalid = |errors: Vec<String>| FlowError::SchemaInvalid {
            plan_id: plan_id.to_string(),
            errors,
        };

        let contents = fs::read_to_string(&path).map_err(|err| FlowError::io(&path, err))?;
        let value: Value =
            serde_json::from_str(&contents).map_err(|err| invalid(vec![err.to_string()]))?;
        let errors = schema_errors(PLAN_SCHEMA, &value)?;
        if !errors.is_empty() {
            return Err(invalid(errors));
        }
        let spec: PlanSpec =
            serde_json::from_value(value).map_err(|err| invalid(vec![err.to_string()]))?;
        let errors = validate_plan_spec(&spec);
        if !errors.is_empty() {
            return Err(invalid(errors));
        }
        debug!(plan_id, tasks = spec.tasks.len(), "plan specification loaded");
        Ok(spec)
    }

    pub fn write_lock_marker(&self, plan_id: &str, at: DateTime<Utc>) -> Result<()> {
        let stamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
        write_atomic(&self.paths.lock_path(plan_id), &format!("{stamp}\n"))
    }

    /// Assemble the [`Plan`] view: requirements, tasks (once produced) and lock state.
    pub fn load_plan(&self, plan_id: &str) -> Result<Plan> {
        let requirements = self.read_requirements(plan_id)?;
        let tasks = if self.paths.plan_spec_path(plan_id).is_file() {
            self.load_spec(plan_id)?.tasks
        } else {
            Vec::new()
        };
        let locked_at = self.locked_at(plan_id)?;
        Ok(Plan {
            id: plan_id.to_string(),
            requirements,
            tasks,
            locked: locked_at.is_some(),
            locked_at,
        })
    }
}
