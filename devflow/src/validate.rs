//! Validation of the active plan and its tracker.

use tracing::{debug, instrument};

use crate::core::immutability::check_matches_plan;
use crate::error::{FlowError, Result};
use crate::io::tracker_store::TrackerStore;
use crate::workflow::Workflow;

/// What `validate` found for the active plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanValidation {
    /// Plan generated but not locked; its specification is checked if present.
    Unlocked { plan_id: String, task_count: usize },
    /// Tracker passed schema, invariants and the frozen-plan comparison.
    Locked {
        plan_id: String,
        task_count: usize,
        active_task: Option<String>,
    },
}

/// Validate the active plan: specification, tracker schema and invariants,
/// and that the tracker still mirrors the locked task list.
///
/// Settings were already validated when the [`Workflow`] was loaded.
#[instrument(skip_all)]
pub fn validate_workflow(wf: &Workflow) -> Result<PlanValidation> {
    let plans = wf.plans();
    let plan_id = plans.require_active()?;
    let plan = plans.load_plan(&plan_id)?;

    if !plan.locked {
        debug!(plan_id, tasks = plan.tasks.len(), "plan not locked yet");
        return Ok(PlanValidation::Unlocked {
            task_count: plan.tasks.len(),
            plan_id,
        });
    }

    let tracker = wf.tracker_store()?.load()?;
    let mut errors = Vec::new();
    if tracker.plan_id != plan_id {
        errors.push(format!(
            "tracker planId '{}' does not match active plan '{plan_id}'",
            tracker.plan_id
        ));
    }
    errors.extend(check_matches_plan(&plan.tasks, &tracker));
    if !errors.is_empty() {
        return Err(FlowError::InvariantViolation { errors });
    }

    Ok(PlanValidation::Locked {
        plan_id,
        task_count: tracker.task_files.len(),
        active_task: tracker.active_task_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::Settings;
    use crate::io::tracker_store::FileTrackerStore;
    use crate::plan::{generate_plan, lock_plan};
    use crate::test_support::{plan_spec, plan_task};
    use chrono::{TimeZone, Utc};
    use std::fs;

    fn workflow() -> (tempfile::TempDir, Workflow) {
        let temp = tempfile::tempdir().expect("tempdir");
        let wf = Workflow::new(temp.path(), Settings::default(), None);
        (temp, wf)
    }

    fn locked(wf: &Workflow) -> String {
        let now = Utc.with_ymd_and_hms(2026, 7, 2, 10, 0, 0).unwrap();
        let plans = wf.plans();
        let generated = generate_plan(&plans, "Build it", now).expect("generate");
        plans
            .write_spec(
                &generated.plan_id,
                &plan_spec(vec![
                    plan_task("TASK-001", &[]),
                    plan_task("TASK-002", &["TASK-001"]),
                ]),
            )
            .expect("spec");
        lock_plan(&plans, None, "demo", now).expect("lock").plan_id
    }

    #[test]
    fn no_plan_is_an_error() {
        let (_temp, wf) = workflow();
        assert!(matches!(validate_workflow(&wf), Err(FlowError::NoActivePlan)));
    }

    #[test]
    fn unlocked_plan_without_spec_is_valid() {
        let (_temp, wf) = workflow();
        let now = Utc.with_ymd_and_hms(2026, 7, 2, 10, 0, 0).unwrap();
        generate_plan(&wf.plans(), "Build it", now).expect("generate");
        assert!(matches!(
            validate_workflow(&wf),
            Ok(PlanValidation::Unlocked { task_count: 0, .. })
        ));
    }

    #[test]
    fn locked_plan_is_valid() {
        let (_temp, wf) = workflow();
        let plan_id = locked(&wf);
        assert_eq!(
            validate_workflow(&wf).expect("valid"),
            PlanValidation::Locked {
                plan_id,
                task_count: 2,
                active_task: None,
            }
        );
    }

    #[test]
    fn tracker_edited_behind_our_back_is_reported() {
        let (_temp, wf) = workflow();
        let plan_id = locked(&wf);
        let store = FileTrackerStore::new(&plan_id, wf.paths().tracker_path(&plan_id));
        let mut tracker = store.load().expect("load");
        tracker.task_files[1].title = "Renamed".to_string();
        store.save(&tracker).expect("save");

        match validate_workflow(&wf) {
            Err(FlowError::InvariantViolation { errors }) => {
                assert_eq!(errors, vec!["task 'TASK-002' differs from locked plan".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn corrupt_tracker_is_a_schema_error() {
        let (_temp, wf) = workflow();
        let plan_id = locked(&wf);
        fs::write(wf.paths().tracker_path(&plan_id), "{ not json").expect("write");
        let err = validate_workflow(&wf).expect_err("corrupt");
        assert!(matches!(err, FlowError::CorruptState { .. }), "{err:?}");
        assert_eq!(err.kind(), crate::error::ErrorKind::Schema);
    }
}
