//! Tracker persistence behind a small transactional interface.
//!
//! Every mutation goes through [`TrackerStore::update`]: load, mutate a copy,
//! check the frozen task list and the structural invariants, then save. A
//! rejected mutation never reaches the store.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::immutability::check_frozen_task_list;
use crate::core::invariants::validate_tracker_invariants;
use crate::error::{FlowError, Result};
use crate::io::atomic::write_json_atomic;
use crate::io::schema::{TRACKER_SCHEMA, schema_errors};
use crate::tracker::TaskTracker;

pub trait TrackerStore {
    fn load(&self) -> Result<TaskTracker>;

    fn save(&self, tracker: &TaskTracker) -> Result<()>;

    /// Read-validate-mutate-write. Returns whatever `mutate` returns.
    ///
    /// When `mutate` fails or leaves the tracker unchanged, nothing is written.
    fn update<T>(&self, mutate: impl FnOnce(&mut TaskTracker) -> Result<T>) -> Result<T>
    where
        Self: Sized,
    {
        let prev = self.load()?;
        let mut next = prev.clone();
        let out = mutate(&mut next)?;
        if next == prev {
            debug!("tracker unchanged, skipping write");
            return Ok(out);
        }

        let mut errors = check_frozen_task_list(&prev, &next);
        errors.extend(validate_tracker_invariants(&next));
        if !errors.is_empty() {
            return Err(FlowError::InvariantViolation { errors });
        }
        self.save(&next)?;
        Ok(out)
    }
}

/// Tracker stored as `tasks.json`, validated on every load.
#[derive(Debug, Clone)]
pub struct FileTrackerStore {
    plan_id: String,
    path: PathBuf,
}

impl FileTrackerStore {
    pub fn new(plan_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            plan_id: plan_id.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write a freshly created tracker after validating its invariants.
    pub fn create(&self, tracker: &TaskTracker) -> Result<()> {
        let errors = validate_tracker_invariants(tracker);
        if !errors.is_empty() {
            return Err(FlowError::InvariantViolation { errors });
        }
        self.save(tracker)
    }

    fn corrupt(&self, message: String) -> FlowError {
        FlowError::CorruptState {
            path: self.path.clone(),
            message,
        }
    }
}

impl TrackerStore for FileTrackerStore {
    #[instrument(skip_all, fields(plan_id = %self.plan_id))]
    fn load(&self) -> Result<TaskTracker> {
        if !self.path.is_file() {
            return Err(FlowError::TaskTrackerNotFound {
                plan_id: self.plan_id.clone(),
                path: self.path.clone(),
            });
        }
        let contents =
            fs::read_to_string(&self.path).map_err(|err| FlowError::io(&self.path, err))?;
        let value: Value = serde_json::from_str(&contents)
            .map_err(|err| self.corrupt(format!("invalid JSON: {err}")))?;
        let errors = schema_errors(TRACKER_SCHEMA, &value)?;
        if !errors.is_empty() {
            return Err(self.corrupt(format!(
                "schema validation failed: {}",
                errors.join("; ")
            )));
        }
        let tracker: TaskTracker = serde_json::from_value(value)
            .map_err(|err| self.corrupt(format!("deserialize tracker: {err}")))?;
        let errors = validate_tracker_invariants(&tracker);
        if !errors.is_empty() {
            return Err(self.corrupt(format!("invariants failed: {}", errors.join("; "))));
        }
        debug!(tasks = tracker.task_files.len(), "tracker loaded");
        Ok(tracker)
    }

    fn save(&self, tracker: &TaskTracker) -> Result<()> {
        debug!(path = %self.path.display(), active = ?tracker.active_task_id, "writing tracker");
        write_json_atomic(&self.path, tracker)
    }
}

/// In-memory store for exercising the lifecycle without a filesystem.
#[derive(Debug)]
pub struct MemoryTrackerStore {
    tracker: RefCell<TaskTracker>,
    saves: Cell<usize>,
}

impl MemoryTrackerStore {
    pub fn new(tracker: TaskTracker) -> Self {
        Self {
            tracker: RefCell::new(tracker),
            saves: Cell::new(0),
        }
    }

    pub fn snapshot(&self) -> TaskTracker {
        self.tracker.borrow().clone()
    }

    /// Number of successful writes so far.
    pub fn saves(&self) -> usize {
        self.saves.get()
    }
}

impl TrackerStore for MemoryTrackerStore {
    fn load(&self) -> Result<TaskTracker> {
        Ok(self.snapshot())
    }

    fn save(&self, tracker: &TaskTracker) -> Result<()> {
        *self.tracker.borrow_mut() = tracker.clone();
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{task, tracker};
    use crate::tracker::TaskStatus;

    fn file_store() -> (tempfile::TempDir, FileTrackerStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileTrackerStore::new("plan-1", temp.path().join("plan-1/tasks.json"));
        (temp, store)
    }

    #[test]
    fn missing_file_is_tracker_not_found() {
        let (_temp, store) = file_store();
        assert!(matches!(
            store.load(),
            Err(FlowError::TaskTrackerNotFound { .. })
        ));
    }

    #[test]
    fn create_then_load_round_trips() {
        let (_temp, store) = file_store();
        let tracker = tracker(vec![task("TASK-001", &[]), task("TASK-002", &["TASK-001"])]);
        store.create(&tracker).expect("create");
        assert_eq!(store.load().expect("load"), tracker);
    }

    #[test]
    fn corrupt_files_are_rejected_without_repair() {
        let (_temp, store) = file_store();
        store.create(&tracker(vec![task("TASK-001", &[])])).expect("create");

        fs::write(store.path(), "{\"planId\": 3}").expect("corrupt");
        assert!(matches!(store.load(), Err(FlowError::CorruptState { .. })));
        assert_eq!(
            fs::read_to_string(store.path()).expect("read"),
            "{\"planId\": 3}"
        );
    }

    #[test]
    fn update_rejects_invariant_violations_without_writing() {
        let store = MemoryTrackerStore::new(tracker(vec![
            task("TASK-001", &[]),
            task("TASK-002", &[]),
        ]));
        let err = store
            .update(|tracker| {
                for task in &mut tracker.task_files {
                    task.status = TaskStatus::InProgress;
                }
                tracker.active_task_id = Some("TASK-001".to_string());
                Ok(())
            })
            .expect_err("two in progress");
        assert!(matches!(err, FlowError::InvariantViolation { .. }));
        assert_eq!(store.saves(), 0);
        assert_eq!(store.snapshot().counts().pending, 2);
    }

    #[test]
    fn update_rejects_frozen_field_edits() {
        let store = MemoryTrackerStore::new(tracker(vec![task("TASK-001", &[])]));
        let err = store
            .update(|tracker| {
                tracker.task_files[0].title = "changed".to_string();
                Ok(())
            })
            .expect_err("frozen");
        match err {
            FlowError::InvariantViolation { errors } => {
                assert_eq!(errors, vec!["task 'TASK-001' definition changed".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_skips_write_when_unchanged() {
        let store = MemoryTrackerStore::new(tracker(vec![task("TASK-001", &[])]));
        let count = store
            .update(|tracker| Ok(tracker.task_files.len()))
            .expect("update");
        assert_eq!(count, 1);
        assert_eq!(store.saves(), 0);
    }
}
