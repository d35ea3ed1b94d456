//! Semantic checks for a plan specification before it is locked.

use std::collections::HashSet;

use crate::core::task_id::is_canonical_task_id;
use crate::core::types::PlanSpec;

/// Check plan rules not expressible in JSON Schema:
/// - At least one task
/// - Ids are `TASK-NNN` and unique
/// - Titles are non-blank
/// - Dependencies reference only tasks declared earlier in the document
pub fn validate_plan_spec(spec: &PlanSpec) -> Vec<String> {
    let mut errors = Vec::new();
    if spec.tasks.is_empty() {
        errors.push("plan must declare at least one task".to_string());
        return errors;
    }

    let mut declared: HashSet<&str> = HashSet::new();
    let all: HashSet<&str> = spec.tasks.iter().map(|t| t.id.as_str()).collect();

    for (index, task) in spec.tasks.iter().enumerate() {
        let at = format!("tasks[{index}]");
        if !is_canonical_task_id(&task.id) {
            errors.push(format!("{at}: id '{}' is not of the form TASK-NNN", task.id));
        }
        if task.title.trim().is_empty() {
            errors.push(format!("{at}: title must not be blank"));
        }
        for dep in &task.dependencies {
            if dep == &task.id {
                errors.push(format!("{at}: '{}' depends on itself", task.id));
            } else if declared.contains(dep.as_str()) {
                continue;
            } else if all.contains(dep.as_str()) {
                errors.push(format!(
                    "{at}: '{}' depends on '{dep}', which is declared later",
                    task.id
                ));
            } else {
                errors.push(format!("{at}: '{}' depends on unknown task '{dep}'", task.id));
            }
        }
        if !declared.insert(task.id.as_str()) {
            errors.push(format!("{at}: duplicate task id '{}'", task.id));
        }
    }

    errors
}
