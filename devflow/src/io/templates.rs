//! Rendering of issue bodies, pull request bodies and commit messages.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::changes::ChangeSummary;
use crate::tracker::{IssueRef, Task};

const ISSUE_BODY_TEMPLATE: &str = include_str!("templates/issue_body.md");
const PULL_REQUEST_TEMPLATE: &str = include_str!("templates/pull_request.md");
const COMMIT_MESSAGE_TEMPLATE: &str = include_str!("templates/commit_message.txt");

/// Task fields exposed to templates.
#[derive(Debug, Clone, Serialize)]
struct TaskContext<'a> {
    id: &'a str,
    title: &'a str,
    phase: &'a str,
    description: Option<&'a str>,
    dependencies: &'a [String],
    completion_criteria: &'a [String],
}

impl<'a> TaskContext<'a> {
    fn from_task(task: &'a Task) -> Self {
        Self {
            id: &task.id,
            title: &task.title,
            phase: task.phase.trim(),
            description: task
                .description
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
            dependencies: &task.dependencies,
            completion_criteria: &task.completion_criteria,
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct Templates {
    env: Environment<'static>,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

impl Templates {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("issue_body", ISSUE_BODY_TEMPLATE)
            .expect("issue body template should be valid");
        env.add_template("pull_request", PULL_REQUEST_TEMPLATE)
            .expect("pull request template should be valid");
        env.add_template("commit_message", COMMIT_MESSAGE_TEMPLATE)
            .expect("commit message template should be valid");
        Self { env }
    }

    pub fn issue_body(&self, task: &Task) -> Result<String> {
        let template = self.env.get_template("issue_body")?;
        let rendered = template.render(context! {
            task => TaskContext::from_task(task),
        })?;
        Ok(finish(rendered))
    }

    pub fn pull_request_body(
        &self,
        task: &Task,
        changes: &ChangeSummary,
        issue: Option<&IssueRef>,
    ) -> Result<String> {
        let template = self.env.get_template("pull_request")?;
        let rendered = template.render(context! {
            task => TaskContext::from_task(task),
            changes => changes.files(),
            issue => issue,
        })?;
        Ok(finish(rendered))
    }

    pub fn commit_message(&self, subject: &str, changes: &ChangeSummary) -> Result<String> {
        let template = self.env.get_template("commit_message")?;
        let rendered = template.render(context! {
            subject => subject.trim(),
            changes => changes.files(),
        })?;
        Ok(finish(rendered))
    }
}

fn finish(rendered: String) -> String {
    let mut out = rendered.trim().to_string();
    out.push('\n');
    out
}
