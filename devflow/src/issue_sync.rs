//! Best-effort mirroring of task state onto remote issues.
//!
//! Nothing here fails a workflow command: every [`HostingError`] is logged
//! with `warn!` and turned into `None` or `false`.
//!
//! [`HostingError`]: crate::io::hosting::HostingError

use tracing::{debug, info, instrument, warn};

use crate::core::issue_format::{issue_title, labels_for};
use crate::io::config::IssueSettings;
use crate::io::hosting::{HostingClient, NewIssue};
use crate::io::templates::Templates;
use crate::tracker::{IssueRef, Task, TaskStatus, TaskTracker};

/// Lifecycle events that the tracker reports after a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Started,
    Completed { pull_request_url: Option<String> },
    Blocked { reason: String },
    Unblocked,
}

/// Result of [`IssueSync::sync_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Issues created in this run, by task id. Callers record them.
    pub created: Vec<(String, IssueRef)>,
    pub relabeled: usize,
    /// Task ids whose remote call failed.
    pub failed: Vec<String>,
    /// Completed tasks that never had an issue; their records are frozen.
    pub skipped: Vec<String>,
}

pub struct IssueSync<'a> {
    client: Option<&'a dyn HostingClient>,
    settings: IssueSettings,
    templates: Templates,
}

impl<'a> IssueSync<'a> {
    /// Issue sync over `client`; disabled when there is no client or the
    /// settings turn it off.
    pub fn new(client: Option<&'a dyn HostingClient>, settings: &IssueSettings) -> Self {
        Self {
            client: client.filter(|_| settings.enabled),
            settings: settings.clone(),
            templates: Templates::new(),
        }
    }

    /// Sync that never calls out.
    pub fn disabled() -> Self {
        Self {
            client: None,
            settings: IssueSettings::default(),
            templates: Templates::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Option<IssueRef> {
        let client = self.client?;
        let issue = NewIssue {
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.to_vec(),
        };
        match client.create_issue(&issue) {
            Ok(issue) => {
                info!(number = issue.number, %title, "created issue");
                Some(issue)
            }
            Err(err) => {
                warn!(error = %err, %title, "could not create issue");
                None
            }
        }
    }

    pub fn update_labels(&self, issue: &IssueRef, labels: &[String]) -> bool {
        let Some(client) = self.client else {
            return false;
        };
        match client.set_labels(issue, labels) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, number = issue.number, "could not update issue labels");
                false
            }
        }
    }

    pub fn add_comment(&self, issue: &IssueRef, text: &str) -> bool {
        let Some(client) = self.client else {
            return false;
        };
        match client.add_comment(issue, text) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, number = issue.number, "could not comment on issue");
                false
            }
        }
    }

    /// Comment with `text` (when non-empty), then close.
    pub fn close(&self, issue: &IssueRef, text: &str) -> bool {
        let Some(client) = self.client else {
            return false;
        };
        if !text.trim().is_empty() {
            self.add_comment(issue, text);
        }
        match client.close_issue(issue) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, number = issue.number, "could not close issue");
                false
            }
        }
    }

    fn labels(&self, task: &Task) -> Vec<String> {
        labels_for(task, task.status, self.settings.phase_labels)
    }

    fn body(&self, task: &Task) -> String {
        self.templates.issue_body(task).unwrap_or_else(|err| {
            warn!(error = %err, task_id = %task.id, "could not render issue body");
            task.description.clone().unwrap_or_default()
        })
    }

    fn create_for(&self, task: &Task) -> Option<IssueRef> {
        self.create_issue(&issue_title(task), &self.body(task), &self.labels(task))
    }

    /// Mirror `event` for `task` (already in its new state).
    ///
    /// Returns the issue created by this call, if any, so the caller can
    /// record it on the task.
    #[instrument(skip_all, fields(task_id = %task.id))]
    pub fn notify(&self, task: &Task, event: &TaskEvent) -> Option<IssueRef> {
        if !self.is_enabled() {
            debug!("issue sync disabled");
            return None;
        }
        let labels = self.labels(task);
        match (event, &task.github_issue) {
            (TaskEvent::Started, None) => return self.create_for(task),
            (TaskEvent::Started | TaskEvent::Unblocked, Some(issue)) => {
                self.update_labels(issue, &labels);
            }
            (TaskEvent::Completed { pull_request_url }, Some(issue)) => {
                self.update_labels(issue, &labels);
                let text = match pull_request_url {
                    Some(url) => format!("Completed in {url}"),
                    None => "Completed.".to_string(),
                };
                if self.settings.close_on_complete {
                    self.close(issue, &text);
                } else {
                    self.add_comment(issue, &text);
                }
            }
            (TaskEvent::Blocked { reason }, Some(issue)) => {
                self.update_labels(issue, &labels);
                let text = if reason.trim().is_empty() {
                    "Blocked.".to_string()
                } else {
                    format!("Blocked: {}", reason.trim())
                };
                self.add_comment(issue, &text);
            }
            (_, None) => debug!("task has no issue, nothing to update"),
        }
        None
    }

    /// Create missing issues and refresh labels for every task.
    #[instrument(skip_all, fields(plan_id = %tracker.plan_id))]
    pub fn sync_all(&self, tracker: &TaskTracker) -> SyncReport {
        let mut report = SyncReport::default();
        if !self.is_enabled() {
            debug!("issue sync disabled");
            return report;
        }
        for task in &tracker.task_files {
            match &task.github_issue {
                Some(issue) => {
                    if self.update_labels(issue, &self.labels(task)) {
                        report.relabeled += 1;
                    } else {
                        report.failed.push(task.id.clone());
                    }
                }
                None if task.status == TaskStatus::Completed => {
                    report.skipped.push(task.id.clone());
                }
                None => match self.create_for(task) {
                    Some(issue) => report.created.push((task.id.clone(), issue)),
                    None => report.failed.push(task.id.clone()),
                },
            }
        }
        report
    }
}
