//! Azure DevOps REST 7.1 client: work items stand in for issues.

use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{
    HostingClient, HostingError, HostingResult, NewIssue, NewPullRequest, PullRequest,
    PullRequestState, field_u64, send_json,
};
use crate::io::config::HostingSettings;
use crate::io::platform::RepoIdentity;
use crate::tracker::IssueRef;

const DEFAULT_API_URL: &str = "https://dev.azure.com";
const API_VERSION: &str = "7.1";
const COMMENTS_API_VERSION: &str = "7.1-preview.4";

pub struct AzureClient {
    http: Client,
    token: String,
    organization: String,
    project: String,
    repo: String,
    api_base: String,
    work_item_type: String,
    closed_state: String,
}

impl AzureClient {
    pub fn new(
        http: Client,
        token: String,
        identity: &RepoIdentity,
        hosting: &HostingSettings,
    ) -> Self {
        Self {
            http,
            token,
            organization: identity.owner.clone(),
            project: identity
                .project
                .clone()
                .unwrap_or_else(|| identity.name.clone()),
            repo: identity.name.clone(),
            api_base: hosting
                .api_url
                .as_deref()
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            work_item_type: hosting.work_item_type.clone(),
            closed_state: hosting.closed_state.clone(),
        }
    }

    fn project_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.api_base, self.organization, self.project, path
        )
    }

    fn work_item_web_url(&self, id: u64) -> String {
        self.project_url(&format!("_workitems/edit/{id}"))
    }

    fn pull_request_web_url(&self, id: u64) -> String {
        self.project_url(&format!("_git/{}/pullrequest/{id}", self.repo))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth("", Some(&self.token))
            .header("Accept", "application/json")
    }

    /// PATCH a work item with a JSON Patch document.
    fn patch_work_item(&self, id: u64, operations: &Value) -> HostingResult<Value> {
        let url = self.project_url(&format!("_apis/wit/workitems/{id}"));
        send_json(
            self.request(Method::PATCH, &url)
                .query(&[("api-version", API_VERSION)])
                .header("Content-Type", "application/json-patch+json")
                .body(serde_json::to_vec(operations)?),
        )
    }

    fn pull_request_from(&self, value: &Value) -> HostingResult<PullRequest> {
        let number = field_u64(value, "pullRequestId")?;
        let state = match value.get("status").and_then(Value::as_str) {
            Some("completed") => PullRequestState::Merged,
            Some("active") => PullRequestState::Open,
            Some(_) => PullRequestState::Closed,
            None => {
                return Err(HostingError::InvalidResponse(
                    "missing 'status'".to_string(),
                ));
            }
        };
        Ok(PullRequest {
            number,
            url: self.pull_request_web_url(number),
            state,
        })
    }
}

/// Azure stores tags as one `"; "`-separated string.
fn tags_value(labels: &[String]) -> String {
    labels.join("; ")
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

impl HostingClient for AzureClient {
    #[instrument(skip_all)]
    fn create_issue(&self, issue: &NewIssue) -> HostingResult<IssueRef> {
        let url = self.project_url(&format!("_apis/wit/workitems/${}", self.work_item_type));
        let operations = json!([
            { "op": "add", "path": "/fields/System.Title", "value": issue.title },
            { "op": "add", "path": "/fields/System.Description", "value": issue.body },
            { "op": "add", "path": "/fields/System.Tags", "value": tags_value(&issue.labels) },
        ]);
        let value = send_json(
            self.request(Method::POST, &url)
                .query(&[("api-version", API_VERSION)])
                .header("Content-Type", "application/json-patch+json")
                .body(serde_json::to_vec(&operations)?),
        )?;
        let number = field_u64(&value, "id")?;
        debug!(number, "created work item");
        Ok(IssueRef {
            number,
            url: self.work_item_web_url(number),
        })
    }

    fn set_labels(&self, issue: &IssueRef, labels: &[String]) -> HostingResult<()> {
        self.patch_work_item(
            issue.number,
            &json!([
                { "op": "add", "path": "/fields/System.Tags", "value": tags_value(labels) },
            ]),
        )?;
        Ok(())
    }

    fn add_comment(&self, issue: &IssueRef, body: &str) -> HostingResult<()> {
        let url = self.project_url(&format!("_apis/wit/workItems/{}/comments", issue.number));
        send_json(
            self.request(Method::POST, &url)
                .query(&[("api-version", COMMENTS_API_VERSION)])
                .json(&json!({ "text": body })),
        )?;
        Ok(())
    }

    fn close_issue(&self, issue: &IssueRef) -> HostingResult<()> {
        self.patch_work_item(
            issue.number,
            &json!([
                { "op": "add", "path": "/fields/System.State", "value": self.closed_state },
            ]),
        )?;
        Ok(())
    }

    #[instrument(skip_all, fields(head = %request.head))]
    fn create_pull_request(&self, request: &NewPullRequest) -> HostingResult<PullRequest> {
        let url = self.project_url(&format!("_apis/git/repositories/{}/pullrequests", self.repo));
        let body = json!({
            "sourceRefName": branch_ref(&request.head),
            "targetRefName": branch_ref(&request.base),
            "title": request.title,
            "description": request.body,
        });
        let value = send_json(
            self.request(Method::POST, &url)
                .query(&[("api-version", API_VERSION)])
                .json(&body),
        )?;
        self.pull_request_from(&value)
    }

    fn find_pull_request(&self, head: &str) -> HostingResult<Option<PullRequest>> {
        let url = self.project_url(&format!("_apis/git/repositories/{}/pullrequests", self.repo));
        let source = branch_ref(head);
        let value = send_json(self.request(Method::GET, &url).query(&[
            ("searchCriteria.sourceRefName", source.as_str()),
            ("searchCriteria.status", "all"),
            ("api-version", API_VERSION),
        ]))?;
        let items = value
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| HostingError::InvalidResponse("missing 'value'".to_string()))?;
        items
            .iter()
            .max_by_key(|item| item.get("pullRequestId").and_then(Value::as_u64))
            .map(|item| self.pull_request_from(item))
            .transpose()
    }
}
