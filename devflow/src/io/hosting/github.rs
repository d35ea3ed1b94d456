//! GitHub REST v3 client.

use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{
    HostingClient, HostingError, HostingResult, NewIssue, NewPullRequest, PullRequest,
    PullRequestState, field_u64, send_json,
};
use crate::io::platform::RepoIdentity;
use crate::tracker::IssueRef;

const DEFAULT_API_URL: &str = "https://api.github.com";

pub struct GithubClient {
    http: Client,
    token: String,
    owner: String,
    repo: String,
    api_base: String,
}

impl GithubClient {
    pub fn new(http: Client, token: String, identity: &RepoIdentity, api_url: Option<&str>) -> Self {
        Self {
            http,
            token,
            owner: identity.owner.clone(),
            repo: identity.name.clone(),
            api_base: api_url
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }
}

fn pull_request_from(value: &Value) -> HostingResult<PullRequest> {
    let number = field_u64(value, "number")?;
    let url = value
        .get("html_url")
        .and_then(Value::as_str)
        .ok_or_else(|| HostingError::InvalidResponse("missing 'html_url'".to_string()))?
        .to_string();
    let merged = value.get("merged_at").is_some_and(|v| !v.is_null());
    let state = match (merged, value.get("state").and_then(Value::as_str)) {
        (true, _) => PullRequestState::Merged,
        (false, Some("open")) => PullRequestState::Open,
        _ => PullRequestState::Closed,
    };
    Ok(PullRequest { number, url, state })
}

impl HostingClient for GithubClient {
    #[instrument(skip_all)]
    fn create_issue(&self, issue: &NewIssue) -> HostingResult<IssueRef> {
        let body = json!({
            "title": issue.title,
            "body": issue.body,
            "labels": issue.labels,
        });
        let value = send_json(
            self.request(Method::POST, &self.api_url("issues"))
                .json(&body),
        )?;
        let number = field_u64(&value, "number")?;
        let url = value
            .get("html_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        debug!(number, "created issue");
        Ok(IssueRef { number, url })
    }

    fn set_labels(&self, issue: &IssueRef, labels: &[String]) -> HostingResult<()> {
        let url = self.api_url(&format!("issues/{}/labels", issue.number));
        send_json(
            self.request(Method::PUT, &url)
                .json(&json!({ "labels": labels })),
        )?;
        Ok(())
    }

    fn add_comment(&self, issue: &IssueRef, body: &str) -> HostingResult<()> {
        let url = self.api_url(&format!("issues/{}/comments", issue.number));
        send_json(self.request(Method::POST, &url).json(&json!({ "body": body })))?;
        Ok(())
    }

    fn close_issue(&self, issue: &IssueRef) -> HostingResult<()> {
        let url = self.api_url(&format!("issues/{}", issue.number));
        send_json(
            self.request(Method::PATCH, &url)
                .json(&json!({ "state": "closed", "state_reason": "completed" })),
        )?;
        Ok(())
    }

    #[instrument(skip_all, fields(head = %request.head))]
    fn create_pull_request(&self, request: &NewPullRequest) -> HostingResult<PullRequest> {
        let body = json!({
            "title": request.title,
            "head": request.head,
            "base": request.base,
            "body": request.body,
        });
        let value = send_json(self.request(Method::POST, &self.api_url("pulls")).json(&body))?;
        pull_request_from(&value)
    }

    fn find_pull_request(&self, head: &str) -> HostingResult<Option<PullRequest>> {
        let head = format!("{}:{}", self.owner, head);
        let value = send_json(
            self.request(Method::GET, &self.api_url("pulls"))
                .query(&[("head", head.as_str()), ("state", "all")]),
        )?;
        let items = value
            .as_array()
            .ok_or_else(|| HostingError::InvalidResponse("expected an array".to_string()))?;
        // The API lists newest first.
        items.first().map(pull_request_from).transpose()
    }
}
