//! Remote hosting platforms: issues and pull requests.
//!
//! Only the contract lives here. Callers outside `issue_sync` and the git
//! workflow never see a [`HostingError`]; it is logged and swallowed at the
//! issue-sync boundary.

pub mod azure;
pub mod github;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::config::HostingSettings;
use crate::io::platform::{Platform, RepoIdentity};
use crate::tracker::IssueRef;

pub type HostingResult<T> = Result<T, HostingError>;

#[derive(Debug, thiserror::Error)]
pub enum HostingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("authentication required")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("no {platform} token configured")]
    MissingCredentials { platform: Platform },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

impl PullRequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            PullRequestState::Open => "open",
            PullRequestState::Closed => "closed",
            PullRequestState::Merged => "merged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub state: PullRequestState,
}

/// Operations devflow needs from a hosting platform.
pub trait HostingClient {
    fn create_issue(&self, issue: &NewIssue) -> HostingResult<IssueRef>;

    /// Replace the issue's labels (tags on Azure work items).
    fn set_labels(&self, issue: &IssueRef, labels: &[String]) -> HostingResult<()>;

    fn add_comment(&self, issue: &IssueRef, body: &str) -> HostingResult<()>;

    fn close_issue(&self, issue: &IssueRef) -> HostingResult<()>;

    fn create_pull_request(&self, request: &NewPullRequest) -> HostingResult<PullRequest>;

    /// Most recent pull request whose source is `head`, in any state.
    fn find_pull_request(&self, head: &str) -> HostingResult<Option<PullRequest>>;
}

/// Build the client for `identity`. Fails only when no token is available.
pub fn build_client(
    identity: &RepoIdentity,
    hosting: &HostingSettings,
    token: Option<String>,
) -> HostingResult<Box<dyn HostingClient>> {
    let token = token.ok_or(HostingError::MissingCredentials {
        platform: identity.platform,
    })?;
    let http = reqwest::blocking::Client::builder()
        .user_agent(concat!("devflow/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()?;
    debug!(platform = %identity.platform, "building hosting client");
    Ok(match identity.platform {
        Platform::Github => Box::new(github::GithubClient::new(
            http,
            token,
            identity,
            hosting.api_url.as_deref(),
        )),
        Platform::Azure => Box::new(azure::AzureClient::new(http, token, identity, hosting)),
    })
}

/// Map an unsuccessful response to a [`HostingError`].
pub(crate) fn response_error(response: reqwest::blocking::Response) -> HostingError {
    let status = response.status().as_u16();
    match status {
        401 => HostingError::Unauthorized,
        403 | 429 => {
            let exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|s| s == "0");
            if exhausted || status == 429 {
                return HostingError::RateLimited;
            }
            HostingError::Api {
                status,
                message: "Forbidden".to_string(),
            }
        }
        _ => {
            let message = response
                .json::<serde_json::Value>()
                .ok()
                .and_then(|v| {
                    v.get("message")
                        .and_then(|m| m.as_str())
                        .map(String::from)
                })
                .unwrap_or_else(|| format!("HTTP {status}"));
            HostingError::Api { status, message }
        }
    }
}

/// Send a request and return the JSON body of a successful response.
pub(crate) fn send_json(
    request: reqwest::blocking::RequestBuilder,
) -> HostingResult<serde_json::Value> {
    let response = request.send()?;
    if !response.status().is_success() {
        return Err(response_error(response));
    }
    let text = response.text()?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

pub(crate) fn field_u64(value: &serde_json::Value, key: &str) -> HostingResult<u64> {
    value
        .get(key)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| HostingError::InvalidResponse(format!("missing '{key}'")))
}
