//! Hosting platform detection.
//!
//! The platform and repository identity are resolved once per invocation from
//! settings and the remote URL, and the resulting [`RepoIdentity`] is passed to
//! whatever needs it. Nothing is cached process-wide.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::config::HostingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Github,
    Azure,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Github => "github",
            Platform::Azure => "azure",
        }
    }

    /// Fallback token variables, consulted after `DEVFLOW_TOKEN` and settings.
    pub fn token_env_vars(self) -> &'static [&'static str] {
        match self {
            Platform::Github => &["GITHUB_TOKEN", "GH_TOKEN"],
            Platform::Azure => &["AZURE_DEVOPS_EXT_PAT", "AZURE_DEVOPS_TOKEN"],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Platform::Github),
            "azure" | "azure-devops" | "ado" => Ok(Platform::Azure),
            other => Err(format!(
                "unknown platform '{other}' (expected 'github' or 'azure')"
            )),
        }
    }
}

/// Which repository on which platform devflow talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentity {
    pub platform: Platform,
    /// GitHub owner or Azure DevOps organization.
    pub owner: String,
    /// Azure DevOps project; `None` for GitHub.
    pub project: Option<String>,
    pub name: String,
}

static GITHUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://(?:[^@/]+@)?|ssh://git@|git@)([^/:]*github[^/:]*)[/:]([^/]+)/([^/]+?)(?:\.git)?/?$")
        .expect("github remote regex should compile")
});
static AZURE_HTTPS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://(?:[^@/]+@)?dev\.azure\.com/([^/]+)/([^/]+)/_git/([^/]+?)/?$")
        .expect("azure https regex should compile")
});
static AZURE_SSH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:ssh://)?git@ssh\.dev\.azure\.com[:/]v3/([^/]+)/([^/]+)/([^/]+?)/?$")
        .expect("azure ssh regex should compile")
});
static AZURE_LEGACY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://(?:[^@/]+@)?([^./]+)\.visualstudio\.com/(?:DefaultCollection/)?([^/]+)/_git/([^/]+?)/?$")
        .expect("azure legacy regex should compile")
});

/// Detect the platform and repository from a remote URL.
pub fn parse_remote_url(url: &str) -> Option<RepoIdentity> {
    let url = url.trim();
    if let Some(caps) = GITHUB_RE.captures(url) {
        return Some(RepoIdentity {
            platform: Platform::Github,
            owner: caps[2].to_string(),
            project: None,
            name: caps[3].to_string(),
        });
    }
    for re in [&*AZURE_HTTPS_RE, &*AZURE_SSH_RE, &*AZURE_LEGACY_RE] {
        if let Some(caps) = re.captures(url) {
            return Some(RepoIdentity {
                platform: Platform::Azure,
                owner: caps[1].to_string(),
                project: Some(caps[2].to_string()),
                name: caps[3].to_string(),
            });
        }
    }
    None
}

/// Combine explicit settings with what the remote URL reveals.
///
/// Explicit settings win field by field. Returns `None` when the platform or a
/// required field cannot be determined; issue sync is then disabled.
pub fn resolve_identity(
    hosting: &HostingSettings,
    remote_url: Option<&str>,
) -> Option<RepoIdentity> {
    let detected = remote_url.and_then(parse_remote_url);
    let platform = hosting
        .platform
        .or_else(|| detected.as_ref().map(|d| d.platform))?;
    // Only reuse detected fields when they belong to the same platform.
    let detected = detected.filter(|d| d.platform == platform);

    let owner = hosting
        .owner
        .clone()
        .or_else(|| detected.as_ref().map(|d| d.owner.clone()))?;
    let name = hosting
        .repo
        .clone()
        .or_else(|| detected.as_ref().map(|d| d.name.clone()))?;
    let project = match platform {
        Platform::Github => None,
        Platform::Azure => Some(
            hosting
                .project
                .clone()
                .or_else(|| detected.as_ref().and_then(|d| d.project.clone()))?,
        ),
    };

    let identity = RepoIdentity {
        platform,
        owner,
        project,
        name,
    };
    debug!(platform = %identity.platform, owner = %identity.owner, repo = %identity.name, "resolved repository identity");
    Some(identity)
}

/// Token from settings (which already include `DEVFLOW_TOKEN`), then the
/// platform's conventional variables.
pub fn resolve_token(
    hosting: &HostingSettings,
    platform: Platform,
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<String> {
    hosting
        .token
        .clone()
        .filter(|token| !token.trim().is_empty())
        .or_else(|| {
            platform
                .token_env_vars()
                .iter()
                .find_map(|key| env(key).filter(|token| !token.trim().is_empty()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_github_remotes() {
        for url in [
            "https://github.com/acme/widgets.git",
            "https://github.com/acme/widgets",
            "git@github.com:acme/widgets.git",
            "ssh://git@github.com/acme/widgets.git",
        ] {
            let identity = parse_remote_url(url).expect(url);
            assert_eq!(identity.platform, Platform::Github, "{url}");
            assert_eq!(identity.owner, "acme", "{url}");
            assert_eq!(identity.name, "widgets", "{url}");
        }
    }

    #[test]
    fn parses_azure_remotes() {
        for url in [
            "https://dev.azure.com/contoso/Fabrikam/_git/web",
            "https://contoso@dev.azure.com/contoso/Fabrikam/_git/web",
            "git@ssh.dev.azure.com:v3/contoso/Fabrikam/web",
            "https://contoso.visualstudio.com/Fabrikam/_git/web",
            "https://contoso.visualstudio.com/DefaultCollection/Fabrikam/_git/web",
        ] {
            let identity = parse_remote_url(url).expect(url);
            assert_eq!(identity.platform, Platform::Azure, "{url}");
            assert_eq!(identity.owner, "contoso", "{url}");
            assert_eq!(identity.project.as_deref(), Some("Fabrikam"), "{url}");
            assert_eq!(identity.name, "web", "{url}");
        }
    }

    #[test]
    fn local_paths_are_not_hosted() {
        assert_eq!(parse_remote_url("/tmp/origin.git"), None);
        assert_eq!(parse_remote_url("https://gitlab.com/acme/widgets.git"), None);
    }

    #[test]
    fn settings_override_detected_fields() {
        let hosting = HostingSettings {
            owner: Some("fork-owner".to_string()),
            ..HostingSettings::default()
        };
        let identity =
            resolve_identity(&hosting, Some("git@github.com:acme/widgets.git")).expect("identity");
        assert_eq!(identity.owner, "fork-owner");
        assert_eq!(identity.name, "widgets");
    }

    #[test]
    fn explicit_settings_work_without_remote() {
        let hosting = HostingSettings {
            platform: Some(Platform::Azure),
            owner: Some("contoso".to_string()),
            project: Some("Fabrikam".to_string()),
            repo: Some("web".to_string()),
            ..HostingSettings::default()
        };
        let identity = resolve_identity(&hosting, None).expect("identity");
        assert_eq!(identity.platform, Platform::Azure);

        let incomplete = HostingSettings {
            project: None,
            ..hosting
        };
        assert_eq!(resolve_identity(&incomplete, None), None);
    }

    #[test]
    fn token_prefers_settings_then_platform_env() {
        let env = |key: &str| (key == "GH_TOKEN").then(|| "gh-token".to_string());
        let mut hosting = HostingSettings::default();
        assert_eq!(
            resolve_token(&hosting, Platform::Github, &env).as_deref(),
            Some("gh-token")
        );
        assert_eq!(resolve_token(&hosting, Platform::Azure, &env), None);

        hosting.token = Some("explicit".to_string());
        assert_eq!(
            resolve_token(&hosting, Platform::Github, &env).as_deref(),
            Some("explicit")
        );
    }

    #[test]
    fn platform_parses_aliases() {
        assert_eq!("GitHub".parse::<Platform>(), Ok(Platform::Github));
        assert_eq!("azure-devops".parse::<Platform>(), Ok(Platform::Azure));
        assert!("gitlab".parse::<Platform>().is_err());
    }
}
