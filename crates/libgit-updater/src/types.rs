// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// kind of tracked package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepoType {
    #[default]
    Plugin,
    Theme,
}

impl RepoType {
    /// header key announcing the package ("Plugin Name:" / "Theme Name:").
    pub const fn name_header(self) -> &'static str {
        match self {
            Self::Plugin => "plugin name",
            Self::Theme => "theme name",
        }
    }

    /// the file whose header block carries the version, relative to the
    /// package root. plugins use `<slug>.php`, themes always `style.css`.
    pub fn main_file(self, slug: &str) -> String {
        match self {
            Self::Plugin => format!("{slug}.php"),
            Self::Theme => "style.css".to_string(),
        }
    }
}

impl std::str::FromStr for RepoType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plugin" => Ok(Self::Plugin),
            "theme" => Ok(Self::Theme),
            other => Err(Error::config(format!("unknown repo type: {other}"))),
        }
    }
}

impl std::fmt::Display for RepoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plugin => write!(f, "plugin"),
            Self::Theme => write!(f, "theme"),
        }
    }
}

/// supported git hosting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitHost {
    #[serde(rename = "github")]
    GitHub,
    Bitbucket,
    BitbucketServer,
    #[serde(rename = "gitlab")]
    GitLab,
    Gitea,
    Gist,
    Zipfile,
}

impl GitHost {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Bitbucket => "bitbucket",
            Self::BitbucketServer => "bitbucket_server",
            Self::GitLab => "gitlab",
            Self::Gitea => "gitea",
            Self::Gist => "gist",
            Self::Zipfile => "zipfile",
        }
    }

    /// default REST API base for the public instance of each host.
    /// self-hosted instances override this via the descriptor's
    /// `enterprise_base`.
    pub const fn default_api_base(self) -> &'static str {
        match self {
            Self::GitHub | Self::Gist => "https://api.github.com",
            Self::Bitbucket => "https://api.bitbucket.org/2.0",
            Self::BitbucketServer => "",
            Self::GitLab => "https://gitlab.com/api/v4",
            Self::Gitea => "https://gitea.com/api/v1",
            Self::Zipfile => "",
        }
    }

    /// header key prefix used in package headers ("GitHub Plugin URI").
    pub const fn header_key(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Bitbucket | Self::BitbucketServer => "bitbucket",
            Self::GitLab => "gitlab",
            Self::Gitea => "gitea",
            Self::Gist => "gist",
            Self::Zipfile => "zipfile",
        }
    }

    /// browser-facing base for homepage links.
    pub const fn web_base(self) -> &'static str {
        match self {
            Self::GitHub => "https://github.com",
            Self::Bitbucket | Self::BitbucketServer => "https://bitbucket.org",
            Self::GitLab => "https://gitlab.com",
            Self::Gitea => "https://gitea.com",
            Self::Gist => "https://gist.github.com",
            Self::Zipfile => "",
        }
    }

    /// hosts whose error responses carry `x-ratelimit-reset`, used to
    /// size the error-cache backoff window.
    pub const fn rate_limit_aware(self) -> bool {
        matches!(self, Self::GitHub | Self::Gist)
    }

    pub const fn all() -> &'static [GitHost] {
        &[
            Self::GitHub,
            Self::Bitbucket,
            Self::BitbucketServer,
            Self::GitLab,
            Self::Gitea,
            Self::Gist,
            Self::Zipfile,
        ]
    }
}

impl std::str::FromStr for GitHost {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "bitbucket" => Ok(Self::Bitbucket),
            "bitbucket_server" | "bitbucket-server" => Ok(Self::BitbucketServer),
            "gitlab" => Ok(Self::GitLab),
            "gitea" => Ok(Self::Gitea),
            "gist" => Ok(Self::Gist),
            "zipfile" => Ok(Self::Zipfile),
            other => Err(Error::config(format!("unknown git host: {other}"))),
        }
    }
}

impl std::fmt::Display for GitHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::Bitbucket => write!(f, "Bitbucket"),
            Self::BitbucketServer => write!(f, "Bitbucket Server"),
            Self::GitLab => write!(f, "GitLab"),
            Self::Gitea => write!(f, "Gitea"),
            Self::Gist => write!(f, "Gist"),
            Self::Zipfile => write!(f, "Zipfile"),
        }
    }
}

/// one tracked plugin/theme and its git source. rebuilt from headers and
/// config on every run; resolved state lives in [`crate::resolver::Resolution`]
/// and the cache, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub slug: String,
    pub repo_type: RepoType,
    pub host: GitHost,
    pub owner: String,
    pub repo: String,
    /// empty means "use the primary branch".
    #[serde(default)]
    pub branch: String,
    #[serde(default = "default_primary_branch")]
    pub primary_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub local_version: String,
    #[serde(default)]
    pub is_private: bool,
    /// API base of a self-hosted instance, e.g. a GitHub Enterprise or
    /// Bitbucket Server installation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_base: Option<String>,
    #[serde(default)]
    pub release_asset: bool,
    /// direct archive URI for zipfile sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// local install path, when discovered on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_primary_branch() -> String {
    "master".to_string()
}

impl RepoDescriptor {
    pub fn new(
        slug: impl Into<String>,
        repo_type: RepoType,
        host: GitHost,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            repo_type,
            host,
            owner: owner.into(),
            repo: repo.into(),
            branch: String::new(),
            primary_branch: default_primary_branch(),
            token: None,
            local_version: String::new(),
            is_private: false,
            enterprise_base: None,
            release_asset: false,
            uri: None,
            path: None,
        }
    }

    /// the branch checks resolve against: the explicit branch when set,
    /// the primary branch otherwise.
    pub fn effective_branch(&self) -> &str {
        if self.branch.is_empty() {
            &self.primary_branch
        } else {
            &self.branch
        }
    }

    /// true when a branch override is pinned away from the primary.
    pub fn uses_branch_override(&self) -> bool {
        !self.branch.is_empty() && self.branch != self.primary_branch
    }

    /// remote file carrying the version header.
    pub fn remote_main_file(&self) -> String {
        self.repo_type.main_file(&self.slug)
    }

    pub fn homepage(&self) -> String {
        match self.host {
            GitHost::Zipfile => self.uri.clone().unwrap_or_default(),
            GitHost::Gist => format!("{}/{}", self.host.web_base(), self.repo),
            _ => format!("{}/{}/{}", self.host.web_base(), self.owner, self.repo),
        }
    }

    /// builds a descriptor from an install URI. accepts a full https URL
    /// (host inferred from the domain unless given) or a bare
    /// `owner/repo`, which requires an explicit host.
    pub fn from_uri(
        uri: &str,
        host: Option<GitHost>,
        repo_type: RepoType,
        branch: Option<&str>,
        token: Option<&str>,
    ) -> Result<Self> {
        let (host, owner, repo, enterprise_base, direct_uri) = if uri.contains("://") {
            let parsed = url::Url::parse(uri)
                .map_err(|e| Error::invalid_source(format!("{uri}: {e}")))?;
            let domain = parsed
                .host_str()
                .ok_or_else(|| Error::invalid_source(format!("{uri}: missing host")))?
                .to_string();

            let inferred = host.or_else(|| infer_host(&domain, parsed.path()));
            let Some(inferred) = inferred else {
                return Err(Error::invalid_source(format!(
                    "{uri}: cannot infer git host, pass one explicitly"
                )));
            };

            if inferred == GitHost::Zipfile {
                let slug_hint = parsed
                    .path_segments()
                    .and_then(|mut s| s.next_back())
                    .unwrap_or("package")
                    .trim_end_matches(".zip")
                    .to_string();
                (inferred, slug_hint, String::new(), None, Some(uri.to_string()))
            } else {
                let mut segments = parsed
                    .path_segments()
                    .map(|s| s.filter(|p| !p.is_empty()).collect::<Vec<_>>())
                    .unwrap_or_default();
                segments.retain(|p| *p != "-");
                if segments.len() < 2 && inferred != GitHost::Gist {
                    return Err(Error::invalid_source(format!(
                        "{uri}: expected owner/repo in path"
                    )));
                }
                let owner = segments.first().copied().unwrap_or_default().to_string();
                let repo = segments
                    .get(1)
                    .copied()
                    .unwrap_or_default()
                    .trim_end_matches(".git")
                    .to_string();

                let enterprise = enterprise_base_for(inferred, &domain);
                (inferred, owner, repo, enterprise, None)
            }
        } else {
            let Some(host) = host else {
                return Err(Error::invalid_source(format!(
                    "{uri}: bare owner/repo needs an explicit host"
                )));
            };
            let (owner, repo) = uri
                .split_once('/')
                .ok_or_else(|| Error::invalid_source(format!("{uri}: expected owner/repo")))?;
            (host, owner.to_string(), repo.to_string(), None, None)
        };

        let slug = if host == GitHost::Zipfile {
            owner.clone()
        } else if repo.is_empty() {
            owner.clone()
        } else {
            repo.clone()
        };

        let mut descriptor = Self::new(slug, repo_type, host, owner, repo);
        descriptor.enterprise_base = enterprise_base;
        descriptor.uri = direct_uri;
        if let Some(branch) = branch {
            descriptor.branch = branch.to_string();
        }
        descriptor.token = token.map(str::to_string);
        Ok(descriptor)
    }
}

fn infer_host(domain: &str, path: &str) -> Option<GitHost> {
    match domain {
        "github.com" | "www.github.com" => Some(GitHost::GitHub),
        "gist.github.com" => Some(GitHost::Gist),
        "bitbucket.org" | "www.bitbucket.org" => Some(GitHost::Bitbucket),
        "gitlab.com" | "www.gitlab.com" => Some(GitHost::GitLab),
        "gitea.com" => Some(GitHost::Gitea),
        _ if path.ends_with(".zip") => Some(GitHost::Zipfile),
        _ => None,
    }
}

fn enterprise_base_for(host: GitHost, domain: &str) -> Option<String> {
    let self_hosted = match host {
        GitHost::GitHub | GitHost::Gist => !domain.ends_with("github.com"),
        GitHost::Bitbucket => domain != "bitbucket.org" && domain != "www.bitbucket.org",
        GitHost::GitLab => domain != "gitlab.com" && domain != "www.gitlab.com",
        GitHost::Gitea => domain != "gitea.com",
        GitHost::BitbucketServer => true,
        GitHost::Zipfile => false,
    };

    if !self_hosted {
        return None;
    }

    Some(match host {
        GitHost::GitHub | GitHost::Gist => format!("https://{domain}/api/v3"),
        GitHost::GitLab => format!("https://{domain}/api/v4"),
        GitHost::Gitea => format!("https://{domain}/api/v1"),
        GitHost::Bitbucket | GitHost::BitbucketServer => {
            format!("https://{domain}/rest/api/1.0")
        }
        GitHost::Zipfile => String::new(),
    })
}

/// one remote tag with the archive URL it downloads as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub download_url: String,
}

/// normalized repository metadata across hosts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoMeta {
    pub private: bool,
    pub last_updated: String,
    pub watchers: u64,
    pub forks: u64,
    pub open_issues: u64,
}

/// one remote branch and where to fetch it from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub download_url: String,
    pub commit_hash: String,
    pub commit_api_url: String,
}

/// the normalized record handed to the consuming updater when a tracked
/// repo has a strictly newer remote version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub slug: String,
    pub new_version: String,
    pub url: String,
    pub package: String,
}

/// "more info" response shape for a single tracked repo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub slug: String,
    pub version: String,
    pub author: String,
    pub homepage: String,
    pub sections: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tested: Option<String>,
    pub download_link: String,
    pub last_updated: String,
    pub rating: u64,
    pub num_ratings: u64,
    pub downloaded: u64,
}

/// why a repo produced no update record this cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoDiagnostic {
    pub slug: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl RepoDiagnostic {
    pub fn new(slug: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            reason: reason.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        self.retry_after_secs = secs;
        self
    }
}

/// aggregated outcome of a check pass over all tracked repos.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckResult {
    pub updates: Vec<UpdateRecord>,
    pub up_to_date: Vec<String>,
    pub skipped: Vec<RepoDiagnostic>,
    pub check_failures: Vec<RepoDiagnostic>,
}

impl CheckResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_update(&mut self, update: UpdateRecord) {
        self.updates.push(update);
    }

    pub fn add_up_to_date(&mut self, slug: impl Into<String>) {
        self.up_to_date.push(slug.into());
    }

    pub fn add_skipped(&mut self, diagnostic: RepoDiagnostic) {
        self.skipped.push(diagnostic);
    }

    pub fn add_check_failure(&mut self, diagnostic: RepoDiagnostic) {
        self.check_failures.push(diagnostic);
    }

    pub fn has_issues(&self) -> bool {
        !self.skipped.is_empty() || !self.check_failures.is_empty()
    }

    pub fn merge(&mut self, other: CheckResult) {
        self.updates.extend(other.updates);
        self.up_to_date.extend(other.up_to_date);
        self.skipped.extend(other.skipped);
        self.check_failures.extend(other.check_failures);
    }
}

/// JSON output wrapper for CLI consumers.
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_from_str_round_trips() {
        for &host in GitHost::all() {
            assert_eq!(host.as_str().parse::<GitHost>().unwrap(), host);
        }
    }

    #[test]
    fn effective_branch_falls_back_to_primary() {
        let mut d = RepoDescriptor::new("widget", RepoType::Plugin, GitHost::GitHub, "acme", "widget");
        assert_eq!(d.effective_branch(), "master");
        d.branch = "develop".to_string();
        assert_eq!(d.effective_branch(), "develop");
        assert!(d.uses_branch_override());
    }

    #[test]
    fn from_uri_infers_github() {
        let d = RepoDescriptor::from_uri(
            "https://github.com/acme/widget",
            None,
            RepoType::Plugin,
            Some("develop"),
            None,
        )
        .unwrap();
        assert_eq!(d.host, GitHost::GitHub);
        assert_eq!(d.owner, "acme");
        assert_eq!(d.repo, "widget");
        assert_eq!(d.slug, "widget");
        assert_eq!(d.branch, "develop");
        assert!(d.enterprise_base.is_none());
    }

    #[test]
    fn from_uri_self_hosted_gitlab() {
        let d = RepoDescriptor::from_uri(
            "https://git.example.com/acme/widget",
            Some(GitHost::GitLab),
            RepoType::Plugin,
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            d.enterprise_base.as_deref(),
            Some("https://git.example.com/api/v4")
        );
    }

    #[test]
    fn from_uri_zipfile() {
        let d = RepoDescriptor::from_uri(
            "https://downloads.example.com/widget.zip",
            None,
            RepoType::Plugin,
            None,
            None,
        )
        .unwrap();
        assert_eq!(d.host, GitHost::Zipfile);
        assert_eq!(d.slug, "widget");
        assert_eq!(
            d.uri.as_deref(),
            Some("https://downloads.example.com/widget.zip")
        );
    }

    #[test]
    fn from_uri_bare_needs_host() {
        assert!(RepoDescriptor::from_uri("acme/widget", None, RepoType::Plugin, None, None).is_err());
        let d = RepoDescriptor::from_uri(
            "acme/widget",
            Some(GitHost::Gitea),
            RepoType::Plugin,
            None,
            None,
        )
        .unwrap();
        assert_eq!(d.host, GitHost::Gitea);
        assert_eq!(d.owner, "acme");
    }

    #[test]
    fn main_file_per_type() {
        let plugin = RepoDescriptor::new("widget", RepoType::Plugin, GitHost::GitHub, "a", "widget");
        let theme = RepoDescriptor::new("dusk", RepoType::Theme, GitHost::GitHub, "a", "dusk");
        assert_eq!(plugin.remote_main_file(), "widget.php");
        assert_eq!(theme.remote_main_file(), "style.css");
    }
}
