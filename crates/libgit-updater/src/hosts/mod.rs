// SPDX-License-Identifier: MIT OR Apache-2.0

mod bitbucket;
mod gist;
mod gitea;
mod github;
mod gitlab;
mod zipfile;

pub use bitbucket::{BitbucketApi, BitbucketServerApi};
pub use gist::GistApi;
pub use gitea::GiteaApi;
pub use github::GithubApi;
pub use gitlab::GitlabApi;
pub use zipfile::ZipfileApi;

use serde_json::Value;

use crate::types::{BranchInfo, GitHost, RepoDescriptor, RepoMeta, Tag};

/// per-host API strategy: endpoint construction and payload decoding.
/// decode functions are lenient: host error objects and unexpected
/// shapes yield empty results, never panics, so one bad sub-resource
/// cannot sink the rest of a repo's check.
pub trait HostApi: Send + Sync {
    fn host(&self) -> GitHost;

    /// REST base, honoring a self-hosted override.
    fn api_base(&self, descriptor: &RepoDescriptor) -> String;

    /// endpoint for the raw contents of `file` on the effective branch.
    fn file_url(&self, descriptor: &RepoDescriptor, file: &str) -> Option<String>;

    fn tags_url(&self, descriptor: &RepoDescriptor) -> Option<String>;

    fn meta_url(&self, descriptor: &RepoDescriptor) -> Option<String>;

    fn branches_url(&self, descriptor: &RepoDescriptor) -> Option<String>;

    /// endpoint for the latest release, on hosts that have releases.
    fn release_url(&self, descriptor: &RepoDescriptor) -> Option<String>;

    /// archive (zipball) URL for an arbitrary ref.
    fn archive_url(&self, descriptor: &RepoDescriptor, ref_name: &str) -> String;

    /// extracts raw file text from a contents-endpoint payload.
    fn decode_file(&self, payload: &Value) -> Option<String>;

    fn decode_tags(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<Tag>;

    fn decode_meta(&self, payload: &Value) -> Option<RepoMeta>;

    fn decode_branches(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<BranchInfo>;

    /// extracts the download URL of the newest release asset.
    fn decode_release_asset(&self, payload: &Value) -> Option<String>;

    /// the download-link decision table. identical across hosts; only
    /// the archive URL shape varies.
    fn construct_download_link(
        &self,
        descriptor: &RepoDescriptor,
        newest_tag: Option<&str>,
        branch_override: Option<&str>,
        release_asset_url: Option<&str>,
    ) -> String {
        if descriptor.release_asset
            && let Some(asset) = release_asset_url
        {
            return asset.to_string();
        }

        if let Some(branch) = branch_override {
            return self.archive_url(descriptor, branch);
        }

        match newest_tag {
            Some(tag) if !descriptor.uses_branch_override() => self.archive_url(descriptor, tag),
            _ => self.archive_url(descriptor, descriptor.effective_branch()),
        }
    }
}

/// maps a host variant to its strategy instance.
pub fn api_for(host: GitHost) -> &'static dyn HostApi {
    match host {
        GitHost::GitHub => &GithubApi,
        GitHost::Bitbucket => &BitbucketApi,
        GitHost::BitbucketServer => &BitbucketServerApi,
        GitHost::GitLab => &GitlabApi,
        GitHost::Gitea => &GiteaApi,
        GitHost::Gist => &GistApi,
        GitHost::Zipfile => &ZipfileApi,
    }
}

/// substitutes `:owner`, `:repo` and `:branch` placeholders in an
/// endpoint template.
pub(crate) fn expand(template: &str, descriptor: &RepoDescriptor) -> String {
    template
        .replace(":owner", &descriptor.owner)
        .replace(":repo", &descriptor.repo)
        .replace(":branch", descriptor.effective_branch())
}

/// treats host error objects (a `message` or `error` field) and
/// anything that is not an array as "no items".
pub(crate) fn payload_array(payload: &Value) -> Option<&Vec<Value>> {
    if payload.get("message").is_some() || payload.get("error").is_some() {
        return None;
    }
    payload.as_array()
}

/// bitbucket-style paged payloads wrap items in a `values` array.
pub(crate) fn payload_values(payload: &Value) -> Option<&Vec<Value>> {
    if payload.get("error").is_some() {
        return None;
    }
    payload.get("values")?.as_array()
}

pub(crate) fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field)?.as_str().map(str::to_string)
}

pub(crate) fn u64_field(value: &Value, field: &str) -> u64 {
    value.get(field).and_then(Value::as_u64).unwrap_or(0)
}

/// decodes the base64 `content` field used by github-family contents
/// endpoints; raw-text payloads pass through unchanged.
pub(crate) fn decode_base64_content(payload: &Value) -> Option<String> {
    use base64::Engine as _;

    if let Value::String(raw) = payload {
        return Some(raw.clone());
    }

    if payload.get("message").is_some() {
        return None;
    }

    let content = payload.get("content")?.as_str()?;
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .ok()?;
    String::from_utf8(bytes).ok()
}
