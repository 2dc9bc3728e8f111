// SPDX-License-Identifier: MIT OR Apache-2.0

use serde_json::Value;

use super::{
    HostApi, decode_base64_content, expand, payload_array, str_field, u64_field,
};
use crate::types::{BranchInfo, GitHost, RepoDescriptor, RepoMeta, Tag};

/// Gitea API v1. shapes track the GitHub API closely; archives live
/// under `/archive/:ref.zip` instead of `/zipball/:ref`.
pub struct GiteaApi;

impl HostApi for GiteaApi {
    fn host(&self) -> GitHost {
        GitHost::Gitea
    }

    fn api_base(&self, descriptor: &RepoDescriptor) -> String {
        descriptor
            .enterprise_base
            .clone()
            .unwrap_or_else(|| GitHost::Gitea.default_api_base().to_string())
    }

    fn file_url(&self, descriptor: &RepoDescriptor, file: &str) -> Option<String> {
        Some(format!(
            "{}{}/{file}?ref={}",
            self.api_base(descriptor),
            expand("/repos/:owner/:repo/contents", descriptor),
            descriptor.effective_branch()
        ))
    }

    fn tags_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!(
            "{}{}",
            self.api_base(descriptor),
            expand("/repos/:owner/:repo/tags", descriptor)
        ))
    }

    fn meta_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!(
            "{}{}",
            self.api_base(descriptor),
            expand("/repos/:owner/:repo", descriptor)
        ))
    }

    fn branches_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!(
            "{}{}?limit=100",
            self.api_base(descriptor),
            expand("/repos/:owner/:repo/branches", descriptor)
        ))
    }

    fn release_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!(
            "{}{}",
            self.api_base(descriptor),
            expand("/repos/:owner/:repo/releases/latest", descriptor)
        ))
    }

    fn archive_url(&self, descriptor: &RepoDescriptor, ref_name: &str) -> String {
        format!(
            "{}{}/{ref_name}.zip",
            self.api_base(descriptor),
            expand("/repos/:owner/:repo/archive", descriptor)
        )
    }

    fn decode_file(&self, payload: &Value) -> Option<String> {
        decode_base64_content(payload)
    }

    fn decode_tags(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<Tag> {
        let Some(items) = payload_array(payload) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let name = str_field(item, "name")?;
                let download_url = str_field(item, "zipball_url")
                    .unwrap_or_else(|| self.archive_url(descriptor, &name));
                Some(Tag { name, download_url })
            })
            .collect()
    }

    fn decode_meta(&self, payload: &Value) -> Option<RepoMeta> {
        if !payload.is_object() || payload.get("message").is_some() {
            return None;
        }

        Some(RepoMeta {
            private: payload.get("private").and_then(Value::as_bool).unwrap_or(false),
            last_updated: str_field(payload, "updated_at").unwrap_or_default(),
            watchers: u64_field(payload, "watchers_count"),
            forks: u64_field(payload, "forks_count"),
            open_issues: u64_field(payload, "open_issues_count"),
        })
    }

    fn decode_branches(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<BranchInfo> {
        let Some(items) = payload_array(payload) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let name = str_field(item, "name")?;
                let commit = item.get("commit");
                Some(BranchInfo {
                    download_url: self.archive_url(descriptor, &name),
                    commit_hash: commit
                        .and_then(|c| str_field(c, "id"))
                        .unwrap_or_default(),
                    commit_api_url: commit
                        .and_then(|c| str_field(c, "url"))
                        .unwrap_or_default(),
                    name,
                })
            })
            .collect()
    }

    fn decode_release_asset(&self, payload: &Value) -> Option<String> {
        if payload.get("message").is_some() {
            return None;
        }
        let assets = payload.get("assets")?.as_array()?;
        str_field(assets.first()?, "browser_download_url")
    }
}
