// SPDX-License-Identifier: MIT OR Apache-2.0

use serde_json::Value;

use super::{HostApi, expand, payload_values, str_field};
use crate::types::{BranchInfo, GitHost, RepoDescriptor, RepoMeta, Tag};

/// Bitbucket Cloud API 2.0. paged payloads wrap items in `values`; the
/// `src` endpoint returns raw file text rather than JSON.
pub struct BitbucketApi;

impl BitbucketApi {
    fn web_archive_url(descriptor: &RepoDescriptor, ref_name: &str) -> String {
        format!(
            "https://bitbucket.org{}/get/{ref_name}.zip",
            expand("/:owner/:repo", descriptor)
        )
    }
}

impl HostApi for BitbucketApi {
    fn host(&self) -> GitHost {
        GitHost::Bitbucket
    }

    fn api_base(&self, _descriptor: &RepoDescriptor) -> String {
        GitHost::Bitbucket.default_api_base().to_string()
    }

    fn file_url(&self, descriptor: &RepoDescriptor, file: &str) -> Option<String> {
        Some(format!(
            "{}{}/{file}",
            self.api_base(descriptor),
            expand("/repositories/:owner/:repo/src/:branch", descriptor)
        ))
    }

    fn tags_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!(
            "{}{}?pagelen=100&sort=-name",
            self.api_base(descriptor),
            expand("/repositories/:owner/:repo/refs/tags", descriptor)
        ))
    }

    fn meta_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!(
            "{}{}",
            self.api_base(descriptor),
            expand("/repositories/:owner/:repo", descriptor)
        ))
    }

    fn branches_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!(
            "{}{}?pagelen=100",
            self.api_base(descriptor),
            expand("/repositories/:owner/:repo/refs/branches", descriptor)
        ))
    }

    fn release_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        // bitbucket "downloads" stand in for release assets
        Some(format!(
            "{}{}",
            self.api_base(descriptor),
            expand("/repositories/:owner/:repo/downloads", descriptor)
        ))
    }

    fn archive_url(&self, descriptor: &RepoDescriptor, ref_name: &str) -> String {
        Self::web_archive_url(descriptor, ref_name)
    }

    fn decode_file(&self, payload: &Value) -> Option<String> {
        match payload {
            Value::String(raw) => Some(raw.clone()),
            _ => None,
        }
    }

    fn decode_tags(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<Tag> {
        let Some(items) = payload_values(payload) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let name = str_field(item, "name")?;
                Some(Tag {
                    download_url: Self::web_archive_url(descriptor, &name),
                    name,
                })
            })
            .collect()
    }

    fn decode_meta(&self, payload: &Value) -> Option<RepoMeta> {
        if !payload.is_object() || payload.get("error").is_some() {
            return None;
        }

        Some(RepoMeta {
            private: payload
                .get("is_private")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            last_updated: str_field(payload, "updated_on").unwrap_or_default(),
            watchers: 0,
            forks: 0,
            open_issues: 0,
        })
    }

    fn decode_branches(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<BranchInfo> {
        let Some(items) = payload_values(payload) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let name = str_field(item, "name")?;
                let target = item.get("target");
                Some(BranchInfo {
                    download_url: Self::web_archive_url(descriptor, &name),
                    commit_hash: target
                        .and_then(|t| str_field(t, "hash"))
                        .unwrap_or_default(),
                    commit_api_url: target
                        .and_then(|t| t.get("links"))
                        .and_then(|l| l.get("self"))
                        .and_then(|s| str_field(s, "href"))
                        .unwrap_or_default(),
                    name,
                })
            })
            .collect()
    }

    fn decode_release_asset(&self, payload: &Value) -> Option<String> {
        let items = payload_values(payload)?;
        items
            .first()?
            .get("links")?
            .get("self")
            .and_then(|s| str_field(s, "href"))
    }
}

/// Bitbucket Server (self-hosted) REST 1.0. requires the instance base
/// from the descriptor; without one every endpoint is unavailable and
/// the repo is skipped.
pub struct BitbucketServerApi;

impl BitbucketServerApi {
    fn base(descriptor: &RepoDescriptor) -> Option<String> {
        descriptor.enterprise_base.clone().filter(|b| !b.is_empty())
    }
}

impl HostApi for BitbucketServerApi {
    fn host(&self) -> GitHost {
        GitHost::BitbucketServer
    }

    fn api_base(&self, descriptor: &RepoDescriptor) -> String {
        Self::base(descriptor).unwrap_or_default()
    }

    fn file_url(&self, descriptor: &RepoDescriptor, file: &str) -> Option<String> {
        let base = Self::base(descriptor)?;
        Some(format!(
            "{base}{}/{file}?at={}",
            expand("/projects/:owner/repos/:repo/raw", descriptor),
            descriptor.effective_branch()
        ))
    }

    fn tags_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        let base = Self::base(descriptor)?;
        Some(format!(
            "{base}{}?limit=100",
            expand("/projects/:owner/repos/:repo/tags", descriptor)
        ))
    }

    fn meta_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        let base = Self::base(descriptor)?;
        Some(format!(
            "{base}{}",
            expand("/projects/:owner/repos/:repo", descriptor)
        ))
    }

    fn branches_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        let base = Self::base(descriptor)?;
        Some(format!(
            "{base}{}?limit=100",
            expand("/projects/:owner/repos/:repo/branches", descriptor)
        ))
    }

    fn release_url(&self, _descriptor: &RepoDescriptor) -> Option<String> {
        None
    }

    fn archive_url(&self, descriptor: &RepoDescriptor, ref_name: &str) -> String {
        let base = Self::base(descriptor).unwrap_or_default();
        format!(
            "{base}{}?at={ref_name}&format=zip",
            expand("/projects/:owner/repos/:repo/archive", descriptor)
        )
    }

    fn decode_file(&self, payload: &Value) -> Option<String> {
        match payload {
            Value::String(raw) => Some(raw.clone()),
            _ => None,
        }
    }

    fn decode_tags(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<Tag> {
        let Some(items) = payload_values(payload) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let name = str_field(item, "displayId")?;
                Some(Tag {
                    download_url: self.archive_url(descriptor, &name),
                    name,
                })
            })
            .collect()
    }

    fn decode_meta(&self, payload: &Value) -> Option<RepoMeta> {
        if !payload.is_object() || payload.get("errors").is_some() {
            return None;
        }

        Some(RepoMeta {
            private: !payload.get("public").and_then(Value::as_bool).unwrap_or(false),
            last_updated: String::new(),
            watchers: 0,
            forks: 0,
            open_issues: 0,
        })
    }

    fn decode_branches(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<BranchInfo> {
        let Some(items) = payload_values(payload) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let name = str_field(item, "displayId")?;
                Some(BranchInfo {
                    download_url: self.archive_url(descriptor, &name),
                    commit_hash: str_field(item, "latestCommit").unwrap_or_default(),
                    commit_api_url: String::new(),
                    name,
                })
            })
            .collect()
    }

    fn decode_release_asset(&self, _payload: &Value) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepoType;
    use serde_json::json;

    fn descriptor() -> RepoDescriptor {
        RepoDescriptor::new("widget", RepoType::Plugin, GitHost::Bitbucket, "acme", "widget")
    }

    #[test]
    fn cloud_urls() {
        let api = BitbucketApi;
        let d = descriptor();

        assert_eq!(
            api.file_url(&d, "widget.php").unwrap(),
            "https://api.bitbucket.org/2.0/repositories/acme/widget/src/master/widget.php"
        );
        assert_eq!(
            api.archive_url(&d, "1.0.0"),
            "https://bitbucket.org/acme/widget/get/1.0.0.zip"
        );
    }

    #[test]
    fn cloud_tags_from_values() {
        let api = BitbucketApi;
        let payload = json!({"values": [{"name": "1.1.0"}, {"name": "1.0.0"}]});

        let tags = api.decode_tags(&descriptor(), &payload);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "1.1.0");
        assert!(tags[0].download_url.ends_with("/get/1.1.0.zip"));
    }

    #[test]
    fn cloud_error_payload_yields_no_tags() {
        let api = BitbucketApi;
        let payload = json!({"error": {"message": "Repository not found"}});
        assert!(api.decode_tags(&descriptor(), &payload).is_empty());
    }

    #[test]
    fn cloud_meta_private_flag() {
        let api = BitbucketApi;
        let meta = api
            .decode_meta(&json!({"is_private": true, "updated_on": "2024-02-02"}))
            .unwrap();
        assert!(meta.private);
        assert_eq!(meta.last_updated, "2024-02-02");
    }

    #[test]
    fn server_requires_instance_base() {
        let api = BitbucketServerApi;
        let mut d = descriptor();
        d.host = GitHost::BitbucketServer;

        assert!(api.tags_url(&d).is_none());

        d.enterprise_base = Some("https://stash.example.com/rest/api/1.0".to_string());
        assert_eq!(
            api.tags_url(&d).unwrap(),
            "https://stash.example.com/rest/api/1.0/projects/acme/repos/widget/tags?limit=100"
        );
        assert_eq!(
            api.archive_url(&d, "1.0.0"),
            "https://stash.example.com/rest/api/1.0/projects/acme/repos/widget/archive?at=1.0.0&format=zip"
        );
    }

    #[test]
    fn server_tags_use_display_id() {
        let api = BitbucketServerApi;
        let mut d = descriptor();
        d.host = GitHost::BitbucketServer;
        d.enterprise_base = Some("https://stash.example.com/rest/api/1.0".to_string());

        let payload = json!({"values": [{"displayId": "2.0.0", "id": "refs/tags/2.0.0"}]});
        let tags = api.decode_tags(&d, &payload);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "2.0.0");
    }
}
