// SPDX-License-Identifier: MIT OR Apache-2.0

use serde_json::Value;

use super::{HostApi, payload_array, str_field, u64_field};
use crate::types::{BranchInfo, GitHost, RepoDescriptor, RepoMeta, Tag};

/// GitLab API v4. projects are addressed by the URL-encoded
/// `owner%2Frepo` path rather than owner/repo segments.
pub struct GitlabApi;

impl GitlabApi {
    fn project_id(descriptor: &RepoDescriptor) -> String {
        format!("{}%2F{}", descriptor.owner, descriptor.repo)
    }

    fn project_base(&self, descriptor: &RepoDescriptor) -> String {
        format!(
            "{}/projects/{}",
            self.api_base(descriptor),
            Self::project_id(descriptor)
        )
    }
}

impl HostApi for GitlabApi {
    fn host(&self) -> GitHost {
        GitHost::GitLab
    }

    fn api_base(&self, descriptor: &RepoDescriptor) -> String {
        descriptor
            .enterprise_base
            .clone()
            .unwrap_or_else(|| GitHost::GitLab.default_api_base().to_string())
    }

    fn file_url(&self, descriptor: &RepoDescriptor, file: &str) -> Option<String> {
        Some(format!(
            "{}/repository/files/{file}/raw?ref={}",
            self.project_base(descriptor),
            descriptor.effective_branch()
        ))
    }

    fn tags_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!("{}/repository/tags", self.project_base(descriptor)))
    }

    fn meta_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(self.project_base(descriptor))
    }

    fn branches_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!(
            "{}/repository/branches?per_page=100",
            self.project_base(descriptor)
        ))
    }

    fn release_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(format!("{}/releases", self.project_base(descriptor)))
    }

    fn archive_url(&self, descriptor: &RepoDescriptor, ref_name: &str) -> String {
        format!(
            "{}/repository/archive.zip?sha={ref_name}",
            self.project_base(descriptor)
        )
    }

    fn decode_file(&self, payload: &Value) -> Option<String> {
        match payload {
            Value::String(raw) => Some(raw.clone()),
            _ => None,
        }
    }

    fn decode_tags(&self, descriptor: &RepoDescriptor, payload: &Value) -> Vec<Tag> {
        let Some(items) = payload_array(payload) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let name = str_field(item, "name")?;
                Some(Tag {
                    download_url: self.archive_url(descriptor, &name),
                    name,
                })
            })
            .collect()
    }

    fn decode_meta(&self, payload: &Value) -> Option<RepoMeta> {
        if !payload.is_object() || payload.get("message").is_some() {
            return None;
        }

        Some(RepoMeta {
            private: str_field(payload, "visibility")
                .map(|v| v != "public")
                .unwrap_or(false),
            last_updated: str_field(payload, "last_activity_at").unwrap_or_default(),
            watchers: u64_field(payload, "star_count"),
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
                        .and_then(|c| str_field(c, "web_url"))
                        .unwrap_or_default(),
                    name,
                })
            })
            .collect()
    }

    fn decode_release_asset(&self, payload: &Value) -> Option<String> {
        let releases = payload_array(payload)?;
        let links = releases
            .first()?
            .get("assets")?
            .get("links")?
            .as_array()?;
        str_field(links.first()?, "url")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepoType;
    use serde_json::json;

    fn descriptor() -> RepoDescriptor {
        RepoDescriptor::new("widget", RepoType::Plugin, GitHost::GitLab, "acme", "widget")
    }

    #[test]
    fn urls_encode_project_path() {
        let api = GitlabApi;
        let d = descriptor();

        assert_eq!(
            api.file_url(&d, "widget.php").unwrap(),
            "https://gitlab.com/api/v4/projects/acme%2Fwidget/repository/files/widget.php/raw?ref=master"
        );
        assert_eq!(
            api.archive_url(&d, "1.0.0"),
            "https://gitlab.com/api/v4/projects/acme%2Fwidget/repository/archive.zip?sha=1.0.0"
        );
    }

    #[test]
    fn self_hosted_base() {
        let api = GitlabApi;
        let mut d = descriptor();
        d.enterprise_base = Some("https://git.example.com/api/v4".to_string());

        assert_eq!(
            api.tags_url(&d).unwrap(),
            "https://git.example.com/api/v4/projects/acme%2Fwidget/repository/tags"
        );
    }

    #[test]
    fn meta_visibility_maps_to_private() {
        let api = GitlabApi;
        let meta = api
            .decode_meta(&json!({
                "visibility": "private",
                "last_activity_at": "2024-04-01T00:00:00Z",
                "star_count": 9,
                "forks_count": 4,
                "open_issues_count": 2
            }))
            .unwrap();
        assert!(meta.private);
        assert_eq!(meta.watchers, 9);

        let meta = api.decode_meta(&json!({"visibility": "public"})).unwrap();
        assert!(!meta.private);
    }

    #[test]
    fn release_asset_from_links() {
        let api = GitlabApi;
        let payload = json!([
            {"tag_name": "v2.0", "assets": {"links": [{"url": "https://gitlab.com/acme/widget/-/releases/v2.0/widget.zip"}]}}
        ]);
        assert_eq!(
            api.decode_release_asset(&payload).unwrap(),
            "https://gitlab.com/acme/widget/-/releases/v2.0/widget.zip"
        );
    }
}
