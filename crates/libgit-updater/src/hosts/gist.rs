// SPDX-License-Identifier: MIT OR Apache-2.0

use serde_json::Value;

use super::{HostApi, str_field};
use crate::types::{BranchInfo, GitHost, RepoDescriptor, RepoMeta, Tag};

/// GitHub Gists. the `repo` field of the descriptor holds the gist id;
/// gists have no tags or releases, so updates are branch-driven.
pub struct GistApi;

impl GistApi {
    fn gist_base(&self, descriptor: &RepoDescriptor) -> String {
        format!("{}/gists/{}", self.api_base(descriptor), descriptor.repo)
    }
}

impl HostApi for GistApi {
    fn host(&self) -> GitHost {
        GitHost::Gist
    }

    fn api_base(&self, descriptor: &RepoDescriptor) -> String {
        descriptor
            .enterprise_base
            .clone()
            .unwrap_or_else(|| GitHost::Gist.default_api_base().to_string())
    }

    fn file_url(&self, descriptor: &RepoDescriptor, _file: &str) -> Option<String> {
        // one payload carries every file of the gist
        Some(self.gist_base(descriptor))
    }

    fn tags_url(&self, _descriptor: &RepoDescriptor) -> Option<String> {
        None
    }

    fn meta_url(&self, descriptor: &RepoDescriptor) -> Option<String> {
        Some(self.gist_base(descriptor))
    }

    fn branches_url(&self, _descriptor: &RepoDescriptor) -> Option<String> {
        None
    }

    fn release_url(&self, _descriptor: &RepoDescriptor) -> Option<String> {
        None
    }

    fn archive_url(&self, descriptor: &RepoDescriptor, ref_name: &str) -> String {
        format!(
            "https://gist.github.com/{}/{}/archive/{ref_name}.zip",
            descriptor.owner, descriptor.repo
        )
    }

    fn decode_file(&self, payload: &Value) -> Option<String> {
        if payload.get("message").is_some() {
            return None;
        }

        let files = payload.get("files")?.as_object()?;

        // prefer the file that can carry a version header
        let by_extension = files
            .iter()
            .find(|(name, _)| name.ends_with(".php") || name.ends_with(".css"))
            .map(|(_, file)| file);

        let file = by_extension.or_else(|| files.values().next())?;
        str_field(file, "content")
    }

    fn decode_tags(&self, _descriptor: &RepoDescriptor, _payload: &Value) -> Vec<Tag> {
        Vec::new()
    }

    fn decode_meta(&self, payload: &Value) -> Option<RepoMeta> {
        if !payload.is_object() || payload.get("message").is_some() {
            return None;
        }

        Some(RepoMeta {
            private: !payload.get("public").and_then(Value::as_bool).unwrap_or(true),
            last_updated: str_field(payload, "updated_at").unwrap_or_default(),
            watchers: 0,
            forks: 0,
            open_issues: 0,
        })
    }

    fn decode_branches(&self, _descriptor: &RepoDescriptor, _payload: &Value) -> Vec<BranchInfo> {
        Vec::new()
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
        RepoDescriptor::new(
            "widget",
            RepoType::Plugin,
            GitHost::Gist,
            "acme",
            "abc123def456",
        )
    }

    #[test]
    fn gist_urls() {
        let api = GistApi;
        let d = descriptor();

        assert_eq!(
            api.file_url(&d, "widget.php").unwrap(),
            "https://api.github.com/gists/abc123def456"
        );
        assert_eq!(
            api.archive_url(&d, "master"),
            "https://gist.github.com/acme/abc123def456/archive/master.zip"
        );
        assert!(api.tags_url(&d).is_none());
    }

    #[test]
    fn picks_header_capable_file() {
        let api = GistApi;
        let payload = json!({
            "public": true,
            "updated_at": "2024-01-01T00:00:00Z",
            "files": {
                "README.md": {"content": "# readme"},
                "widget.php": {"content": "/* Version: 1.0 */"}
            }
        });

        assert_eq!(
            api.decode_file(&payload).as_deref(),
            Some("/* Version: 1.0 */")
        );
    }

    #[test]
    fn gist_meta() {
        let api = GistApi;
        let meta = api
            .decode_meta(&json!({"public": false, "updated_at": "2024-01-01T00:00:00Z"}))
            .unwrap();
        assert!(meta.private);
    }
}
