// SPDX-License-Identifier: MIT OR Apache-2.0

use serde_json::Value;

use crate::types::{BranchInfo, GitHost, RepoDescriptor, RepoMeta, Tag};

use super::HostApi;

/// direct zipfile sources have no API at all: the configured URI is the
/// package, and there is no remote metadata to resolve against.
pub struct ZipfileApi;

impl HostApi for ZipfileApi {
    fn host(&self) -> GitHost {
        GitHost::Zipfile
    }

    fn api_base(&self, _descriptor: &RepoDescriptor) -> String {
        String::new()
    }

    fn file_url(&self, _descriptor: &RepoDescriptor, _file: &str) -> Option<String> {
        None
    }

    fn tags_url(&self, _descriptor: &RepoDescriptor) -> Option<String> {
        None
    }

    fn meta_url(&self, _descriptor: &RepoDescriptor) -> Option<String> {
        None
    }

    fn branches_url(&self, _descriptor: &RepoDescriptor) -> Option<String> {
        None
    }

    fn release_url(&self, _descriptor: &RepoDescriptor) -> Option<String> {
        None
    }

    fn archive_url(&self, descriptor: &RepoDescriptor, _ref_name: &str) -> String {
        descriptor.uri.clone().unwrap_or_default()
    }

    fn decode_file(&self, _payload: &Value) -> Option<String> {
        None
    }

    fn decode_tags(&self, _descriptor: &RepoDescriptor, _payload: &Value) -> Vec<Tag> {
        Vec::new()
    }

    fn decode_meta(&self, _payload: &Value) -> Option<RepoMeta> {
        None
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

    #[test]
    fn archive_is_the_configured_uri() {
        let api = ZipfileApi;
        let mut d = RepoDescriptor::new("widget", RepoType::Plugin, GitHost::Zipfile, "widget", "");
        d.uri = Some("https://downloads.example.com/widget.zip".to_string());

        assert_eq!(
            api.archive_url(&d, "anything"),
            "https://downloads.example.com/widget.zip"
        );
        assert!(api.tags_url(&d).is_none());
        assert!(api.file_url(&d, "widget.php").is_none());
    }
}
