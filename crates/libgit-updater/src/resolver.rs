// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::hosts::HostApi;
use crate::types::{RepoDescriptor, Tag};
use crate::version::{self, Version};

pub use crate::headers::parse_remote_version;

/// outcome of one repo's version reconciliation: the authoritative
/// remote version, the newest tag, and the single download link the
/// update record will carry.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub remote_version: Option<String>,
    pub newest_tag: Option<String>,
    pub tags: Vec<Tag>,
    pub download_link: String,
}

/// sorts tags descending by version. unparsable names sort below every
/// parsable one and never become the newest tag.
pub fn sort_tags_descending(tags: &mut [Tag]) {
    tags.sort_by(|a, b| match (parse_tag(a), parse_tag(b)) {
        (Some(va), Some(vb)) => vb.cmp(&va),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
}

fn parse_tag(tag: &Tag) -> Option<Version> {
    Version::parse(&tag.name)
}

/// tag name with the archive-irrelevant `v` prefix stripped, the form
/// reported as a version number.
fn tag_version(name: &str) -> &str {
    name.trim().strip_prefix(['v', 'V']).unwrap_or(name.trim())
}

/// reconciles the header-derived version with the tag list and picks
/// the download link.
///
/// the tie-break is a fixed contract: when the newest tag is at least
/// the header version, the tag wins and the tag archive is served;
/// otherwise the repo is treated as branch-released and the header
/// version is declared with a branch archive. a pinned non-primary
/// branch or an empty tag list always selects the branch archive.
pub fn resolve(
    api: &dyn HostApi,
    descriptor: &RepoDescriptor,
    header_version: Option<&str>,
    mut tags: Vec<Tag>,
    release_asset_url: Option<&str>,
) -> Resolution {
    sort_tags_descending(&mut tags);

    let newest = tags.iter().find(|t| parse_tag(t).is_some()).cloned();

    let tag_loses_tie = match (header_version, newest.as_ref()) {
        (Some(header), Some(tag)) => !version::is_at_least(tag_version(&tag.name), header),
        _ => false,
    };

    let use_branch = descriptor.uses_branch_override() || newest.is_none() || tag_loses_tie;

    let chosen_tag = if use_branch { None } else { newest.as_ref() };
    let download_link = api.construct_download_link(
        descriptor,
        chosen_tag.map(|t| t.name.as_str()),
        None,
        release_asset_url,
    );

    // a repo without a parsable header version yields no authoritative
    // remote version; the check is silently skipped upstream. tags alone
    // never invent one.
    let remote_version = header_version.map(|header| match chosen_tag {
        Some(tag) => tag_version(&tag.name).to_string(),
        None => header.to_string(),
    });

    let newest_tag = newest.as_ref().map(|t| tag_version(&t.name).to_string());

    Resolution {
        remote_version,
        newest_tag,
        tags,
        download_link,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::api_for;
    use crate::types::{GitHost, RepoType};

    fn descriptor() -> RepoDescriptor {
        RepoDescriptor::new("widget", RepoType::Plugin, GitHost::GitHub, "acme", "widget")
    }

    fn tags(names: &[&str]) -> Vec<Tag> {
        names
            .iter()
            .map(|name| Tag {
                name: name.to_string(),
                download_url: format!("https://api.github.com/repos/acme/widget/zipball/{name}"),
            })
            .collect()
    }

    #[test]
    fn newest_tag_by_semantic_order() {
        // numeric comparison, not lexical
        let api = api_for(GitHost::GitHub);
        let d = descriptor();

        let r = resolve(api, &d, None, tags(&["1.2.0", "1.10.0", "1.9.9"]), None);
        assert_eq!(r.newest_tag.as_deref(), Some("1.10.0"));

        let r = resolve(
            api,
            &d,
            None,
            tags(&["1.2.0", "v1.10.0", "1.9.9", "2.0.0-beta"]),
            None,
        );
        assert_eq!(r.newest_tag.as_deref(), Some("2.0.0-beta"));
    }

    #[test]
    fn v_prefix_stripped_for_version_kept_for_url() {
        let api = api_for(GitHost::GitHub);
        let d = descriptor();

        let r = resolve(api, &d, Some("1.0.0"), tags(&["v1.1.0", "v1.0.0"]), None);
        assert_eq!(r.newest_tag.as_deref(), Some("1.1.0"));
        assert_eq!(r.remote_version.as_deref(), Some("1.1.0"));
        assert!(r.download_link.ends_with("/zipball/v1.1.0"), "{}", r.download_link);
    }

    #[test]
    fn tag_wins_tie_against_header() {
        // newest tag equals the header version, tag archive is served
        let api = api_for(GitHost::GitHub);
        let d = descriptor();

        let r = resolve(api, &d, Some("1.5.0"), tags(&["1.5.0", "1.4.0"]), None);
        assert_eq!(r.remote_version.as_deref(), Some("1.5.0"));
        assert!(r.download_link.ends_with("/zipball/1.5.0"), "{}", r.download_link);
    }

    #[test]
    fn newer_header_falls_back_to_branch() {
        // branch-released repo, header version declared
        let api = api_for(GitHost::GitHub);
        let d = descriptor();

        let r = resolve(api, &d, Some("1.6.0"), tags(&["1.5.0"]), None);
        assert_eq!(r.remote_version.as_deref(), Some("1.6.0"));
        assert_eq!(r.newest_tag.as_deref(), Some("1.5.0"));
        assert!(r.download_link.ends_with("/zipball/master"), "{}", r.download_link);
    }

    #[test]
    fn no_tags_always_branch() {
        // an empty tag list always selects the branch archive
        let api = api_for(GitHost::GitHub);
        let d = descriptor();

        let r = resolve(api, &d, Some("3.0.0"), Vec::new(), None);
        assert!(r.download_link.ends_with("/zipball/master"), "{}", r.download_link);
        assert_eq!(r.remote_version.as_deref(), Some("3.0.0"));
        assert!(r.newest_tag.is_none());

        let r = resolve(api, &d, None, Vec::new(), None);
        assert!(r.download_link.ends_with("/zipball/master"));
        assert!(r.remote_version.is_none());
    }

    #[test]
    fn malformed_tags_are_excluded_not_fatal() {
        // malformed names never reach the comparator unguarded
        let api = api_for(GitHost::GitHub);
        let d = descriptor();

        let r = resolve(api, &d, None, tags(&["not-a-version", "1.0.0"]), None);
        assert_eq!(r.newest_tag.as_deref(), Some("1.0.0"));
        // the malformed name sorts last
        assert_eq!(r.tags.last().unwrap().name, "not-a-version");

        let r = resolve(api, &d, Some("1.0.0"), tags(&["nightly", "latest"]), None);
        assert!(r.newest_tag.is_none());
        assert!(r.download_link.ends_with("/zipball/master"));
    }

    #[test]
    fn branch_pin_beats_tags() {
        let api = api_for(GitHost::GitHub);
        let mut d = descriptor();
        d.branch = "develop".to_string();

        let r = resolve(api, &d, Some("1.0.0"), tags(&["2.0.0"]), None);
        assert!(r.download_link.ends_with("/zipball/develop"), "{}", r.download_link);
        assert_eq!(r.remote_version.as_deref(), Some("1.0.0"));
        // the tag list is still reported even when the branch is pinned
        assert_eq!(r.newest_tag.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn release_asset_replaces_link_only() {
        let api = api_for(GitHost::GitHub);
        let mut d = descriptor();
        d.release_asset = true;

        let asset = "https://github.com/acme/widget/releases/download/1.1.0/widget.zip";
        let r = resolve(api, &d, Some("1.0.0"), tags(&["1.1.0"]), Some(asset));
        assert_eq!(r.download_link, asset);
        assert_eq!(r.remote_version.as_deref(), Some("1.1.0"));
    }

    #[test]
    fn missing_header_version_never_invented_from_tags() {
        let api = api_for(GitHost::GitHub);
        let d = descriptor();

        let r = resolve(api, &d, None, tags(&["1.2.0"]), None);
        assert_eq!(r.newest_tag.as_deref(), Some("1.2.0"));
        assert!(r.remote_version.is_none());
        assert!(r.download_link.ends_with("/zipball/1.2.0"));
    }
}
