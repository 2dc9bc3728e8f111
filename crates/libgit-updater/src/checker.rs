// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde_json::Value;

use crate::client::{ApiResult, HttpClient};
use crate::headers::{header_value, parse_remote_version};
use crate::hosts::{HostApi, api_for};
use crate::resolver::{self, Resolution};
use crate::types::{
    BranchInfo, CheckResult, GitHost, RepoDescriptor, RepoDiagnostic, RepoInfo, RepoMeta, Tag,
    UpdateRecord,
};
use crate::version;

pub enum RepoCheckOutcome {
    Update(Box<UpdateRecord>),
    UpToDate(String),
    Skipped(RepoDiagnostic),
    CheckFailed(RepoDiagnostic),
}

enum SubFetch {
    Payload(Value),
    /// recoverable "no data for this sub-resource".
    Missing,
    /// transport failure or rate limiting: the repo is skipped this
    /// cycle and the diagnostic carries the retry window when known.
    Fatal(RepoDiagnostic),
}

fn fetch_sub(
    client: &HttpClient,
    descriptor: &RepoDescriptor,
    purpose: &str,
    url: &str,
) -> SubFetch {
    let result = client.fetch(
        descriptor.host,
        &descriptor.slug,
        purpose,
        url,
        descriptor.token.as_deref(),
    );

    match result {
        Ok(ApiResult::Ok(value)) => SubFetch::Payload(value),
        Ok(ApiResult::NotFound) => SubFetch::Missing,
        Ok(ApiResult::Failed { status, message }) => {
            log::debug!(
                "**checker:** '{}' {purpose}: http {status}: {message}",
                descriptor.slug
            );
            SubFetch::Missing
        }
        Ok(ApiResult::RateLimited { retry_after }) => SubFetch::Fatal(
            RepoDiagnostic::new(&descriptor.slug, format!("{purpose}: rate limited"))
                .with_retry_after(retry_after),
        ),
        Err(e) => SubFetch::Fatal(RepoDiagnostic::new(
            &descriptor.slug,
            format!("{purpose}: {e}"),
        )),
    }
}

/// fetches the sub-resources one repo needs and reconciles them into a
/// [`Resolution`]. returns a diagnostic instead when the repo cannot be
/// resolved this cycle.
pub fn resolve_repo(
    client: &HttpClient,
    descriptor: &RepoDescriptor,
) -> Result<(Resolution, Option<RepoMeta>), Box<RepoCheckOutcome>> {
    let api = api_for(descriptor.host);

    if descriptor.host == GitHost::Zipfile {
        // no remote metadata to resolve; the configured URI is served
        // as-is and version bumps arrive with reinstalls
        let resolution = Resolution {
            remote_version: None,
            newest_tag: None,
            tags: Vec::new(),
            download_link: api.archive_url(descriptor, ""),
        };
        return Ok((resolution, None));
    }

    let header_version = match fetch_file(client, descriptor, api) {
        Ok(content) => content.as_deref().and_then(parse_remote_version),
        Err(diag) => return Err(Box::new(RepoCheckOutcome::CheckFailed(diag))),
    };

    let tags = match fetch_tags(client, descriptor, api) {
        Ok(tags) => tags,
        Err(diag) => return Err(Box::new(RepoCheckOutcome::CheckFailed(diag))),
    };

    let meta = match fetch_meta(client, descriptor, api) {
        Ok(meta) => meta,
        Err(diag) => return Err(Box::new(RepoCheckOutcome::CheckFailed(diag))),
    };

    let release_asset_url = if descriptor.release_asset {
        match fetch_release_asset(client, descriptor, api) {
            Ok(url) => url,
            Err(diag) => return Err(Box::new(RepoCheckOutcome::CheckFailed(diag))),
        }
    } else {
        None
    };

    let resolution = resolver::resolve(
        api,
        descriptor,
        header_version.as_deref(),
        tags,
        release_asset_url.as_deref(),
    );

    Ok((resolution, meta))
}

fn fetch_file(
    client: &HttpClient,
    descriptor: &RepoDescriptor,
    api: &dyn HostApi,
) -> Result<Option<String>, RepoDiagnostic> {
    let Some(url) = api.file_url(descriptor, &descriptor.remote_main_file()) else {
        return Ok(None);
    };

    match fetch_sub(client, descriptor, "file", &url) {
        SubFetch::Payload(value) => Ok(api.decode_file(&value)),
        SubFetch::Missing => Ok(None),
        SubFetch::Fatal(diag) => Err(diag),
    }
}

fn fetch_tags(
    client: &HttpClient,
    descriptor: &RepoDescriptor,
    api: &dyn HostApi,
) -> Result<Vec<Tag>, RepoDiagnostic> {
    let Some(url) = api.tags_url(descriptor) else {
        return Ok(Vec::new());
    };

    match fetch_sub(client, descriptor, "tags", &url) {
        SubFetch::Payload(value) => Ok(api.decode_tags(descriptor, &value)),
        SubFetch::Missing => Ok(Vec::new()),
        SubFetch::Fatal(diag) => Err(diag),
    }
}

fn fetch_meta(
    client: &HttpClient,
    descriptor: &RepoDescriptor,
    api: &dyn HostApi,
) -> Result<Option<RepoMeta>, RepoDiagnostic> {
    let Some(url) = api.meta_url(descriptor) else {
        return Ok(None);
    };

    match fetch_sub(client, descriptor, "meta", &url) {
        SubFetch::Payload(value) => Ok(api.decode_meta(&value)),
        SubFetch::Missing => Ok(None),
        SubFetch::Fatal(diag) => Err(diag),
    }
}

fn fetch_release_asset(
    client: &HttpClient,
    descriptor: &RepoDescriptor,
    api: &dyn HostApi,
) -> Result<Option<String>, RepoDiagnostic> {
    let Some(url) = api.release_url(descriptor) else {
        return Ok(None);
    };

    match fetch_sub(client, descriptor, "release_asset", &url) {
        SubFetch::Payload(value) => {
            let Some(asset) = api.decode_release_asset(&value) else {
                return Ok(None);
            };
            // asset URLs usually bounce through third-party storage;
            // record the final target so the package is fetchable
            // without credentials
            match client.resolve_redirect_target(
                descriptor.host,
                &asset,
                descriptor.token.as_deref(),
            ) {
                Ok(target) => Ok(Some(target)),
                Err(e) => {
                    log::debug!(
                        "**checker:** '{}' release asset redirect: {e}",
                        descriptor.slug
                    );
                    Ok(Some(asset))
                }
            }
        }
        SubFetch::Missing => Ok(None),
        SubFetch::Fatal(diag) => Err(diag),
    }
}

/// lists the remote branches of one repo. lenient: hosts without a
/// branch listing, and listing failures, yield an empty list.
pub fn fetch_branches(client: &HttpClient, descriptor: &RepoDescriptor) -> Vec<BranchInfo> {
    let api = api_for(descriptor.host);

    let Some(url) = api.branches_url(descriptor) else {
        return Vec::new();
    };

    match fetch_sub(client, descriptor, "branches", &url) {
        SubFetch::Payload(value) => api.decode_branches(descriptor, &value),
        SubFetch::Missing | SubFetch::Fatal(_) => Vec::new(),
    }
}

/// checks one repo. an update record is emitted only when the resolved
/// remote version strictly exceeds the local one; everything short of a
/// complete resolution produces a diagnostic, never a partial record.
pub fn check_repo(client: &HttpClient, descriptor: &RepoDescriptor) -> RepoCheckOutcome {
    let (resolution, _meta) = match resolve_repo(client, descriptor) {
        Ok(resolved) => resolved,
        Err(outcome) => return *outcome,
    };

    let Some(remote_version) = resolution.remote_version.as_deref() else {
        return RepoCheckOutcome::Skipped(RepoDiagnostic::new(
            &descriptor.slug,
            "no remote version available",
        ));
    };

    if descriptor.local_version.is_empty() {
        return RepoCheckOutcome::Skipped(RepoDiagnostic::new(
            &descriptor.slug,
            "local version unknown",
        ));
    }

    if !version::is_update_available(&descriptor.local_version, remote_version) {
        return RepoCheckOutcome::UpToDate(descriptor.slug.clone());
    }

    RepoCheckOutcome::Update(Box::new(UpdateRecord {
        slug: descriptor.slug.clone(),
        new_version: remote_version.to_string(),
        url: descriptor.homepage(),
        package: resolution.download_link,
    }))
}

/// checks every tracked repo in parallel. repos are independent; the
/// accumulated result does not depend on completion order beyond vector
/// ordering, which callers must not rely on.
pub fn check_all(client: &HttpClient, descriptors: &[RepoDescriptor]) -> CheckResult {
    let result = Arc::new(Mutex::new(CheckResult::new()));

    descriptors.par_iter().for_each(|descriptor| {
        let outcome = check_repo(client, descriptor);

        let mut result = result.lock();
        match outcome {
            RepoCheckOutcome::Update(update) => result.add_update(*update),
            RepoCheckOutcome::UpToDate(slug) => result.add_up_to_date(slug),
            RepoCheckOutcome::Skipped(diag) => result.add_skipped(diag),
            RepoCheckOutcome::CheckFailed(diag) => result.add_check_failure(diag),
        }
    });

    Arc::try_unwrap(result).expect("arc unwrap").into_inner()
}

/// builds the "more info" record for one repo: resolved version data
/// plus readme/changelog sections when the repo carries them.
pub fn repo_info(client: &HttpClient, descriptor: &RepoDescriptor) -> RepoInfo {
    let api = api_for(descriptor.host);

    let (resolution, meta) = match resolve_repo(client, descriptor) {
        Ok(resolved) => resolved,
        Err(_) => (
            Resolution {
                remote_version: None,
                newest_tag: None,
                tags: Vec::new(),
                download_link: String::new(),
            },
            None,
        ),
    };

    let remote_file = fetch_file(client, descriptor, api).ok().flatten();

    let mut info = RepoInfo {
        name: remote_file
            .as_deref()
            .and_then(|content| header_value(content, descriptor.repo_type.name_header()))
            .unwrap_or_else(|| descriptor.slug.clone()),
        slug: descriptor.slug.clone(),
        version: resolution
            .remote_version
            .clone()
            .unwrap_or_else(|| descriptor.local_version.clone()),
        author: remote_file
            .as_deref()
            .and_then(|content| header_value(content, "author"))
            .unwrap_or_default(),
        homepage: descriptor.homepage(),
        requires: remote_file
            .as_deref()
            .and_then(|content| header_value(content, "requires at least")),
        tested: remote_file
            .as_deref()
            .and_then(|content| header_value(content, "tested up to")),
        download_link: resolution.download_link.clone(),
        ..RepoInfo::default()
    };

    if let Some(meta) = meta {
        info.last_updated = meta.last_updated;
        info.num_ratings = meta.watchers;
        info.downloaded = meta.forks;
    }

    for (section, purpose, files) in [
        ("description", "readme", &["readme.txt", "README.md"][..]),
        ("changelog", "changelog", &["CHANGELOG.md", "CHANGES.md"][..]),
    ] {
        if let Some(content) = fetch_section(client, descriptor, api, purpose, files) {
            info.sections.insert(section.to_string(), content);
        }
    }

    info
}

fn fetch_section(
    client: &HttpClient,
    descriptor: &RepoDescriptor,
    api: &dyn HostApi,
    purpose: &str,
    candidates: &[&str],
) -> Option<String> {
    for (i, file) in candidates.iter().enumerate() {
        let url = api.file_url(descriptor, file)?;
        let purpose = if i == 0 {
            purpose.to_string()
        } else {
            format!("{purpose}{i}")
        };
        match fetch_sub(client, descriptor, &purpose, &url) {
            SubFetch::Payload(value) => {
                if let Some(content) = api.decode_file(&value) {
                    return Some(content);
                }
            }
            SubFetch::Missing => continue,
            SubFetch::Fatal(_) => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::client::{CacheTtls, RawResponse, Transport};
    use crate::types::RepoType;
    use base64::Engine as _;
    use serde_json::json;

    /// transport answering by URL substring, so parallel fetch order
    /// does not matter.
    struct RoutedTransport {
        routes: Vec<(&'static str, RawResponse)>,
    }

    impl Transport for RoutedTransport {
        fn get(&self, url: &str, _headers: &[(String, String)]) -> crate::error::Result<RawResponse> {
            for (pattern, response) in &self.routes {
                if url.contains(pattern) {
                    return Ok(response.clone());
                }
            }
            Ok(RawResponse {
                status: 404,
                body: json!({"message": "Not Found"}).to_string(),
                ..Default::default()
            })
        }
    }

    fn ok(body: String) -> RawResponse {
        RawResponse {
            status: 200,
            body,
            ..Default::default()
        }
    }

    fn contents_payload(text: &str) -> String {
        json!({
            "content": base64::engine::general_purpose::STANDARD.encode(text),
            "encoding": "base64"
        })
        .to_string()
    }

    fn client_with_routes(routes: Vec<(&'static str, RawResponse)>) -> HttpClient {
        HttpClient::new(
            Arc::new(RoutedTransport { routes }),
            Arc::new(MemoryCache::new()),
            CacheTtls::default(),
        )
    }

    fn descriptor(local_version: &str) -> RepoDescriptor {
        let mut d = RepoDescriptor::new("widget", RepoType::Plugin, GitHost::GitHub, "acme", "widget");
        d.local_version = local_version.to_string();
        d
    }

    #[test]
    fn end_to_end_tag_update() {
        // tags ["2.1.0","2.0.0"], header 2.0.0, local 2.0.0
        let client = client_with_routes(vec![
            (
                "/contents/widget.php",
                ok(contents_payload("/*\nPlugin Name: Widget\nVersion: 2.0.0\n*/")),
            ),
            (
                "/tags",
                ok(json!([
                    {"name": "2.1.0", "zipball_url": "https://api.github.com/repos/acme/widget/zipball/2.1.0"},
                    {"name": "2.0.0", "zipball_url": "https://api.github.com/repos/acme/widget/zipball/2.0.0"}
                ])
                .to_string()),
            ),
            (
                "/repos/acme/widget",
                ok(json!({"private": false, "pushed_at": "2024-05-01T00:00:00Z", "watchers": 3, "forks": 1, "open_issues": 0}).to_string()),
            ),
        ]);

        let outcome = check_repo(&client, &descriptor("2.0.0"));
        let RepoCheckOutcome::Update(update) = outcome else {
            panic!("expected an update record");
        };
        assert_eq!(update.slug, "widget");
        assert_eq!(update.new_version, "2.1.0");
        assert_eq!(
            update.package,
            "https://api.github.com/repos/acme/widget/zipball/2.1.0"
        );
        assert_eq!(update.url, "https://github.com/acme/widget");
    }

    #[test]
    fn no_record_when_versions_equal() {
        // equal versions emit nothing
        let client = client_with_routes(vec![
            (
                "/contents/widget.php",
                ok(contents_payload("/* Version: 1.0.0 */")),
            ),
            (
                "/tags",
                ok(json!([{"name": "1.0.0", "zipball_url": "https://api.github.com/repos/acme/widget/zipball/1.0.0"}]).to_string()),
            ),
            ("/repos/acme/widget", ok(json!({"private": false}).to_string())),
        ]);

        let outcome = check_repo(&client, &descriptor("1.0.0"));
        assert!(matches!(outcome, RepoCheckOutcome::UpToDate(_)));
    }

    #[test]
    fn record_on_patch_increase() {
        // a patch-level increase emits a record
        let client = client_with_routes(vec![
            (
                "/contents/widget.php",
                ok(contents_payload("/* Version: 1.0.1 */")),
            ),
            (
                "/tags",
                ok(json!([{"name": "1.0.1", "zipball_url": "https://api.github.com/repos/acme/widget/zipball/1.0.1"}]).to_string()),
            ),
            ("/repos/acme/widget", ok(json!({"private": false}).to_string())),
        ]);

        let outcome = check_repo(&client, &descriptor("1.0.0"));
        let RepoCheckOutcome::Update(update) = outcome else {
            panic!("expected an update record");
        };
        assert_eq!(update.new_version, "1.0.1");
    }

    #[test]
    fn missing_remote_header_skips_repo() {
        let client = client_with_routes(vec![
            (
                "/contents/widget.php",
                ok(contents_payload("<?php // no header block")),
            ),
            (
                "/tags",
                ok(json!([{"name": "9.9.9", "zipball_url": "https://api.github.com/repos/acme/widget/zipball/9.9.9"}]).to_string()),
            ),
            ("/repos/acme/widget", ok(json!({"private": false}).to_string())),
        ]);

        let outcome = check_repo(&client, &descriptor("1.0.0"));
        let RepoCheckOutcome::Skipped(diag) = outcome else {
            panic!("expected a skip");
        };
        assert_eq!(diag.slug, "widget");
    }

    #[test]
    fn missing_tags_fall_back_to_branch_archive() {
        let client = client_with_routes(vec![
            (
                "/contents/widget.php",
                ok(contents_payload("/* Version: 1.1.0 */")),
            ),
            ("/repos/acme/widget", ok(json!({"private": false}).to_string())),
            // tags route intentionally absent -> 404 -> no tags
        ]);

        let outcome = check_repo(&client, &descriptor("1.0.0"));
        let RepoCheckOutcome::Update(update) = outcome else {
            panic!("expected an update record");
        };
        assert_eq!(update.new_version, "1.1.0");
        assert!(update.package.ends_with("/zipball/master"), "{}", update.package);
    }

    #[test]
    fn rate_limited_repo_fails_with_retry_window() {
        let reset = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 120;
        let client = client_with_routes(vec![(
            "/contents/widget.php",
            RawResponse {
                status: 403,
                body: "rate limit exceeded".to_string(),
                ratelimit_reset: Some(reset),
                ..Default::default()
            },
        )]);

        let outcome = check_repo(&client, &descriptor("1.0.0"));
        let RepoCheckOutcome::CheckFailed(diag) = outcome else {
            panic!("expected a check failure");
        };
        assert!(diag.retry_after_secs.is_some());
    }

    #[test]
    fn zipfile_repo_is_skipped_quietly() {
        let client = client_with_routes(vec![]);
        let mut d = descriptor("1.0.0");
        d.host = GitHost::Zipfile;
        d.uri = Some("https://downloads.example.com/widget.zip".to_string());

        let outcome = check_repo(&client, &d);
        assert!(matches!(outcome, RepoCheckOutcome::Skipped(_)));
    }

    #[test]
    fn release_asset_package_uses_final_redirect_target() {
        let client = client_with_routes(vec![
            (
                "/contents/widget.php",
                ok(contents_payload("/* Version: 1.1.0 */")),
            ),
            (
                "/tags",
                ok(json!([{"name": "1.1.0", "zipball_url": "https://api.github.com/repos/acme/widget/zipball/1.1.0"}]).to_string()),
            ),
            (
                "/releases/latest",
                ok(json!({
                    "tag_name": "1.1.0",
                    "assets": [{"browser_download_url": "https://github.com/acme/widget/releases/download/1.1.0/widget.zip"}]
                })
                .to_string()),
            ),
            (
                "/releases/download/",
                RawResponse {
                    status: 302,
                    location: Some("https://bucket.s3.amazonaws.com/widget.zip?sig=abc".to_string()),
                    ..Default::default()
                },
            ),
            (
                "s3.amazonaws.com",
                RawResponse {
                    status: 200,
                    body: String::new(),
                    ..Default::default()
                },
            ),
            ("/repos/acme/widget", ok(json!({"private": true}).to_string())),
        ]);

        let mut d = descriptor("1.0.0");
        d.release_asset = true;

        let outcome = check_repo(&client, &d);
        let RepoCheckOutcome::Update(update) = outcome else {
            panic!("expected an update record");
        };
        assert_eq!(update.new_version, "1.1.0");
        assert_eq!(
            update.package,
            "https://bucket.s3.amazonaws.com/widget.zip?sig=abc"
        );
    }

    #[test]
    fn check_all_aggregates_independent_repos() {
        let client = client_with_routes(vec![
            (
                "/contents/widget.php",
                ok(contents_payload("/* Version: 2.0.0 */")),
            ),
            (
                "/contents/other.php",
                ok(contents_payload("/* Version: 1.0.0 */")),
            ),
            (
                "widget/tags",
                ok(json!([{"name": "2.0.0", "zipball_url": "https://api.github.com/repos/acme/widget/zipball/2.0.0"}]).to_string()),
            ),
            (
                "other/tags",
                ok(json!([{"name": "1.0.0", "zipball_url": "https://api.github.com/repos/acme/other/zipball/1.0.0"}]).to_string()),
            ),
            ("/repos/acme/widget", ok(json!({"private": false}).to_string())),
            ("/repos/acme/other", ok(json!({"private": false}).to_string())),
        ]);

        let mut widget = descriptor("1.0.0");
        widget.local_version = "1.0.0".to_string();
        let mut other = RepoDescriptor::new("other", RepoType::Plugin, GitHost::GitHub, "acme", "other");
        other.local_version = "1.0.0".to_string();

        let result = check_all(&client, &[widget, other]);

        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].slug, "widget");
        assert_eq!(result.up_to_date, vec!["other".to_string()]);
        assert!(result.check_failures.is_empty());
    }

    #[test]
    fn info_collects_sections() {
        let client = client_with_routes(vec![
            (
                "/contents/widget.php",
                ok(contents_payload(
                    "/*\nPlugin Name: Acme Widget\nVersion: 2.0.0\nAuthor: Acme Co\nRequires at least: 5.9\nTested up to: 6.4\n*/",
                )),
            ),
            ("/contents/readme.txt", ok(contents_payload("Widget readme body"))),
            ("/contents/CHANGELOG.md", ok(contents_payload("## 2.0.0\n- stuff"))),
            (
                "/tags",
                ok(json!([{"name": "2.0.0", "zipball_url": "https://api.github.com/repos/acme/widget/zipball/2.0.0"}]).to_string()),
            ),
            (
                "/repos/acme/widget",
                ok(json!({"private": false, "pushed_at": "2024-05-01T00:00:00Z", "watchers": 12, "forks": 4, "open_issues": 1}).to_string()),
            ),
        ]);

        let info = repo_info(&client, &descriptor("2.0.0"));

        assert_eq!(info.name, "Acme Widget");
        assert_eq!(info.version, "2.0.0");
        assert_eq!(info.author, "Acme Co");
        assert_eq!(info.requires.as_deref(), Some("5.9"));
        assert_eq!(info.tested.as_deref(), Some("6.4"));
        assert_eq!(info.last_updated, "2024-05-01T00:00:00Z");
        assert_eq!(
            info.sections.get("description").map(String::as_str),
            Some("Widget readme body")
        );
        assert!(info.sections.get("changelog").unwrap().contains("2.0.0"));
    }
}
