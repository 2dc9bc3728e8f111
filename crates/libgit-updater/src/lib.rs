// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Packages declare their git source in the header block of their main
// file ("GitHub Plugin URI: owner/repo" and friends). This library
// discovers those packages, resolves the authoritative remote version
// against the host's REST API (header version reconciled with the tag
// list), and emits normalized update records for the consuming updater.

pub mod cache;
pub mod checker;
pub mod client;
pub mod config;
pub mod discovery;
pub mod download;
pub mod error;
pub mod headers;
pub mod hosts;
mod paths;
pub mod resolver;
pub mod types;
pub mod version;

use std::sync::Arc;

pub use cache::{CacheStore, FileCache, MemoryCache, cache_key, slug_prefix};
pub use checker::{RepoCheckOutcome, check_all, check_repo, fetch_branches};
pub use client::{ApiResult, CacheTtls, HttpClient, ReqwestTransport, Transport, auth_headers};
pub use config::{Config, Verbosity};
pub use discovery::scan_installed;
pub use download::{create_download_client, download_package};
pub use error::{Error, Result};
pub use hosts::{HostApi, api_for};
pub use resolver::{Resolution, resolve};
pub use types::{
    BranchInfo, CheckResult, GitHost, JsonOutput, RepoDescriptor, RepoDiagnostic, RepoInfo,
    RepoMeta, RepoType, Tag, UpdateRecord,
};
pub use version::{compare as compare_versions, is_update_available};

/// builds the HTTP client with the persistent file cache configured for
/// this config.
pub fn build_client(config: &Config) -> HttpClient {
    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(FileCache::default_dir);

    HttpClient::new(
        Arc::new(ReqwestTransport::new()),
        Arc::new(FileCache::new(cache_dir)),
        config.ttls,
    )
}

/// every repo tracked under this config: discovered packages merged
/// with explicitly configured ones.
pub fn tracked_repos(config: &Config) -> Result<Vec<RepoDescriptor>> {
    let discovered = scan_installed(config)?;
    Ok(config.merge_descriptors(discovered))
}

/// checks every tracked repo for updates.
pub fn check_updates(config: &Config) -> Result<CheckResult> {
    let repos = tracked_repos(config)?;
    if repos.is_empty() {
        return Ok(CheckResult::new());
    }

    let client = build_client(config);
    Ok(check_all(&client, &repos))
}

/// builds the detailed info record for one tracked repo.
pub fn repo_info(config: &Config, slug: &str) -> Result<RepoInfo> {
    let repos = tracked_repos(config)?;
    let descriptor = repos
        .iter()
        .find(|d| d.slug == slug)
        .ok_or_else(|| Error::repo_not_found(slug))?;

    let client = build_client(config);
    Ok(checker::repo_info(&client, descriptor))
}

/// lists the remote branches of one tracked repo.
pub fn remote_branches(config: &Config, slug: &str) -> Result<Vec<BranchInfo>> {
    let repos = tracked_repos(config)?;
    let descriptor = repos
        .iter()
        .find(|d| d.slug == slug)
        .ok_or_else(|| Error::repo_not_found(slug))?;

    let client = build_client(config);
    Ok(checker::fetch_branches(&client, descriptor))
}

/// drops every cached API response.
pub fn clear_cache(config: &Config) {
    build_client(config).cache().clear_all();
}

/// drops one repo's cached API responses, forcing a fresh check.
pub fn clear_repo_cache(config: &Config, slug: &str) {
    build_client(config).cache().clear_prefix(&slug_prefix(slug));
}
