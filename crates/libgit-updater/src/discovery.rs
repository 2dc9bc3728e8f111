// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::headers::parse_header_block;
use crate::types::{GitHost, RepoDescriptor, RepoType};

/// scans the configured plugin/theme directories and builds a descriptor
/// for every package whose header block names a git source. packages
/// with broken or absent source headers are skipped, never fatal.
pub fn scan_installed(config: &Config) -> Result<Vec<RepoDescriptor>> {
    let mut descriptors = Vec::new();

    for dir in &config.plugin_dirs {
        descriptors.extend(scan_directory(dir, RepoType::Plugin));
    }
    for dir in &config.theme_dirs {
        descriptors.extend(scan_directory(dir, RepoType::Theme));
    }

    Ok(descriptors)
}

fn scan_directory(dir: &Path, repo_type: RepoType) -> Vec<RepoDescriptor> {
    let mut descriptors = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return descriptors,
    };

    for entry in entries.flatten() {
        let path = entry.path();

        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
        else {
            continue;
        };

        let parsed = if path.is_dir() {
            read_package_headers(&path, &name, repo_type)
        } else if repo_type == RepoType::Plugin && name.ends_with(".php") {
            // single-file plugin living directly in the plugins dir
            fs::read_to_string(&path)
                .ok()
                .map(|content| (name.trim_end_matches(".php").to_string(), parse_header_block(&content)))
        } else {
            None
        };

        let Some((slug, headers)) = parsed else {
            continue;
        };

        match descriptor_from_headers(&slug, repo_type, &headers, &path) {
            Some(descriptor) => descriptors.push(descriptor),
            None => {
                log::debug!("**discovery:** '{slug}' has no usable git source header");
            }
        }
    }

    descriptors
}

fn read_package_headers(
    package_dir: &Path,
    dir_name: &str,
    repo_type: RepoType,
) -> Option<(String, HashMap<String, String>)> {
    let main_file = match repo_type {
        RepoType::Plugin => package_dir.join(format!("{dir_name}.php")),
        RepoType::Theme => package_dir.join("style.css"),
    };

    let content = fs::read_to_string(&main_file).ok()?;
    let headers = parse_header_block(&content);

    if !headers.contains_key(repo_type.name_header()) {
        return None;
    }

    Some((dir_name.to_string(), headers))
}

/// builds a descriptor from a parsed header map. requires a
/// `<Host> Plugin URI` / `<Host> Theme URI` header naming the source;
/// everything else is optional with header-driven overrides.
pub fn descriptor_from_headers(
    slug: &str,
    repo_type: RepoType,
    headers: &HashMap<String, String>,
    path: &Path,
) -> Option<RepoDescriptor> {
    let kind = match repo_type {
        RepoType::Plugin => "plugin",
        RepoType::Theme => "theme",
    };

    let mut source = None;
    for &host in GitHost::all() {
        let key = format!("{} {kind} uri", host.header_key());
        if let Some(value) = headers.get(&key) {
            source = Some((host, value.clone()));
            break;
        }
    }
    let (host, uri) = source?;

    let mut descriptor = if uri.contains("://") {
        match RepoDescriptor::from_uri(&uri, Some(host), repo_type, None, None) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("**discovery:** '{slug}': {e}");
                return None;
            }
        }
    } else if host == GitHost::Zipfile {
        log::warn!("**discovery:** '{slug}': zipfile source must be a full URL");
        return None;
    } else {
        let (owner, repo) = uri.split_once('/')?;
        if owner.is_empty() || repo.is_empty() {
            log::warn!("**discovery:** '{slug}': malformed source '{uri}'");
            return None;
        }
        RepoDescriptor::new(slug, repo_type, host, owner, repo)
    };

    // a bitbucket source on a self-hosted domain is a bitbucket server
    if descriptor.host == GitHost::Bitbucket && descriptor.enterprise_base.is_some() {
        descriptor.host = GitHost::BitbucketServer;
    }

    descriptor.slug = slug.to_string();
    descriptor.repo_type = repo_type;
    descriptor.path = Some(path.to_path_buf());
    descriptor.local_version = headers.get("version").cloned().unwrap_or_default();

    if let Some(branch) = headers.get("primary branch")
        && !branch.is_empty()
    {
        descriptor.primary_branch = branch.clone();
    }

    if let Some(release_asset) = headers.get("release asset") {
        descriptor.release_asset =
            matches!(release_asset.to_ascii_lowercase().as_str(), "true" | "yes" | "1");
    }

    Some(descriptor)
}
