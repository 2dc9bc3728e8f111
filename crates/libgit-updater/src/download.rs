// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::auth_headers;
use crate::error::{Error, Result};
use crate::types::RepoDescriptor;

const DOWNLOAD_TIMEOUT_SECS: u64 = 120;
const MAX_REDIRECTS: usize = 5;

/// creates the HTTP client used for package downloads. redirects are
/// followed manually so credentials can be dropped once a hop leaves
/// the API host for asset storage.
pub fn create_download_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .user_agent(concat!("git-updater/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("failed to create http client")
}

/// downloads a package archive to `dest_dir`, streaming through an md5
/// context for optional checksum verification. returns the downloaded
/// file path.
pub fn download_package(
    client: &reqwest::blocking::Client,
    descriptor: &RepoDescriptor,
    url: &str,
    dest_dir: &Path,
    expected_checksum: Option<&str>,
) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)?;

    let mut current = url.to_string();
    let mut response = None;

    for _ in 0..=MAX_REDIRECTS {
        let mut request = client.get(&current);
        for (name, value) in auth_headers(descriptor.host, descriptor.token.as_deref(), &current) {
            request = request.header(name, value);
        }

        let candidate = request
            .send()
            .map_err(|e| Error::download(format!("request failed: {e}")))?;

        let status = candidate.status();
        if status.is_redirection() {
            let Some(location) = candidate
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
            else {
                return Err(Error::download(format!("redirect without location from {current}")));
            };
            current = if location.starts_with("http") {
                location.to_string()
            } else {
                url::Url::parse(&current)
                    .ok()
                    .and_then(|b| b.join(location).ok())
                    .map(String::from)
                    .ok_or_else(|| Error::download(format!("bad redirect location: {location}")))?
            };
            continue;
        }

        if !status.is_success() {
            return Err(Error::download(format!("http status {status}")));
        }

        response = Some(candidate);
        break;
    }

    let mut reader =
        response.ok_or_else(|| Error::download(format!("too many redirects for {url}")))?;

    let file_name = archive_file_name(descriptor, &current);
    let dest = dest_dir.join(&file_name);

    let mut file = File::create(&dest)?;
    let mut hasher = md5::Context::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| Error::download(format!("read error: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        let chunk = &buffer[..bytes_read];
        hasher.consume(chunk);
        file.write_all(chunk)?;
    }

    if let Some(expected) = expected_checksum {
        let actual = format!("{:x}", hasher.finalize());
        if actual != expected.to_lowercase() {
            fs::remove_file(&dest).ok();
            return Err(Error::checksum(expected, actual));
        }
        log::debug!("**download:** verified md5 for {file_name}");
    }

    Ok(dest)
}

fn archive_file_name(descriptor: &RepoDescriptor, url: &str) -> String {
    let from_url = url
        .split('?')
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| name.ends_with(".zip") || name.ends_with(".tar.gz"));

    match from_url {
        Some(name) => name.to_string(),
        None => format!("{}.zip", descriptor.slug),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GitHost, RepoType};

    fn descriptor() -> RepoDescriptor {
        RepoDescriptor::new("widget", RepoType::Plugin, GitHost::GitHub, "acme", "widget")
    }

    #[test]
    fn archive_name_from_url() {
        let d = descriptor();
        assert_eq!(
            archive_file_name(&d, "https://bitbucket.org/acme/widget/get/1.0.0.zip"),
            "1.0.0.zip"
        );
        assert_eq!(
            archive_file_name(&d, "https://gitlab.com/api/v4/projects/a%2Fb/repository/archive.zip?sha=1.0"),
            "archive.zip"
        );
        // api zipball urls have no extension; fall back to the slug
        assert_eq!(
            archive_file_name(&d, "https://api.github.com/repos/acme/widget/zipball/1.0.0"),
            "widget.zip"
        );
    }
}
