// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{CacheStore, cache_key};
use crate::error::Result;
use crate::types::GitHost;

const USER_AGENT: &str = concat!("git-updater/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 60;
const MAX_REDIRECTS: usize = 5;

/// classified outcome of one API request. every decode site works off
/// this sum type instead of probing payloads for ad hoc error fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResult<T> {
    Ok(T),
    NotFound,
    RateLimited { retry_after: Option<u64> },
    Failed { status: u16, message: String },
}

impl<T> ApiResult<T> {
    pub fn into_ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// short reason for diagnostics when this is not `Ok`.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Ok(_) => None,
            Self::NotFound => Some("not found".to_string()),
            Self::RateLimited { retry_after } => Some(match retry_after {
                Some(secs) => format!("rate limited, retry in {secs}s"),
                None => "rate limited".to_string(),
            }),
            Self::Failed { status, message } => Some(format!("http {status}: {message}")),
        }
    }
}

/// raw HTTP response as the transport layer sees it.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// `x-ratelimit-reset` as a unix timestamp, when the host sent one.
    pub ratelimit_reset: Option<u64>,
    /// `location` header on redirects.
    pub location: Option<String>,
}

/// blocking GET transport. the seam exists so the cache and
/// classification logic can be exercised without a network.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<RawResponse>;
}

/// reqwest-backed transport. redirects are not followed automatically;
/// the client follows them itself so auth headers can be dropped when a
/// hop leaves the API host.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("failed to create http client");

        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<RawResponse> {
        let mut request = self.client.get(url).header("Accept", "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send()?;
        let status = response.status().as_u16();

        let header_u64 = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };
        let ratelimit_reset = header_u64("x-ratelimit-reset");
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text()?;

        Ok(RawResponse {
            status,
            body,
            ratelimit_reset,
            location,
        })
    }
}

/// hosts that must never see an Authorization header: the platform
/// directory itself, and third-party release-asset storage reached via
/// redirect. sending credentials there leaks them.
pub fn should_omit_auth(url: &str) -> bool {
    is_wordpress_org(url) || is_asset_storage(url)
}

fn is_wordpress_org(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .is_some_and(|host| host == "wordpress.org" || host.ends_with(".wordpress.org"))
}

/// release-asset storage signature: S3-style blob hosts and the
/// `releases/download` path browsers are redirected through.
pub fn is_asset_storage(url: &str) -> bool {
    url.contains("s3.amazonaws.com")
        || url.contains("objects.githubusercontent.com")
        || url.contains("/releases/download/")
}

/// builds the auth headers for one request. returns nothing when the
/// target must not receive credentials.
pub fn auth_headers(host: GitHost, token: Option<&str>, url: &str) -> Vec<(String, String)> {
    let Some(token) = token else {
        return Vec::new();
    };
    if token.is_empty() || should_omit_auth(url) {
        return Vec::new();
    }

    match host {
        GitHost::GitHub | GitHost::Gist | GitHost::Gitea => {
            vec![("Authorization".to_string(), format!("token {token}"))]
        }
        GitHost::GitLab => vec![("PRIVATE-TOKEN".to_string(), token.to_string())],
        GitHost::Bitbucket | GitHost::BitbucketServer => {
            // bitbucket tokens are user:app-password pairs sent as basic auth
            let encoded = BASE64.encode(token.as_bytes());
            vec![("Authorization".to_string(), format!("Basic {encoded}"))]
        }
        GitHost::Zipfile => Vec::new(),
    }
}

/// TTL policy for the cache layer, all overridable from config.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    /// successful metadata responses.
    pub metadata: Duration,
    /// error backoff when the host gives no rate-limit window.
    pub error: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            metadata: Duration::from_secs(60 * 60),
            error: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedError {
    #[serde(rename = "__cached_error__")]
    marker: bool,
    status: u16,
    message: String,
    /// absolute unix time at which retrying makes sense.
    retry_at: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// HTTP client with a cache gate in front of every request. per-repo
/// entries are independent; concurrent checks for different repos never
/// contend on each other's keys.
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore>,
    ttls: CacheTtls,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self {
            transport,
            cache,
            ttls,
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// fetches `url` for `slug`, gated by the cache under
    /// `(slug, purpose)`. cached errors are returned without touching the
    /// network until their backoff expires. transport-level failures
    /// propagate as `Err` and are never cached.
    pub fn fetch(
        &self,
        host: GitHost,
        slug: &str,
        purpose: &str,
        url: &str,
        token: Option<&str>,
    ) -> Result<ApiResult<Value>> {
        let key = cache_key(slug, purpose);

        if let Some((value, expired)) = self.cache.get(&key)
            && !expired
        {
            return Ok(from_cached(value));
        }

        let (response, _final_url) = self.follow_redirects(host, url, token)?;
        Ok(self.classify_and_cache(host, &key, response))
    }

    /// resolves the final target of a redirect chain, e.g. a release
    /// asset bouncing through third-party storage. the resolved URL is
    /// returned directly; credentials are dropped as soon as a hop
    /// matches the asset-storage signature.
    pub fn resolve_redirect_target(
        &self,
        host: GitHost,
        url: &str,
        token: Option<&str>,
    ) -> Result<String> {
        let (_, final_url) = self.follow_redirects(host, url, token)?;
        Ok(final_url)
    }

    fn follow_redirects(
        &self,
        host: GitHost,
        url: &str,
        token: Option<&str>,
    ) -> Result<(RawResponse, String)> {
        let mut current = url.to_string();

        for _ in 0..MAX_REDIRECTS {
            let headers = auth_headers(host, token, &current);
            let response = self.transport.get(&current, &headers)?;

            if (300..400).contains(&response.status)
                && let Some(location) = response.location.as_deref()
            {
                current = absolutize(&current, location);
                continue;
            }

            return Ok((response, current));
        }

        log::warn!("**client:** redirect limit reached for {url}");
        let headers = auth_headers(host, token, &current);
        let response = self.transport.get(&current, &headers)?;
        Ok((response, current))
    }

    fn classify_and_cache(&self, host: GitHost, key: &str, response: RawResponse) -> ApiResult<Value> {
        let status = response.status;

        if (200..300).contains(&status) {
            let value = serde_json::from_str::<Value>(&response.body)
                .unwrap_or_else(|_| Value::String(response.body));
            // a success supersedes any previously cached error for this key
            self.cache.set(key, value.clone(), self.ttls.metadata);
            return ApiResult::Ok(value);
        }

        let rate_limited =
            host.rate_limit_aware() && (status == 403 || status == 429) && response.ratelimit_reset.is_some();

        let retry_at = if rate_limited {
            // back off exactly as long as the provider's window
            response.ratelimit_reset.unwrap_or(0).max(now_secs())
        } else {
            now_secs().saturating_add(self.ttls.error.as_secs())
        };

        let message = excerpt(&response.body);
        let cached = CachedError {
            marker: true,
            status,
            message: message.clone(),
            retry_at,
        };
        if let Ok(value) = serde_json::to_value(&cached) {
            let ttl = Duration::from_secs(retry_at.saturating_sub(now_secs()));
            self.cache.set(key, value, ttl);
        }

        match status {
            404 => ApiResult::NotFound,
            _ if rate_limited => ApiResult::RateLimited {
                retry_after: Some(retry_at.saturating_sub(now_secs())),
            },
            _ => ApiResult::Failed { status, message },
        }
    }
}

fn from_cached(value: Value) -> ApiResult<Value> {
    let Ok(error) = serde_json::from_value::<CachedError>(value.clone()) else {
        return ApiResult::Ok(value);
    };

    match error.status {
        404 => ApiResult::NotFound,
        403 | 429 => ApiResult::RateLimited {
            retry_after: Some(error.retry_at.saturating_sub(now_secs())),
        },
        status => ApiResult::Failed {
            status,
            message: error.message,
        },
    }
}

fn absolutize(base: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }
    url::Url::parse(base)
        .ok()
        .and_then(|b| b.join(location).ok())
        .map(String::from)
        .unwrap_or_else(|| location.to_string())
}

fn excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= LIMIT {
        trimmed.to_string()
    } else {
        let mut end = LIMIT;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}
