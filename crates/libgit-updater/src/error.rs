// SPDX-License-Identifier: MIT OR Apache-2.0

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("api rate limited{}", retry_hint(.0))]
    RateLimited(Option<u64>),

    #[error("api returned error status: {0}")]
    ApiError(u16),

    #[error("failed to parse api payload: {0}")]
    PayloadParse(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository not tracked: {0}")]
    RepoNotFound(String),

    #[error("invalid repository source: {0}")]
    InvalidSource(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("{0}")]
    Other(String),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry in {secs}s"),
        None => String::new(),
    }
}

macro_rules! error_ctor {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $name(msg: impl Into<String>) -> Self {
                Self::$variant(msg.into())
            }
        )*
    };
}

impl Error {
    error_ctor!(
        repo_not_found => RepoNotFound,
        invalid_source => InvalidSource,
        config => Config,
        invalid_version => InvalidVersion,
        download => DownloadFailed,
        cache => Cache,
        other => Other,
    );

    pub fn checksum(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ChecksumMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
