// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::path::PathBuf;

use crate::client::CacheTtls;
use crate::types::{GitHost, RepoDescriptor};

/// verbosity level for operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quiet => write!(f, "quiet"),
            Self::Normal => write!(f, "normal"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

/// configuration for update checks.
///
/// consumers can construct this directly; the CLI layers TOML parsing on
/// top. tokens and instance bases are keyed by repo slug (specific) or
/// host name (site-wide), with the slug winning.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// directories scanned for installed plugins.
    pub plugin_dirs: Vec<PathBuf>,

    /// directories scanned for installed themes.
    pub theme_dirs: Vec<PathBuf>,

    /// explicitly configured repos, merged over discovered ones
    /// (an explicit entry wins on slug collision).
    pub repos: Vec<RepoDescriptor>,

    /// access tokens keyed by slug or host name.
    pub tokens: HashMap<String, String>,

    /// self-hosted API bases keyed by host name.
    pub enterprise_bases: HashMap<String, String>,

    /// branch pins keyed by slug, applied after discovery.
    pub branch_pins: HashMap<String, String>,

    /// slugs excluded from checks entirely.
    pub exclude: Vec<String>,

    /// cache TTL policy.
    pub ttls: CacheTtls,

    /// cache directory override; defaults to the XDG cache dir.
    pub cache_dir: Option<PathBuf>,

    /// verbosity level for output.
    pub verbosity: Verbosity,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.plugin_dirs = dirs;
        self
    }

    pub fn with_theme_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.theme_dirs = dirs;
        self
    }

    pub fn with_repos(mut self, repos: Vec<RepoDescriptor>) -> Self {
        self.repos = repos;
        self
    }

    pub fn with_tokens(mut self, tokens: HashMap<String, String>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// token for one repo: a slug-specific token wins over the host-wide
    /// one.
    pub fn token_for(&self, descriptor: &RepoDescriptor) -> Option<&str> {
        self.tokens
            .get(&descriptor.slug)
            .or_else(|| self.tokens.get(descriptor.host.as_str()))
            .map(String::as_str)
    }

    fn enterprise_base_for(&self, host: GitHost) -> Option<&str> {
        self.enterprise_bases.get(host.as_str()).map(String::as_str)
    }

    /// merges discovered descriptors with configured ones and applies
    /// tokens, pins and instance bases. configured repos win on slug
    /// collision; excluded slugs are dropped.
    pub fn merge_descriptors(&self, discovered: Vec<RepoDescriptor>) -> Vec<RepoDescriptor> {
        let mut merged: Vec<RepoDescriptor> = Vec::new();

        for descriptor in discovered {
            if self.repos.iter().any(|r| r.slug == descriptor.slug) {
                continue;
            }
            merged.push(descriptor);
        }
        merged.extend(self.repos.iter().cloned());

        merged.retain(|d| {
            if self.exclude.contains(&d.slug) {
                log::debug!("**config:** '{}' excluded", d.slug);
                return false;
            }
            true
        });

        for descriptor in &mut merged {
            if descriptor.token.is_none() {
                descriptor.token = self.token_for(descriptor).map(str::to_string);
            }
            if descriptor.enterprise_base.is_none() {
                descriptor.enterprise_base = self
                    .enterprise_base_for(descriptor.host)
                    .map(str::to_string);
            }
            if let Some(pin) = self.branch_pins.get(&descriptor.slug) {
                descriptor.branch = pin.clone();
            }
        }

        merged
    }
}
