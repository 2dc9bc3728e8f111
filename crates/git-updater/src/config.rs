// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use libgit_updater::{
    CacheTtls, Config, Error, GitHost, RepoDescriptor, RepoType, Result, Verbosity,
};
use serde::Deserialize;

const CONFIG_FILE_NAME: &str = "git-updater.toml";
const PINS_FILE_NAME: &str = "git-updater-pins.toml";

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn pins_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(PINS_FILE_NAME))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TomlConfig {
    plugin_dirs: Vec<PathBuf>,
    theme_dirs: Vec<PathBuf>,
    exclude: Vec<String>,
    verbosity: Option<String>,
    cache_dir: Option<PathBuf>,
    metadata_ttl_secs: Option<u64>,
    error_ttl_secs: Option<u64>,
    tokens: HashMap<String, String>,
    enterprise: HashMap<String, String>,
    branch_pins: HashMap<String, String>,
    repos: Vec<TomlRepo>,
}

/// one explicitly configured repo. `source` is either `owner/repo` or a
/// full URL; a malformed entry only loses that repo, never the run.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TomlRepo {
    slug: String,
    #[serde(rename = "type")]
    repo_type: Option<RepoType>,
    host: Option<GitHost>,
    source: String,
    branch: Option<String>,
    primary_branch: Option<String>,
    token: Option<String>,
    release_asset: bool,
}

impl TomlRepo {
    fn into_descriptor(self) -> Option<RepoDescriptor> {
        if self.slug.is_empty() || self.source.is_empty() {
            log::warn!("**config:** repo entry missing slug or source, skipped");
            return None;
        }

        let repo_type = self.repo_type.unwrap_or_default();

        let mut descriptor = match RepoDescriptor::from_uri(
            &self.source,
            self.host,
            repo_type,
            self.branch.as_deref(),
            self.token.as_deref(),
        ) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("**config:** repo '{}' skipped: {e}", self.slug);
                return None;
            }
        };

        descriptor.slug = self.slug;
        if let Some(primary) = self.primary_branch {
            descriptor.primary_branch = primary;
        }
        descriptor.release_asset = self.release_asset;
        Some(descriptor)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PinsFile {
    branch_pins: HashMap<String, String>,
}

/// cli configuration wrapper combining the toml file, the pins state
/// file and the library config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub inner: Config,
}

impl std::ops::Deref for CliConfig {
    type Target = Config;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl CliConfig {
    pub fn load() -> Result<Self> {
        let toml_config = Self::load_toml_config()?;
        let pins = Self::load_pins()?;

        let verbosity = match toml_config.verbosity.as_deref() {
            Some("quiet") => Verbosity::Quiet,
            Some("verbose") => Verbosity::Verbose,
            _ => Verbosity::Normal,
        };

        let defaults = CacheTtls::default();
        let ttls = CacheTtls {
            metadata: toml_config
                .metadata_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.metadata),
            error: toml_config
                .error_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.error),
        };

        let repos: Vec<RepoDescriptor> = toml_config
            .repos
            .into_iter()
            .filter_map(TomlRepo::into_descriptor)
            .collect();

        // pins from the state file override the config file's table
        let mut branch_pins = toml_config.branch_pins;
        branch_pins.extend(pins);

        let mut inner = Config::new()
            .with_plugin_dirs(toml_config.plugin_dirs)
            .with_theme_dirs(toml_config.theme_dirs)
            .with_repos(repos)
            .with_tokens(toml_config.tokens)
            .with_verbosity(verbosity);
        inner.enterprise_bases = toml_config.enterprise;
        inner.branch_pins = branch_pins;
        inner.exclude = toml_config.exclude;
        inner.ttls = ttls;
        inner.cache_dir = toml_config.cache_dir;

        Ok(Self { inner })
    }

    fn load_toml_config() -> Result<TomlConfig> {
        let Some(path) = config_path() else {
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            return Ok(TomlConfig::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            Error::config(format!("failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::config(format!("failed to parse config file {}: {e}", path.display()))
        })
    }

    fn load_pins() -> Result<HashMap<String, String>> {
        let Some(path) = pins_path() else {
            return Ok(HashMap::new());
        };

        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            Error::config(format!("failed to read pins file {}: {e}", path.display()))
        })?;

        let pins: PinsFile = toml::from_str(&content).map_err(|e| {
            Error::config(format!("failed to parse pins file {}: {e}", path.display()))
        })?;

        Ok(pins.branch_pins)
    }

    /// persists a branch pin so later checks resolve against it. an
    /// empty branch removes the pin.
    pub fn save_pin(slug: &str, branch: &str) -> Result<()> {
        let Some(path) = pins_path() else {
            return Err(Error::config("could not determine config directory"));
        };

        let mut pins = Self::load_pins()?;
        if branch.is_empty() {
            pins.remove(slug);
        } else {
            pins.insert(slug.to_string(), branch.to_string());
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                Error::config(format!("failed to create config directory {}: {e}", dir.display()))
            })?;
        }

        let mut content = String::from("[branch_pins]\n");
        let mut sorted: Vec<_> = pins.iter().collect();
        sorted.sort();
        for (slug, branch) in sorted {
            content.push_str(&format!("{slug} = {branch:?}\n"));
        }

        fs::write(&path, content).map_err(|e| {
            Error::config(format!("failed to write pins file {}: {e}", path.display()))
        })
    }

    pub fn edit_config() -> Result<()> {
        let Some(path) = config_path() else {
            return Err(Error::config("could not determine config directory"));
        };

        if !path.exists() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|e| {
                    Error::config(format!(
                        "failed to create config directory {}: {e}",
                        dir.display()
                    ))
                })?;
            }

            let default_content = r#"# git-updater configuration
# plugin_dirs = ["/var/www/site/wp-content/plugins"]
# theme_dirs = ["/var/www/site/wp-content/themes"]
# exclude = ["some-plugin"]
# verbosity = "normal"  # quiet, normal, verbose
# metadata_ttl_secs = 3600
# error_ttl_secs = 3600
#
# [tokens]
# github = "ghp_yourtoken"          # host-wide
# my-private-plugin = "ghp_other"   # per-slug
#
# [enterprise]
# github = "https://ghe.example.com/api/v3"
#
# [[repos]]
# slug = "widget"
# type = "plugin"
# source = "https://github.com/acme/widget"
# branch = "main"
"#;
            fs::write(&path, default_content).map_err(|e| {
                Error::config(format!("failed to create config file {}: {e}", path.display()))
            })?;
        }

        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());
        std::process::Command::new(&editor)
            .arg(&path)
            .status()
            .map_err(|e| Error::config(format!("failed to open editor {editor}: {e}")))?;

        Ok(())
    }
}
