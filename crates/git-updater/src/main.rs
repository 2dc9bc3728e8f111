// SPDX-License-Identifier: MIT OR Apache-2.0

mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use libgit_updater::{
    CheckResult, GitHost, JsonOutput, RepoDescriptor, RepoType, UpdateRecord, Verbosity,
    build_client, check_all, clear_cache, clear_repo_cache, create_download_client,
    download_package, remote_branches, repo_info, tracked_repos,
};

use crate::config::CliConfig;

mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const PARTIAL_FAILURE: i32 = 1;
    pub const FATAL_ERROR: i32 = 2;
}

mod ansi {
    pub const BOLD: &str = "\x1b[1m";
    pub const RESET: &str = "\x1b[0m";

    pub fn bold(s: &str) -> String {
        if atty::is(atty::Stream::Stdout) {
            format!("{BOLD}{s}{RESET}")
        } else {
            s.to_string()
        }
    }
}

#[derive(Parser)]
#[command(name = "git-updater")]
#[command(about = "check and fetch plugin/theme updates from git hosting providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// output results as json
    #[arg(long, global = true)]
    json: bool,

    /// open configuration file in editor
    #[arg(long)]
    edit_config: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// check all tracked repos for available updates
    Check,
    /// list all tracked repos
    List,
    /// show detailed info for one tracked repo
    Info {
        /// repo slug
        slug: String,
    },
    /// resolve a repo from a uri and download its package archive
    Install {
        /// repository url or owner/repo
        uri: String,

        /// git host (github, bitbucket, bitbucket_server, gitlab, gitea, gist, zipfile)
        #[arg(long)]
        host: Option<GitHost>,

        /// package type
        #[arg(long, value_name = "TYPE", default_value = "plugin")]
        r#type: RepoType,

        /// branch to install from
        #[arg(long)]
        branch: Option<String>,

        /// access token for private repos
        #[arg(long)]
        token: Option<String>,

        /// directory to download into
        #[arg(long, default_value = ".")]
        target_dir: PathBuf,
    },
    /// pin a tracked repo to a branch for future checks
    Switch {
        /// repo slug
        slug: String,
        /// branch to pin; pass an empty string to unpin
        branch: String,
    },
    /// manage the metadata cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// clear cached metadata, for all repos or one slug
    Clear {
        /// only clear this repo's entries
        slug: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if cli.edit_config {
        if let Err(e) = CliConfig::edit_config() {
            output_error(&cli, &e.to_string());
            std::process::exit(exit_codes::FATAL_ERROR);
        }
        return;
    }

    let config = match CliConfig::load() {
        Ok(c) => c,
        Err(e) => {
            output_error(&cli, &format!("failed to load config: {e}"));
            std::process::exit(exit_codes::FATAL_ERROR);
        }
    };

    let verbosity = if cli.verbose {
        Verbosity::Verbose
    } else {
        config.verbosity
    };

    let result = match cli.command.as_ref().unwrap_or(&Commands::Check) {
        Commands::Check => cmd_check(&cli, &config, verbosity),
        Commands::List => cmd_list(&cli, &config, verbosity),
        Commands::Info { slug } => cmd_info(&cli, &config, slug),
        Commands::Install {
            uri,
            host,
            r#type,
            branch,
            token,
            target_dir,
        } => cmd_install(
            &cli,
            &config,
            uri,
            *host,
            *r#type,
            branch.as_deref(),
            token.as_deref(),
            target_dir,
            verbosity,
        ),
        Commands::Switch { slug, branch } => cmd_switch(&cli, &config, slug, branch, verbosity),
        Commands::Cache { action } => cmd_cache(&cli, &config, action, verbosity),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output_error(&cli, &e.to_string());
            std::process::exit(exit_codes::FATAL_ERROR);
        }
    }
}

fn output_error(cli: &Cli, msg: &str) {
    if cli.json {
        let output: JsonOutput<()> = JsonOutput::err(msg);
        println!("{}", serde_json::to_string(&output).unwrap());
    } else {
        eprintln!("{} {msg}", ansi::bold("error:"));
    }
}

fn cmd_check(
    cli: &Cli,
    config: &CliConfig,
    verbosity: Verbosity,
) -> Result<i32, libgit_updater::Error> {
    let repos = tracked_repos(&config.inner)?;

    if repos.is_empty() {
        if cli.json {
            let output = JsonOutput::ok(CheckResult::new());
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if verbosity != Verbosity::Quiet {
            println!("{} no tracked repos", ansi::bold("info:"));
        }
        return Ok(exit_codes::SUCCESS);
    }

    let client = build_client(&config.inner);
    let result = check_all(&client, &repos);

    if cli.json {
        let output = JsonOutput::ok(&result);
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(exit_code_for(&result));
    }

    if verbosity == Verbosity::Verbose && result.has_issues() {
        print_check_issues(&result);
    }

    if result.updates.is_empty() {
        if verbosity != Verbosity::Quiet {
            println!("{} no updates available", ansi::bold("info:"));
        }
        return Ok(exit_code_for(&result));
    }

    if verbosity == Verbosity::Quiet {
        println!("{}", result.updates.len());
    } else {
        println!(
            "{} {} update(s) available:",
            ansi::bold("info:"),
            result.updates.len()
        );
        println!();
        print_updates_table(&result.updates, &repos, verbosity);
    }

    Ok(exit_code_for(&result))
}

fn exit_code_for(result: &CheckResult) -> i32 {
    if result.check_failures.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PARTIAL_FAILURE
    }
}

fn cmd_list(
    cli: &Cli,
    config: &CliConfig,
    verbosity: Verbosity,
) -> Result<i32, libgit_updater::Error> {
    let repos = tracked_repos(&config.inner)?;

    if cli.json {
        let output = JsonOutput::ok(&repos);
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(exit_codes::SUCCESS);
    }

    if repos.is_empty() {
        if verbosity != Verbosity::Quiet {
            println!("{} no tracked repos", ansi::bold("info:"));
        }
        return Ok(exit_codes::SUCCESS);
    }

    if verbosity == Verbosity::Quiet {
        println!("{}", repos.len());
    } else {
        println!("{} {} tracked repo(s):", ansi::bold("info:"), repos.len());
        println!();
        print_repos_table(&repos, verbosity);
    }

    Ok(exit_codes::SUCCESS)
}

fn cmd_info(cli: &Cli, config: &CliConfig, slug: &str) -> Result<i32, libgit_updater::Error> {
    let info = repo_info(&config.inner, slug)?;

    if cli.json {
        let output = JsonOutput::ok(&info);
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(exit_codes::SUCCESS);
    }

    println!("{} {}", ansi::bold("name:"), info.name);
    println!("{} {}", ansi::bold("slug:"), info.slug);
    println!("{} {}", ansi::bold("version:"), info.version);
    if !info.author.is_empty() {
        println!("{} {}", ansi::bold("author:"), info.author);
    }
    println!("{} {}", ansi::bold("homepage:"), info.homepage);
    if let Some(requires) = &info.requires {
        println!("{} {requires}", ansi::bold("requires:"));
    }
    if let Some(tested) = &info.tested {
        println!("{} {tested}", ansi::bold("tested:"));
    }
    if !info.last_updated.is_empty() {
        println!("{} {}", ansi::bold("last updated:"), info.last_updated);
    }
    println!("{} {}", ansi::bold("download:"), info.download_link);

    for (section, content) in &info.sections {
        println!();
        println!("{}", ansi::bold(&format!("{section}:")));
        println!("{content}");
    }

    Ok(exit_codes::SUCCESS)
}

#[allow(clippy::too_many_arguments)]
fn cmd_install(
    cli: &Cli,
    config: &CliConfig,
    uri: &str,
    host: Option<GitHost>,
    repo_type: RepoType,
    branch: Option<&str>,
    token: Option<&str>,
    target_dir: &PathBuf,
    verbosity: Verbosity,
) -> Result<i32, libgit_updater::Error> {
    let mut descriptor = RepoDescriptor::from_uri(uri, host, repo_type, branch, token)?;
    if descriptor.token.is_none() {
        descriptor.token = config.inner.token_for(&descriptor).map(str::to_string);
    }

    let package_url = if descriptor.host == GitHost::Zipfile {
        descriptor.uri.clone().unwrap_or_default()
    } else {
        let client = build_client(&config.inner);
        match libgit_updater::checker::resolve_repo(&client, &descriptor) {
            Ok((resolution, _)) => resolution.download_link,
            Err(_) => {
                return Err(libgit_updater::Error::download(format!(
                    "could not resolve a package for {uri}"
                )));
            }
        }
    };

    if package_url.is_empty() {
        return Err(libgit_updater::Error::download(format!(
            "no package url for {uri}"
        )));
    }

    if !cli.json && verbosity != Verbosity::Quiet {
        println!("{} {}", ansi::bold("package:"), package_url);
    }

    let download_client = create_download_client();
    let path = download_package(&download_client, &descriptor, &package_url, target_dir, None)?;

    if cli.json {
        #[derive(serde::Serialize)]
        struct InstallOutput {
            slug: String,
            package: String,
            path: PathBuf,
        }
        let output = JsonOutput::ok(InstallOutput {
            slug: descriptor.slug.clone(),
            package: package_url,
            path,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if verbosity != Verbosity::Quiet {
        println!("{} {}", ansi::bold("downloaded:"), path.display());
    }

    Ok(exit_codes::SUCCESS)
}

fn cmd_switch(
    cli: &Cli,
    config: &CliConfig,
    slug: &str,
    branch: &str,
    verbosity: Verbosity,
) -> Result<i32, libgit_updater::Error> {
    let repos = tracked_repos(&config.inner)?;
    if !repos.iter().any(|d| d.slug == slug) {
        return Err(libgit_updater::Error::repo_not_found(slug));
    }

    if !branch.is_empty() {
        let branches = remote_branches(&config.inner, slug)?;
        if !branches.is_empty() && !branches.iter().any(|b| b.name == branch) {
            return Err(libgit_updater::Error::config(format!(
                "branch '{branch}' not found on the remote"
            )));
        }
    }

    CliConfig::save_pin(slug, branch)?;
    // stale metadata would keep resolving against the old branch
    clear_repo_cache(&config.inner, slug);

    if cli.json {
        #[derive(serde::Serialize)]
        struct SwitchOutput<'a> {
            slug: &'a str,
            branch: &'a str,
        }
        let output = JsonOutput::ok(SwitchOutput { slug, branch });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if verbosity != Verbosity::Quiet {
        if branch.is_empty() {
            println!("{} {slug} unpinned", ansi::bold("switch:"));
        } else {
            println!("{} {slug} pinned to {branch}", ansi::bold("switch:"));
        }
    }

    Ok(exit_codes::SUCCESS)
}

fn cmd_cache(
    cli: &Cli,
    config: &CliConfig,
    action: &CacheAction,
    verbosity: Verbosity,
) -> Result<i32, libgit_updater::Error> {
    match action {
        CacheAction::Clear { slug } => {
            match slug {
                Some(slug) => clear_repo_cache(&config.inner, slug),
                None => clear_cache(&config.inner),
            }

            if cli.json {
                let output: JsonOutput<()> = JsonOutput::ok(());
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if verbosity != Verbosity::Quiet {
                match slug {
                    Some(slug) => println!("{} cleared cache for {slug}", ansi::bold("cache:")),
                    None => println!("{} cleared all cached metadata", ansi::bold("cache:")),
                }
            }
        }
    }

    Ok(exit_codes::SUCCESS)
}

fn name_width<T>(items: &[T], name: impl Fn(&T) -> &str) -> usize {
    items
        .iter()
        .map(|i| name(i).len())
        .max()
        .unwrap_or(10)
        .max(10)
}

fn print_updates_table(updates: &[UpdateRecord], repos: &[RepoDescriptor], verbosity: Verbosity) {
    let width = name_width(updates, |u| &u.slug);

    let current_of = |slug: &str| {
        repos
            .iter()
            .find(|d| d.slug == slug)
            .map(|d| d.local_version.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or("-")
            .to_string()
    };

    if verbosity == Verbosity::Verbose {
        println!(
            "{:<width$}  {:>10}  {:>10}  PACKAGE",
            "SLUG", "CURRENT", "AVAILABLE"
        );
        println!("{}", "-".repeat(width + 40));

        for u in updates {
            println!(
                "{:<width$}  {:>10}  {:>10}  {}",
                u.slug,
                current_of(&u.slug),
                u.new_version,
                u.package
            );
        }
    } else {
        println!("{:<width$}  {:>10}  {:>10}", "SLUG", "CURRENT", "AVAILABLE");
        println!("{}", "-".repeat(width + 24));

        for u in updates {
            println!(
                "{:<width$}  {:>10}  {:>10}",
                u.slug,
                current_of(&u.slug),
                u.new_version
            );
        }
    }
}

fn print_repos_table(repos: &[RepoDescriptor], verbosity: Verbosity) {
    let width = name_width(repos, |d| &d.slug);

    if verbosity == Verbosity::Verbose {
        println!(
            "{:<width$}  {:>7}  {:>16}  {:>10}  SOURCE",
            "SLUG", "TYPE", "HOST", "VERSION"
        );
        println!("{}", "-".repeat(width + 60));

        for d in repos {
            let source = if d.host == GitHost::Zipfile {
                d.uri.clone().unwrap_or_default()
            } else {
                format!("{}/{}", d.owner, d.repo)
            };
            let version = if d.local_version.is_empty() {
                "-"
            } else {
                &d.local_version
            };
            println!(
                "{:<width$}  {:>7}  {:>16}  {:>10}  {source}",
                d.slug,
                d.repo_type.to_string(),
                d.host.to_string(),
                version
            );
        }
    } else {
        println!("{:<width$}  {:>7}  {:>16}", "SLUG", "TYPE", "HOST");
        println!("{}", "-".repeat(width + 30));

        for d in repos {
            println!(
                "{:<width$}  {:>7}  {:>16}",
                d.slug,
                d.repo_type.to_string(),
                d.host.to_string()
            );
        }
    }
}

fn print_check_issues(result: &CheckResult) {
    if !result.skipped.is_empty() {
        println!(
            "{} {} repo(s) skipped:",
            ansi::bold("info:"),
            result.skipped.len()
        );
        for diag in &result.skipped {
            println!("  - {}: {}", diag.slug, diag.reason);
        }
        println!();
    }

    if !result.check_failures.is_empty() {
        println!(
            "{} {} repo(s) failed during check:",
            ansi::bold("warn:"),
            result.check_failures.len()
        );
        for diag in &result.check_failures {
            match diag.retry_after_secs {
                Some(secs) => println!(
                    "  - {}: {} (retry in {}m)",
                    diag.slug,
                    diag.reason,
                    secs.div_ceil(60)
                ),
                None => println!("  - {}: {}", diag.slug, diag.reason),
            }
        }
        println!();
    }
}
