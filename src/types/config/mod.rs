mod repo;
pub use repo::{normalize_mirror_url, RepoConfig, SourceConfig};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

/// Daemon and client configuration, loaded once and never mutated
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub architectures: Vec<String>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_rpc_addr")]
    pub rpc_addr: String,
    /// Where received build logs are kept
    pub build_logs: PathBuf,
    /// SQLite database with the build history, defaults to `<cache-dir>/builds.sqlite`
    pub build_db: Option<PathBuf>,
    /// OpenPGP certificates trusted to sign received packages
    #[serde(default)]
    pub keyring: Vec<PathBuf>,
    #[serde(default)]
    pub repos: Vec<RepoConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&data).context("Failed to parse config file")?;
        config.expand_paths();
        config.check_sanity()?;
        Ok(config)
    }

    pub fn check_sanity(&self) -> Result<()> {
        if self.architectures.is_empty() {
            bail!("No architecture configured");
        }

        let mut names = HashSet::new();
        for repo in &self.repos {
            if !names.insert(repo.name.as_str()) {
                bail!("Repository {} is configured more than once", repo.name);
            }
            if repo.src.is_empty() {
                bail!("Repository {} has no source provider", repo.name);
            }
        }
        Ok(())
    }

    pub fn build_db(&self) -> PathBuf {
        self.build_db
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("builds.sqlite"))
    }

    fn expand_paths(&mut self) {
        self.cache_dir = expand_home(&self.cache_dir);
        self.build_logs = expand_home(&self.build_logs);
        self.build_db = self.build_db.as_deref().map(expand_home);
        self.keyring = self.keyring.iter().map(|p| expand_home(p)).collect();
        for repo in self.repos.iter_mut() {
            repo.dst = expand_home(&repo.dst);
            for src in repo.src.iter_mut() {
                if let SourceConfig::SourceDir(path) = src {
                    *path = expand_home(path);
                }
            }
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_owned(),
    }
}

#[inline]
fn default_cache_dir() -> PathBuf {
    PathBuf::from("~/.cache/architect")
}

#[inline]
fn default_rpc_addr() -> String {
    "127.0.0.1:7773".to_string()
}

#[derive(Parser)]
#[clap(about = "Package build tracker for distribution ports", version, author)]
pub struct Opts {
    #[clap(
        long,
        default_value = "architect.toml",
        help = "Use the specified config file"
    )]
    pub config: PathBuf,
    #[clap(long, help = "Architecture to talk about, defaults to the first configured one")]
    pub arch: Option<String>,
    #[clap(short, long, help = "Print additional debug information")]
    pub verbose: bool,
    #[clap(subcommand)]
    pub subcmd: SubCmd,
}

#[derive(Subcommand)]
pub enum SubCmd {
    /// Determine packages ready for building
    Ready(JsonOutput),
    /// Receive a completed build, as a tar stream on stdin
    Receive(ReceiveBuild),
    /// Retrieve package source
    Source(GetSource),
    /// Refresh packages from all providers
    Refresh,
    /// Dump package information
    Dump(DumpPkg),
    /// Output statistics
    #[clap(subcommand)]
    Stats(StatsCmd),
    /// Control the architect daemon
    #[clap(subcommand)]
    Daemon(DaemonCmd),
}

#[derive(Args)]
pub struct JsonOutput {
    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ReceiveBuild {
    /// Destination repository
    pub repository: String,
    /// Source package name
    pub source: String,
    /// Package version
    pub version: String,
}

#[derive(Args)]
pub struct GetSource {
    /// Package ID, like core/glibc
    pub package: String,
    /// Package version
    pub version: String,
}

#[derive(Args)]
pub struct DumpPkg {
    /// Output as JSON
    #[clap(long)]
    pub json: bool,
    /// The pattern to match package IDs against
    pub pattern: String,
}

#[derive(Subcommand)]
pub enum StatsCmd {
    /// Recently built packages
    RecentBuilds(RecentBuilds),
}

#[derive(Args)]
pub struct RecentBuilds {
    /// The number of builds to list
    #[clap(long, default_value = "10")]
    pub count: u32,
    /// Include every build instead of the latest one per package
    #[clap(long)]
    pub all: bool,
    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum DaemonCmd {
    /// Start the daemon in the foreground
    Start,
    /// Stop a running daemon
    Stop,
}
