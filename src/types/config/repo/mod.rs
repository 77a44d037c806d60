use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RepoConfig {
    pub name: String,
    /// Upstream providers, most authoritative first
    pub src: Vec<SourceConfig>,
    /// Root of the published binary repository
    pub dst: PathBuf,
}

/// Where a repository's sources come from
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SourceConfig {
    /// A mirrored binary repository, like `https://mirror/core/os/x86_64`
    Binary(String),
    /// A git repository with one directory per source package
    SourceGit(String),
    /// Same layout as `source-git`, but already on the local disk
    SourceDir(PathBuf),
}

impl SourceConfig {
    pub fn describe(&self) -> String {
        match self {
            SourceConfig::Binary(url) => format!("binary mirror {}", url),
            SourceConfig::SourceGit(url) => format!("git source tree {}", url),
            SourceConfig::SourceDir(path) => format!("source tree {}", path.display()),
        }
    }
}

/// Mirror URLs are joined with file names, so drop the trailing slash
pub fn normalize_mirror_url(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}
