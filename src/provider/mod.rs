mod destination;
mod mirror;
mod pacdb;
mod source_tree;

pub use destination::DestinationProvider;
pub use mirror::MirrorProvider;
pub use source_tree::SourceTreeProvider;

use crate::types::{config::SourceConfig, SourcePackage};

use anyhow::Result;
use std::path::Path;

/// Upstream providers a repository reads its sources from
pub enum SourceProvider {
    Mirror(MirrorProvider),
    SourceTree(SourceTreeProvider),
}

impl SourceProvider {
    pub fn new(repo: &str, arch: &str, config: &SourceConfig, cache_dir: &Path) -> Result<Self> {
        let provider = match config {
            SourceConfig::Binary(url) => {
                SourceProvider::Mirror(MirrorProvider::new(repo, url, cache_dir)?)
            }
            SourceConfig::SourceGit(url) => {
                SourceProvider::SourceTree(SourceTreeProvider::git(repo, arch, url, cache_dir))
            }
            SourceConfig::SourceDir(path) => {
                SourceProvider::SourceTree(SourceTreeProvider::local(repo, arch, path))
            }
        };
        Ok(provider)
    }

    /// Bring the local cache up to date with upstream
    pub async fn sync(&mut self) -> Result<()> {
        match self {
            SourceProvider::Mirror(p) => p.sync().await,
            SourceProvider::SourceTree(p) => p.sync().await,
        }
    }

    /// Read the cached state, no network access
    pub fn packages(&self) -> Result<Vec<SourcePackage>> {
        match self {
            SourceProvider::Mirror(p) => p.packages(),
            SourceProvider::SourceTree(p) => p.packages(),
        }
    }

    /// Gzipped tarball of a source package's build files, if we have them
    pub fn sourceball(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self {
            SourceProvider::Mirror(p) => p.sourceball(name),
            SourceProvider::SourceTree(p) => p.sourceball(name),
        }
    }
}
