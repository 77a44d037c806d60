mod package;
mod repo;

pub use package::{Package, PkgStatus};
pub use repo::RepositoryView;

use crate::{info, types::config::Config};

use anyhow::{Context, Result};
use console::style;
use std::collections::BTreeMap;

/// Every repository of one architecture
pub struct PackageGraph {
    arch: String,
    repos: Vec<RepositoryView>,
}

impl PackageGraph {
    pub fn load(arch: &str, config: &Config) -> Result<Self> {
        let mut repos = Vec::with_capacity(config.repos.len());
        for repo in &config.repos {
            repos.push(
                RepositoryView::load(repo, arch, &config.cache_dir).with_context(|| {
                    format!("Failed to load repository {} for {}", repo.name, arch)
                })?,
            );
        }
        Ok(PackageGraph::from_repos(arch, repos))
    }

    pub fn from_repos(arch: &str, repos: Vec<RepositoryView>) -> Self {
        PackageGraph {
            arch: arch.to_owned(),
            repos,
        }
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Sync and rebuild every repository. Nothing changes unless all of them succeed.
    pub async fn refresh(&mut self) -> Result<()> {
        for repo in self.repos.iter_mut() {
            info!("Synchronizing {}/{}", self.arch, style(repo.name()).bold());
            repo.sync()
                .await
                .with_context(|| format!("Failed to synchronize {}", repo.name()))?;
        }

        let mut collected = Vec::with_capacity(self.repos.len());
        for repo in &self.repos {
            collected.push(
                repo.collect()
                    .with_context(|| format!("Failed to read {}", repo.name()))?,
            );
        }
        for (repo, pkgs) in self.repos.iter_mut().zip(collected) {
            repo.install(pkgs);
            info!(
                "{}/{}: {} to build ({} never built), {} out of date, {} removed, {} up to date",
                self.arch,
                repo.name(),
                repo.build_required().len(),
                repo.not_built().len(),
                repo.out_of_date().len(),
                repo.removed().len(),
                repo.up_to_date().len()
            );
        }
        Ok(())
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryView> {
        self.repos.iter().find(|r| r.name() == name)
    }

    /// Every package of every repository, in repository order
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.repos.iter().flat_map(|r| r.packages())
    }

    /// Look up `<repo>/<name>`
    pub fn package(&self, id: &str) -> Option<&Package> {
        let (repo, name) = id.split_once('/')?;
        self.repository(repo)?.package(name)
    }

    pub fn ready_for_build(&self) -> Vec<&Package> {
        self.packages().filter(|p| p.ready_for_build()).collect()
    }

    /// Number of packages per repository, for start up messages
    pub fn summary(&self) -> BTreeMap<&str, usize> {
        self.repos
            .iter()
            .map(|r| (r.name(), r.packages().count()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        provider::{DestinationProvider, SourceProvider, SourceTreeProvider},
        testutil::{exclude_srcdir, make_pkg, make_srcdir},
    };
    use std::path::Path;

    fn repo(name: &str, src: &Path, dst: &Path) -> RepositoryView {
        RepositoryView::from_providers(
            name,
            vec![SourceProvider::SourceTree(SourceTreeProvider::local(
                name, "x86_64", src,
            ))],
            DestinationProvider::new(name, "x86_64", dst),
        )
    }

    #[tokio::test]
    async fn ready_packages() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        make_srcdir(src.path(), "fresh", "1.0", "1");
        make_srcdir(src.path(), "done", "1.0", "1");
        exclude_srcdir(src.path(), "skipped");
        DestinationProvider::new("core", "x86_64", dst.path())
            .add_build(&[make_pkg(staging.path(), "done", "done", "1.0-1")])
            .unwrap();

        let mut graph =
            PackageGraph::from_repos("x86_64", vec![repo("core", src.path(), dst.path())]);
        graph.refresh().await.unwrap();

        let ready: Vec<&str> = graph.ready_for_build().iter().map(|p| p.id()).collect();
        assert_eq!(ready, vec!["core/fresh"]);
        assert_eq!(graph.packages().count(), 3);
        assert_eq!(
            graph.package("core/done").unwrap().status(),
            PkgStatus::UpToDate
        );
        assert!(graph.package("core/nope").is_none());
        assert!(graph.package("extra/done").is_none());
        assert!(graph.package("done").is_none());
        assert_eq!(graph.summary()["core"], 3);
    }

    #[tokio::test]
    async fn refresh_is_all_or_nothing() {
        let core_src = tempfile::tempdir().unwrap();
        let extra_src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        make_srcdir(core_src.path(), "foo", "1.0", "1");
        make_srcdir(extra_src.path(), "bar", "1.0", "1");

        let mut graph = PackageGraph::from_repos(
            "x86_64",
            vec![
                repo("core", core_src.path(), dst.path()),
                repo("extra", extra_src.path(), dst.path()),
            ],
        );
        graph.refresh().await.unwrap();
        assert_eq!(graph.packages().count(), 2);

        // core would pick up a new package, but extra fails to read
        make_srcdir(core_src.path(), "baz", "1.0", "1");
        std::fs::write(extra_src.path().join("bar").join(".SRCINFO"), "pkgbase\n").unwrap();
        assert!(graph.refresh().await.is_err());
        assert!(graph.package("core/baz").is_none());
        assert!(graph.package("extra/bar").is_some());
    }
}
