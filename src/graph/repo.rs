use super::Package;
use crate::{
    debug,
    provider::{DestinationProvider, SourceProvider},
    types::{config::RepoConfig, ArchitectError, PkgVersion},
};

use anyhow::{Context, Result};
use console::style;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Reconciles one repository's providers into packages, keyed by name
pub struct RepositoryView {
    name: String,
    src: Vec<SourceProvider>,
    dst: DestinationProvider,
    pkgs: BTreeMap<String, Package>,
}

impl RepositoryView {
    /// Set up providers and read what they have cached, without touching the network
    pub fn load(config: &RepoConfig, arch: &str, cache_dir: &Path) -> Result<Self> {
        let mut src = Vec::with_capacity(config.src.len());
        for s in &config.src {
            debug!("{}: using {}", config.name, s.describe());
            src.push(
                SourceProvider::new(&config.name, arch, s, cache_dir)
                    .with_context(|| format!("Failed to set up {}", s.describe()))?,
            );
        }
        let dst = DestinationProvider::new(&config.name, arch, &config.dst);
        let mut view = RepositoryView::from_providers(&config.name, src, dst);
        let pkgs = view.collect()?;
        view.install(pkgs);
        Ok(view)
    }

    pub fn from_providers(name: &str, src: Vec<SourceProvider>, dst: DestinationProvider) -> Self {
        RepositoryView {
            name: name.to_owned(),
            src,
            dst,
            pkgs: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pull upstream changes into the providers' caches, in configured order
    pub async fn sync(&mut self) -> Result<()> {
        for s in self.src.iter_mut() {
            s.sync().await?;
        }
        self.dst.sync().await?;
        Ok(())
    }

    /// Build a fresh package map from the providers' current state
    pub fn collect(&self) -> Result<BTreeMap<String, Package>> {
        let mut pkgs: BTreeMap<String, Package> = BTreeMap::new();
        for s in &self.src {
            for spkg in s.packages()? {
                pkgs.entry(spkg.name.clone())
                    .or_insert_with(|| Package::new(spkg.id()))
                    .add_source(spkg);
            }
        }
        let builds = self
            .dst
            .packages()
            .with_context(|| format!("Failed to read {}", self.dst.db_path().display()))?;
        for build in builds {
            pkgs.entry(build.name.clone())
                .or_insert_with(|| Package::new(build.id()))
                .set_build(build);
        }
        Ok(pkgs)
    }

    /// Replace the package map wholesale
    pub fn install(&mut self, pkgs: BTreeMap<String, Package>) {
        self.pkgs = pkgs;
    }

    /// Sync and rebuild. On failure the previous packages are kept.
    pub async fn refresh(&mut self) -> Result<()> {
        self.sync().await?;
        let pkgs = self.collect()?;
        self.install(pkgs);
        Ok(())
    }

    /// Publish a build into the destination.
    ///
    /// The package map is left alone, a refresh picks up the new build.
    pub fn add_build(&self, paths: &[PathBuf]) -> Result<()> {
        self.dst.add_build(paths)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.pkgs.values()
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.pkgs.get(name)
    }

    /// Source tarball of the effective source, which must be at `version`
    pub fn sourceball(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let pkg = self
            .pkgs
            .get(name)
            .ok_or_else(|| ArchitectError::UnknownPackage(name.to_owned()))?;
        let source = pkg.source().ok_or(ArchitectError::NotFound)?;
        let wanted = PkgVersion::parse(version)?;
        if source.version.as_ref() != Some(&wanted) {
            return Err(ArchitectError::NotFound.into());
        }

        // Later providers override earlier ones
        for s in self.src.iter().rev() {
            if let Some(ball) = s.sourceball(name)? {
                return Ok(ball);
            }
        }
        debug!("No provider has sources for {}", style(pkg.id()).bold());
        Err(ArchitectError::NotFound.into())
    }

    pub fn out_of_date(&self) -> Vec<&Package> {
        self.packages().filter(|p| p.out_of_date()).collect()
    }

    pub fn not_built(&self) -> Vec<&Package> {
        self.packages().filter(|p| !p.built()).collect()
    }

    pub fn removed(&self) -> Vec<&Package> {
        self.packages().filter(|p| p.removed()).collect()
    }

    pub fn up_to_date(&self) -> Vec<&Package> {
        self.packages().filter(|p| p.up_to_date()).collect()
    }

    pub fn build_required(&self) -> Vec<&Package> {
        self.packages()
            .filter(|p| !p.built() || p.out_of_date())
            .collect()
    }
}
