use super::pacdb::parse_deps;
use crate::{
    debug, info,
    types::{BinaryPackage, PkgVersion, SourcePackage},
    utils::{archive::gzip_tar, keyvalue, slugify},
    warn,
};

use anyhow::{bail, format_err, Context, Result};
use console::style;
use rayon::prelude::*;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tokio::process::Command;

/// Marks a package directory as "do not build"
const EXCLUDE_MARKER: &str = "EXCLUDE";
const SRCINFO: &str = ".SRCINFO";

enum Origin {
    Git(String),
    Local,
}

/// A tree of PKGBUILD directories, one directory per source package
pub struct SourceTreeProvider {
    origin: Origin,
    root: PathBuf,
    repo: String,
    arch: String,
}

impl SourceTreeProvider {
    pub fn git(repo: &str, arch: &str, url: &str, cache_dir: &Path) -> Self {
        SourceTreeProvider {
            origin: Origin::Git(url.to_owned()),
            root: cache_dir.join(slugify(url)).join("repo"),
            repo: repo.to_owned(),
            arch: arch.to_owned(),
        }
    }

    pub fn local(repo: &str, arch: &str, path: &Path) -> Self {
        SourceTreeProvider {
            origin: Origin::Local,
            root: path.to_owned(),
            repo: repo.to_owned(),
            arch: arch.to_owned(),
        }
    }

    pub async fn sync(&mut self) -> Result<()> {
        let url = match &self.origin {
            Origin::Git(url) => url,
            Origin::Local => return Ok(()),
        };

        let mut cmd = Command::new("git");
        if self.root.join(".git").is_dir() {
            debug!("Pulling {}", url);
            cmd.arg("pull").current_dir(&self.root);
        } else {
            let parent = self
                .root
                .parent()
                .ok_or_else(|| format_err!("Bad clone target {}", self.root.display()))?;
            fs::create_dir_all(parent)?;
            info!("Cloning {}", url);
            cmd.arg("clone").arg(url).arg(&self.root);
        }

        let output = cmd.output().await.context("Failed to execute git")?;
        if !output.status.success() {
            bail!(
                "git exited with {} for {}: {}",
                output.status,
                style(url).bold(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    pub fn packages(&self) -> Result<Vec<SourcePackage>> {
        if !self.root.is_dir() {
            if let Origin::Git(_) = self.origin {
                // Not cloned yet
                return Ok(Vec::new());
            }
            bail!("Source tree {} does not exist", self.root.display());
        }

        let res: Result<Vec<Option<SourcePackage>>> = self
            .package_dirs()?
            .par_iter()
            .map(|(name, path)| -> Result<Option<SourcePackage>> {
                let spkg = self.read_dir(name, path)?;
                if spkg.is_none() {
                    warn!("No {} in {}, skipping", SRCINFO, path.display());
                }
                Ok(spkg)
            })
            .collect();
        Ok(res?.into_iter().flatten().collect())
    }

    /// Top level directories, dot-entries skipped, in name order
    fn package_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            dirs.push((name, entry.path()));
        }
        dirs.sort();
        Ok(dirs)
    }

    /// `None` if the directory has no `.SRCINFO`
    fn read_dir(&self, name: &str, path: &Path) -> Result<Option<SourcePackage>> {
        if path.join(EXCLUDE_MARKER).exists() {
            return Ok(Some(SourcePackage::excluded(&self.repo, name)));
        }

        let srcinfo = path.join(SRCINFO);
        if !srcinfo.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&srcinfo)?;
        let spkg = parse_srcinfo(&self.repo, &self.arch, &content)
            .with_context(|| format!("Failed to parse {}", srcinfo.display()))?;
        Ok(Some(spkg))
    }

    /// Directory holding the source package `name`, which need not be named after it
    fn find_dir(&self, name: &str) -> Result<Option<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(None);
        }
        for (dir, path) in self.package_dirs()? {
            // Broken siblings don't matter here, refresh reports them
            if let Ok(Some(spkg)) = self.read_dir(&dir, &path) {
                if spkg.name == name {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    pub fn sourceball(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = match self.find_dir(name)? {
            Some(path) => path,
            None => return Ok(None),
        };
        let data = gzip_tar(|builder| {
            builder.append_dir_all(name, &path)?;
            Ok(())
        })?;
        Ok(Some(data))
    }
}

/// Fields of one `.SRCINFO` section, arch-specific keys kept as written
type Section = HashMap<String, Vec<String>>;

/// Values of `key` plus `key_<arch>`
fn section_values(section: &Section, key: &str, arch: &str) -> Option<Vec<String>> {
    let plain = section.get(key);
    let arch_specific = section.get(&format!("{}_{}", key, arch));
    if plain.is_none() && arch_specific.is_none() {
        return None;
    }
    Some(
        plain
            .into_iter()
            .chain(arch_specific)
            .flatten()
            .cloned()
            .collect(),
    )
}

fn section_first(section: &Section, key: &str) -> Option<String> {
    section.get(key).and_then(|v| v.first()).cloned()
}

pub fn parse_srcinfo(repo: &str, arch: &str, content: &str) -> Result<SourcePackage> {
    let mut base: Section = HashMap::new();
    // (pkgname, overrides)
    let mut binaries: Vec<(String, Section)> = Vec::new();
    for (key, value) in keyvalue::parse_str(content)? {
        if key == "pkgname" {
            binaries.push((value.clone(), HashMap::new()));
        }
        let section = match binaries.last_mut() {
            Some((_, section)) => section,
            None => &mut base,
        };
        if !value.is_empty() {
            section.entry(key).or_default().push(value);
        }
    }

    // Without pkgbase, the first package section carries the common fields
    if !base.contains_key("pkgbase") {
        if let Some((_, first)) = binaries.first() {
            for (key, values) in first {
                base.entry(key.clone()).or_insert_with(|| values.clone());
            }
        }
    }

    let name = section_first(&base, "pkgbase")
        .or_else(|| binaries.first().map(|(name, _)| name.clone()))
        .ok_or_else(|| format_err!("Neither pkgbase nor pkgname found"))?;
    let pkgver = section_first(&base, "pkgver").ok_or_else(|| format_err!("Missing pkgver"))?;
    let pkgrel = section_first(&base, "pkgrel").ok_or_else(|| format_err!("Missing pkgrel"))?;
    let version = match section_first(&base, "epoch") {
        Some(epoch) => PkgVersion::parse(&format!("{}:{}-{}", epoch, pkgver, pkgrel))?,
        None => PkgVersion::parse(&format!("{}-{}", pkgver, pkgrel))?,
    };

    let mut spkg = SourcePackage::new(repo, &name, version);
    if let Some(deps) = section_values(&base, "makedepends", arch) {
        spkg.makedepends = parse_deps(deps.as_slice())?;
    }
    if let Some(deps) = section_values(&base, "checkdepends", arch) {
        spkg.checkdepends = parse_deps(deps.as_slice())?;
    }

    for (pkgname, overrides) in &binaries {
        // Package sections replace, not extend, what pkgbase declares
        let field = |key: &str| {
            section_values(overrides, key, arch)
                .or_else(|| section_values(&base, key, arch))
                .unwrap_or_default()
        };
        let mut bpkg = BinaryPackage::new(&spkg, pkgname);
        bpkg.description = field("pkgdesc").into_iter().next().unwrap_or_default();
        bpkg.depends = parse_deps(field("depends").as_slice())?;
        bpkg.optdepends = parse_deps(field("optdepends").as_slice())?;
        bpkg.groups = field("groups").into_iter().collect();
        spkg.add_binary(bpkg);
    }

    Ok(spkg)
}
