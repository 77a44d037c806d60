use super::pacdb;
use crate::{
    debug, info,
    types::{ArchitectError, SourcePackage},
    utils::{
        archive::{append_bytes, gzip_tar, open_tar},
        keyvalue,
        pacparse::{self, get_first},
    },
};

use anyhow::{bail, format_err, Context, Result};
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, HashSet},
    fs, io,
    io::Read,
    path::{Path, PathBuf},
};

/// The repository we publish built packages into
pub struct DestinationProvider {
    repo: String,
    /// `<dst>/os/<arch>`
    root: PathBuf,
}

/// What `.PKGINFO` tells us about one artifact
struct PkgInfo {
    filename: String,
    fields: Vec<(String, String)>,
}

impl PkgInfo {
    fn get(&self, key: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn first(&self, key: &str) -> Option<String> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn name(&self) -> Result<String> {
        self.first("pkgname")
            .ok_or_else(|| format_err!("{} has no pkgname", self.filename))
    }

    fn version(&self) -> Result<String> {
        self.first("pkgver")
            .ok_or_else(|| format_err!("{} has no pkgver", self.filename))
    }
}

impl DestinationProvider {
    pub fn new(repo: &str, arch: &str, dst: &Path) -> Self {
        DestinationProvider {
            repo: repo.to_owned(),
            root: dst.join("os").join(arch),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(format!("{}.db.tar.gz", self.repo))
    }

    /// Everything is local, there is nothing to fetch
    pub async fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn packages(&self) -> Result<Vec<SourcePackage>> {
        pacdb::read_db(&self.repo, &self.db_path())
    }

    /// Publish built packages and index them in the repository database.
    ///
    /// Nothing is written unless every artifact can be read and none of them
    /// already exists in the repository.
    pub fn add_build(&self, paths: &[PathBuf]) -> Result<()> {
        let mut filenames = Vec::with_capacity(paths.len());
        for path in paths {
            let filename = path
                .file_name()
                .ok_or_else(|| format_err!("Bad artifact path {}", path.display()))?
                .to_string_lossy()
                .into_owned();
            if !path.is_file() {
                bail!("Artifact {} not found", path.display());
            }
            if self.root.join(&filename).exists() {
                return Err(ArchitectError::ArtifactExists(filename).into());
            }
            filenames.push(filename);
        }

        let mut infos = Vec::with_capacity(paths.len());
        for (path, filename) in paths.iter().zip(filenames) {
            infos.push(read_pkginfo(path, filename)?);
        }

        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        let mut entries = Vec::with_capacity(infos.len());
        for (path, info) in paths.iter().zip(&infos) {
            let target = self.root.join(&info.filename);
            debug!("Publishing {}", info.filename);
            fs::copy(path, &target)
                .with_context(|| format!("Failed to copy {}", path.display()))?;
            let sig = sig_path(path);
            if sig.is_file() {
                fs::copy(&sig, sig_path(&target))?;
            }
            entries.push(db_entry(info, &target)?);
        }

        self.rewrite_db(entries)?;
        info!(
            "Added {} package(s) to {}",
            infos.len(),
            self.db_path().display()
        );
        Ok(())
    }

    /// Replace entries of the same package names and write the db atomically
    fn rewrite_db(&self, new_entries: Vec<DbEntry>) -> Result<()> {
        let db = self.db_path();
        let replaced: HashSet<&str> = new_entries.iter().map(|e| e.name.as_str()).collect();

        // Entry directory => files
        let mut kept: BTreeMap<String, Vec<(String, Vec<u8>)>> = BTreeMap::new();
        if db.is_file() {
            let mut tar = open_tar(&db)?;
            let mut names: BTreeMap<String, String> = BTreeMap::new();
            for file in tar.entries()? {
                let mut file = file?;
                if !file.header().entry_type().is_file() {
                    continue;
                }
                let path = file.path()?.into_owned();
                let (dir, name) = match (path.parent(), path.file_name()) {
                    (Some(dir), Some(name)) => (
                        dir.to_string_lossy().into_owned(),
                        name.to_string_lossy().into_owned(),
                    ),
                    _ => continue,
                };
                let mut content = Vec::new();
                file.read_to_end(&mut content)?;
                if name == "desc" {
                    let fields = pacparse::parse_str(&String::from_utf8_lossy(&content))?;
                    names.insert(dir.clone(), get_first("NAME", &fields)?);
                }
                kept.entry(dir).or_default().push((name, content));
            }
            kept.retain(|dir, _| match names.get(dir) {
                Some(name) => !replaced.contains(name.as_str()),
                None => true,
            });
        }

        let data = gzip_tar(|builder| {
            for (dir, files) in &kept {
                for (name, content) in files {
                    append_bytes(builder, &format!("{}/{}", dir, name), content)?;
                }
            }
            for entry in &new_entries {
                append_bytes(builder, &format!("{}/desc", entry.dir), entry.desc.as_bytes())?;
            }
            Ok(())
        })?;

        let tmp = db.with_extension("tmp");
        fs::write(&tmp, data).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &db).with_context(|| format!("Failed to replace {}", db.display()))?;
        Ok(())
    }
}

fn sig_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".sig");
    PathBuf::from(s)
}

fn read_pkginfo(path: &Path, filename: String) -> Result<PkgInfo> {
    let mut tar = open_tar(path)?;
    for entry in tar.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_os_str() != ".PKGINFO" {
            continue;
        }
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        let fields = keyvalue::parse_str(&content)
            .with_context(|| format!("Bad .PKGINFO in {}", filename))?;
        let info = PkgInfo { filename, fields };
        // Fail early on incomplete metadata
        info.name()?;
        info.version()?;
        return Ok(info);
    }
    bail!("{} has no .PKGINFO", path.display())
}

struct DbEntry {
    name: String,
    dir: String,
    desc: String,
}

fn db_entry(info: &PkgInfo, published: &Path) -> Result<DbEntry> {
    let name = info.name()?;
    let version = info.version()?;

    let mut file = fs::File::open(published)?;
    let mut hasher = Sha256::new();
    let csize = io::copy(&mut file, &mut hasher)?;
    let sha256 = hex::encode(hasher.finalize());

    let base = info.first("pkgbase").unwrap_or_else(|| name.clone());
    let desc = pacparse::write_str(&[
        ("FILENAME", vec![info.filename.clone()]),
        ("NAME", vec![name.clone()]),
        ("BASE", vec![base]),
        ("VERSION", vec![version.clone()]),
        ("DESC", info.get("pkgdesc")),
        ("GROUPS", info.get("group")),
        ("CSIZE", vec![csize.to_string()]),
        ("ISIZE", info.get("size")),
        ("SHA256SUM", vec![sha256]),
        ("ARCH", info.get("arch")),
        ("DEPENDS", info.get("depend")),
        ("OPTDEPENDS", info.get("optdepend")),
        ("MAKEDEPENDS", info.get("makedepend")),
        ("CHECKDEPENDS", info.get("checkdepend")),
    ]);

    Ok(DbEntry {
        dir: format!("{}-{}", name, version),
        name,
        desc,
    })
}
