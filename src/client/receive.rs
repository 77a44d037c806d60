use crate::{debug, utils::verify::verify_detached};

use anyhow::{bail, Context, Result};
use std::{
    io::Read,
    path::{Component, Path, PathBuf},
};
use tar::Archive;

const PKG_SUFFIX: &str = ".pkg.tar.xz";
const SIG_SUFFIX: &str = ".pkg.tar.xz.sig";
const LOG_SUFFIX: &str = ".log";

/// Files of a finished build, unpacked and checked
#[derive(Debug, Default)]
pub struct Staged {
    pub packages: Vec<PathBuf>,
    pub logs: Vec<PathBuf>,
}

/// Unpack a build result tarball into `dir`.
///
/// Every package needs a detached signature made by one of the `keyring`
/// certificates. Anything that isn't a package, a signature or a log rejects
/// the whole batch.
pub fn stage<R: Read>(reader: R, dir: &Path, keyring: &[PathBuf]) -> Result<Staged> {
    let mut tar = Archive::new(reader);
    let mut names = Vec::new();
    for entry in tar.entries().context("Failed to read build tarball")? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        // `tar -C out -cf - .` prefixes everything with ./
        let mut components = path.components().filter(|c| *c != Component::CurDir);
        let name = match (components.next(), components.next()) {
            (None, _) if entry.header().entry_type().is_dir() => continue,
            (Some(Component::Normal(name)), None) => name.to_string_lossy().into_owned(),
            _ => bail!("Received non-file {}", path.display()),
        };
        if !entry.header().entry_type().is_file() {
            bail!("Received non-file {}", path.display());
        }
        entry.unpack(dir.join(&name))?;
        names.push(name);
    }
    names.sort();

    let mut staged = Staged::default();
    for name in names {
        let path = dir.join(&name);
        if name.ends_with(PKG_SUFFIX) {
            let mut sig = path.clone().into_os_string();
            sig.push(".sig");
            verify_detached(keyring, &path, Path::new(&sig))
                .with_context(|| format!("Signature verification failed for {}", name))?;
            debug!("Good signature on {}", name);
            staged.packages.push(path);
        } else if name.ends_with(SIG_SUFFIX) {
            continue;
        } else if name.ends_with(LOG_SUFFIX) {
            staged.logs.push(path);
        } else {
            bail!("Unhandled file '{}'", name);
        }
    }
    Ok(staged)
}
