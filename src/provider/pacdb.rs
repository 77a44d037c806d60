/// The pacman db reader
use crate::{
    types::{BinaryPackage, DependencySpec, PkgVersion, SourcePackage},
    utils::{
        archive::open_tar,
        pacparse::{self, get_first, get_list},
    },
    warn,
};
use anyhow::{Context, Result};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io::Read,
    path::Path,
};

/// Files of a database entry we care about, `files` is skipped
const INTERESTED_FILES: &[&str] = &["desc", "depends"];

/// Read a repository database and group its binaries by source package
pub fn read_db(repo: &str, db: &Path) -> Result<Vec<SourcePackage>> {
    if !db.is_file() {
        warn!("Package database {} not found", db.display());
        return Ok(Vec::new());
    }

    let mut tar = open_tar(db)?;
    // Entry directory => merged fields of its files
    let mut entries: BTreeMap<String, HashMap<String, Vec<String>>> = BTreeMap::new();
    for file in tar.entries()? {
        let mut file = file?;
        if !file.header().entry_type().is_file() {
            continue;
        }
        let path = file.path()?.into_owned();
        let (dir, name) = match (path.parent(), path.file_name()) {
            (Some(dir), Some(name)) => (dir.to_string_lossy(), name.to_string_lossy()),
            _ => continue,
        };
        if !INTERESTED_FILES.contains(&&*name) {
            continue;
        }

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let fields = pacparse::parse_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        entries.entry(dir.into_owned()).or_default().extend(fields);
    }

    let mut sources: BTreeMap<String, SourcePackage> = BTreeMap::new();
    for (dir, fields) in entries {
        add_binary(repo, &mut sources, &fields)
            .with_context(|| format!("Bad metadata for {} in {}", dir, db.display()))?;
    }
    Ok(sources.into_values().collect())
}

fn add_binary(
    repo: &str,
    sources: &mut BTreeMap<String, SourcePackage>,
    f: &HashMap<String, Vec<String>>,
) -> Result<()> {
    let name = get_first("NAME", f)?;
    let version = PkgVersion::parse(&get_first("VERSION", f)?)?;
    let base = get_first("BASE", f).unwrap_or_else(|_| name.clone());

    let spkg = sources
        .entry(base.clone())
        .or_insert_with(|| SourcePackage::new(repo, &base, version.clone()));

    let mut bpkg = BinaryPackage::new(spkg, &name);
    bpkg.version = version;
    bpkg.description = get_first("DESC", f).unwrap_or_default();
    bpkg.depends = parse_deps(get_list("DEPENDS", f))?;
    bpkg.optdepends = parse_deps(get_list("OPTDEPENDS", f))?;
    bpkg.groups = get_list("GROUPS", f).iter().cloned().collect();

    spkg.checkdepends
        .extend(parse_deps(get_list("CHECKDEPENDS", f))?);
    spkg.makedepends
        .extend(parse_deps(get_list("MAKEDEPENDS", f))?);
    spkg.add_binary(bpkg);

    Ok(())
}

/// Parse dependency lines, dropping optdepends style `: description` suffixes
pub fn parse_deps<S: AsRef<str>>(lines: &[S]) -> Result<HashSet<DependencySpec>> {
    let mut deps = HashSet::new();
    for line in lines {
        let line = line.as_ref();
        let spec = line.split_once(": ").map(|(dep, _)| dep).unwrap_or(line);
        deps.insert(DependencySpec::parse(spec)?);
    }
    Ok(deps)
}
